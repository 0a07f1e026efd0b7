//! Common utilities and types shared across PassVault crates.
//!
//! This module provides the error type every crate propagates and the
//! identifier types passed between the service layer and its store.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{RecordId, UserId};
