//! Vault service for PassVault.
//!
//! This module provides:
//! - Service configuration and process-wide secrets
//! - Plain value objects for users and password records
//! - The credential store abstraction and an in-memory store
//! - Registration, login and per-user encrypted credential operations
//!
//! # Architecture
//! The service sits between an outer request layer and a credential
//! store, handling all digest, key and token work through the crypto core.
//! It never holds a database handle of its own.

pub mod config;
pub mod models;
pub mod service;
pub mod store;

pub use config::{Secrets, VaultConfig, KEY_PEPPER_ENV, SIGNING_SECRET_ENV};
pub use models::{NewPassword, PasswordRecord, PasswordUpdate, PasswordView, User};
pub use service::{RequestContext, VaultService};
pub use store::{CredentialStore, MemoryStore};
