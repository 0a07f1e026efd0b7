//! PassVault CLI - operator tooling for the credential crypto core.
//!
//! Computes and checks master password digests, encrypts and decrypts
//! single records, and issues or inspects auth tokens. Secrets are read
//! from PASSVAULT_SIGNING_SECRET and PASSVAULT_KEY_PEPPER.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use passvault_common::UserId;
use passvault_crypto::{
    compute_digest, decrypt, derive_key, encrypt, verify, AuthToken, EncryptedRecord, KdfParams,
    KeyPepper, MasterSecretDigest, SigningSecret, TokenSigner,
};
use passvault_vault::{Secrets, VaultConfig};

#[derive(Parser)]
#[command(name = "passvault")]
#[command(about = "PassVault - Credential vault crypto tooling")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to a JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh random secret for PASSVAULT_SIGNING_SECRET or PASSVAULT_KEY_PEPPER.
    GenSecret {
        /// Which secret to generate.
        #[arg(short, long, value_enum, default_value_t = SecretKind::Signing)]
        kind: SecretKind,
    },

    /// Print the default configuration as JSON.
    InitConfig,

    /// Compute the digest of a master password.
    Hash {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        /// Defaults to the configured parameters.
        #[arg(short, long)]
        strength: Option<String>,
    },

    /// Check a master password against a digest.
    Verify {
        /// Stored digest.
        #[arg(short, long)]
        digest: String,
    },

    /// Encrypt a secret under the key derived from a digest.
    Encrypt {
        /// Stored digest of the record owner.
        #[arg(short, long)]
        digest: String,
    },

    /// Decrypt a record under the key derived from a digest.
    Decrypt {
        /// Stored digest of the record owner.
        #[arg(short, long)]
        digest: String,

        /// Encrypted record.
        #[arg(short, long)]
        record: String,
    },

    /// Issue an auth token for a user.
    IssueToken {
        /// User identifier.
        #[arg(short, long)]
        user: String,
    },

    /// Verify an auth token and print its claims.
    VerifyToken {
        /// Token to check.
        token: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SecretKind {
    /// Token signing secret (PASSVAULT_SIGNING_SECRET).
    Signing,
    /// Record key pepper (PASSVAULT_KEY_PEPPER).
    Pepper,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::GenSecret { kind } => cmd_gen_secret(kind),
        Commands::InitConfig => cmd_init_config(),
        Commands::Hash { strength } => cmd_hash(&config, strength.as_deref()),
        Commands::Verify { digest } => cmd_verify(&digest),
        Commands::Encrypt { digest } => cmd_encrypt(&digest),
        Commands::Decrypt { digest, record } => cmd_decrypt(&digest, &record),
        Commands::IssueToken { user } => cmd_issue_token(&config, &user),
        Commands::VerifyToken { token } => cmd_verify_token(&config, &token),
    }
}

/// Load configuration from file, or fall back to defaults.
fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            VaultConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(VaultConfig::default()),
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn secrets() -> Result<Secrets> {
    Secrets::from_env().context("Secrets are not configured")
}

fn cmd_gen_secret(kind: SecretKind) -> Result<()> {
    let secret = match kind {
        SecretKind::Signing => SigningSecret::generate().to_base64(),
        SecretKind::Pepper => KeyPepper::generate().to_base64(),
    };
    println!("{}", secret);
    Ok(())
}

fn cmd_init_config() -> Result<()> {
    println!("{}", VaultConfig::default().to_json()?);
    Ok(())
}

/// Compute a master password digest.
fn cmd_hash(config: &VaultConfig, strength: Option<&str>) -> Result<()> {
    let kdf_params = match strength {
        Some(name) => KdfParams::preset(name)?,
        None => config.kdf_params.clone(),
    };

    let password = prompt_password("Enter master password: ")?;
    let confirm = prompt_password("Confirm master password: ")?;

    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    info!(
        memory_cost = kdf_params.memory_cost,
        time_cost = kdf_params.time_cost,
        "Computing digest"
    );
    let digest = compute_digest(&password, &kdf_params).context("Failed to compute digest")?;

    println!("{}", digest.as_str());
    Ok(())
}

/// Check a master password.
fn cmd_verify(digest: &str) -> Result<()> {
    let digest = MasterSecretDigest::from_string(digest);
    let password = prompt_password("Enter master password: ")?;

    if !verify(&password, &digest) {
        println!("invalid");
        anyhow::bail!("Master password does not match digest");
    }

    println!("valid");
    Ok(())
}

/// Encrypt one secret.
fn cmd_encrypt(digest: &str) -> Result<()> {
    let secrets = secrets()?;
    let digest = MasterSecretDigest::from_string(digest);
    let key = derive_key(&digest, secrets.key_pepper()).context("Failed to derive key")?;

    let plaintext = prompt_password("Secret to encrypt: ")?;
    let record = encrypt(&plaintext, &key).context("Failed to encrypt")?;

    println!("{}", record);
    Ok(())
}

/// Decrypt one record.
fn cmd_decrypt(digest: &str, record: &str) -> Result<()> {
    let secrets = secrets()?;
    let digest = MasterSecretDigest::from_string(digest);
    let key = derive_key(&digest, secrets.key_pepper()).context("Failed to derive key")?;

    let record = EncryptedRecord::from_string(record);
    let plaintext = Zeroizing::new(decrypt(&record, &key).context("Failed to decrypt record")?);

    println!("{}", plaintext.as_str());
    Ok(())
}

fn signer(config: &VaultConfig) -> Result<TokenSigner> {
    let secrets = secrets()?;
    TokenSigner::new(secrets.signing_secret(), config.token.clone()).context("Invalid token settings")
}

/// Issue a token.
fn cmd_issue_token(config: &VaultConfig, user: &str) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let token = signer(config)?.issue(&user_id)?;

    info!(user_id = %user_id, ttl_secs = config.token.ttl_secs, "Token issued");
    println!("{}", token.as_str());
    Ok(())
}

/// Verify a token.
fn cmd_verify_token(config: &VaultConfig, token: &str) -> Result<()> {
    let token = AuthToken::from_string(token);
    let claims = signer(config)?
        .decode_claims(&token)
        .context("Token rejected")?;

    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}
