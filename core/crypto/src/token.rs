//! Stateless auth tokens.
//!
//! Tokens are HS256 JWTs carrying the user id as `sub` plus issuer,
//! issue time and expiry. There is no revocation list: anyone holding the
//! signing secret can mint valid tokens, so a leaked secret compromises
//! every outstanding token and rotating it revokes them all.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::SigningSecret;
use passvault_common::{Error, Result, UserId};

/// Token lifetime and validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Value of the `iss` claim, checked on verification.
    pub issuer: String,
    /// Seconds between issuance and expiry.
    pub ttl_secs: u64,
    /// Clock skew tolerated when checking expiry.
    pub leeway_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "passvault".to_string(),
            ttl_secs: 3600,
            leeway_secs: 30,
        }
    }
}

impl TokenSettings {
    pub fn validate(&self) -> Result<()> {
        if self.issuer.is_empty() {
            return Err(Error::InvalidInput("Token issuer cannot be empty".to_string()));
        }
        if self.ttl_secs == 0 {
            return Err(Error::InvalidInput("Token TTL must be positive".to_string()));
        }
        let ttl = self.ttl()?;
        if Utc::now().checked_add_signed(ttl).is_none() {
            return Err(Error::InvalidInput("Token TTL is too large".to_string()));
        }
        Ok(())
    }

    fn ttl(&self) -> Result<Duration> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| Error::InvalidInput("Token TTL is too large".to_string()))
    }
}

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User identifier.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Signed bearer token handed to a client after login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token received from a client.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([REDACTED])")
    }
}

/// Issues and verifies tokens with a process-wide signing secret.
///
/// Built once at startup and shared read-only between requests.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    settings: TokenSettings,
}

impl TokenSigner {
    /// Create a signer.
    ///
    /// # Errors
    /// - Returns error if the settings are invalid
    pub fn new(secret: &SigningSecret, settings: TokenSettings) -> Result<Self> {
        settings.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.leeway = settings.leeway_secs;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            settings,
        })
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issue a token for a user, valid from now.
    pub fn issue(&self, user_id: &UserId) -> Result<AuthToken> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issue a token as if it had been issued at `issued_at`.
    pub fn issue_at(&self, user_id: &UserId, issued_at: DateTime<Utc>) -> Result<AuthToken> {
        let ttl = self.settings.ttl()?;
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::InvalidInput("Token expiry out of range".to_string()))?;

        let claims = TokenClaims {
            sub: user_id.as_str().to_string(),
            iss: self.settings.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map(AuthToken)
            .map_err(|e| Error::Crypto(format!("Token signing failed: {}", e)))
    }

    /// Verify a token and return the user it was issued to.
    ///
    /// # Errors
    /// - `TokenExpired` if the signature is valid but the token expired
    /// - `InvalidToken` for any other failure
    pub fn verify(&self, token: &AuthToken) -> Result<UserId> {
        let claims = self.decode_claims(token)?;
        UserId::new(claims.sub).map_err(|_| Error::InvalidToken("empty subject".to_string()))
    }

    /// Verify a token and return all of its claims.
    ///
    /// The signature is checked before any claim is inspected.
    pub fn decode_claims(&self, token: &AuthToken) -> Result<TokenClaims> {
        decode::<TokenClaims>(token.as_str(), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::InvalidToken(e.to_string()),
            })
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("settings", &self.settings)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    fn signer() -> TokenSigner {
        TokenSigner::new(&SigningSecret::generate(), TokenSettings::default()).unwrap()
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let signer = signer();
        let user = UserId::new("alice-id").unwrap();

        let token = signer.issue(&user).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_claims_carry_expiry() {
        let signer = signer();
        let user = UserId::generate();
        let now = Utc::now();

        let token = signer.issue_at(&user, now).unwrap();
        let claims = signer.decode_claims(&token).unwrap();

        assert_eq!(claims.sub, user.as_str());
        assert_eq!(claims.iss, "passvault");
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 3600);
    }

    #[test]
    fn test_expired_token() {
        let signer = signer();
        let user = UserId::generate();
        let issued_at = Utc::now() - Duration::hours(2);

        let token = signer.issue_at(&user, issued_at).unwrap();
        assert!(matches!(signer.verify(&token), Err(Error::TokenExpired)));
    }

    #[test]
    fn test_token_within_leeway_is_accepted() {
        let signer = signer();
        let user = UserId::generate();
        let issued_at = Utc::now() - Duration::seconds(3600 + 5);

        let token = signer.issue_at(&user, issued_at).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let issuer = signer();
        let other = signer();

        let token = issuer.issue(&UserId::generate()).unwrap();
        assert!(matches!(other.verify(&token), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let issuer = signer();
        let other = signer();

        let token = issuer
            .issue_at(&UserId::generate(), Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(other.verify(&token), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_issuer_fails() {
        let secret = SigningSecret::generate();
        let a = TokenSigner::new(&secret, TokenSettings::default()).unwrap();
        let b = TokenSigner::new(
            &secret,
            TokenSettings {
                issuer: "someone-else".to_string(),
                ..TokenSettings::default()
            },
        )
        .unwrap();

        let token = b.issue(&UserId::generate()).unwrap();
        assert!(matches!(a.verify(&token), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let signer = signer();
        let token = signer.issue(&UserId::new("alice").unwrap()).unwrap();

        let parts: Vec<&str> = token.as_str().split('.').collect();
        let forged_claims = TokenClaims {
            sub: "mallory".to_string(),
            iss: "passvault".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            signer.verify(&AuthToken::from_string(forged)),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_unsigned_token_fails() {
        let signer = signer();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = TokenClaims {
            sub: "mallory".to_string(),
            iss: "passvault".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let token = AuthToken::from_string(format!("{}.{}.", header, payload));

        assert!(matches!(signer.verify(&token), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_garbage_fails() {
        let signer = signer();
        for raw in ["", "abc", "a.b.c", "not.a.token.at.all"] {
            assert!(matches!(
                signer.verify(&AuthToken::from_string(raw)),
                Err(Error::InvalidToken(_))
            ));
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let secret = SigningSecret::generate();
        let zero_ttl = TokenSettings {
            ttl_secs: 0,
            ..TokenSettings::default()
        };
        let no_issuer = TokenSettings {
            issuer: String::new(),
            ..TokenSettings::default()
        };

        assert!(TokenSigner::new(&secret, zero_ttl).is_err());
        assert!(TokenSigner::new(&secret, no_issuer).is_err());
    }

    #[test]
    fn test_unrepresentable_ttl_rejected() {
        for ttl_secs in [u64::MAX, i64::MAX as u64, (i64::MAX / 1000) as u64 + 1] {
            let settings = TokenSettings {
                ttl_secs,
                ..TokenSettings::default()
            };
            assert!(matches!(settings.validate(), Err(Error::InvalidInput(_))));
        }

        // Ten years is long but still issues.
        let settings = TokenSettings {
            ttl_secs: 10 * 365 * 24 * 3600,
            ..TokenSettings::default()
        };
        let signer = TokenSigner::new(&SigningSecret::generate(), settings).unwrap();
        let user = UserId::generate();
        let token = signer.issue(&user).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("[REDACTED]"));
    }
}
