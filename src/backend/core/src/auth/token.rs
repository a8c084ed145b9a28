//! Bearer token codec.
//!
//! Issues and verifies HS256-signed JWTs carrying the principal id and
//! username. The codec holds only the signing key, lifetime and a clock; it
//! performs no I/O and never consults the credential store.
//!
//! Expiry is checked against the injected [`Clock`] rather than the library's
//! own wall-clock validation, so token lifetime can be exercised in tests.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::rbac::PrincipalId;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Bad signature, malformed token, wrong issuer or unparsable subject.
    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("token codec misconfigured: {0}")]
    Configuration(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal ID)
    pub sub: String,

    pub username: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Token ID
    pub jti: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What a valid token asserts about its bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub principal_id: PrincipalId,
    pub username: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Codec
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
    leeway_secs: i64,
    issuer: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("lifetime", &self.lifetime)
            .field("leeway_secs", &self.leeway_secs)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from configuration. An empty secret is rejected.
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if config.jwt_secret.is_empty() {
            return Err(TokenError::Configuration(
                "jwt_secret must not be empty".into(),
            ));
        }

        let lifetime = Duration::from_std(config.token_lifetime)
            .map_err(|e| TokenError::Configuration(format!("token_lifetime out of range: {}", e)))?;
        if lifetime <= Duration::zero() {
            return Err(TokenError::Configuration(
                "token_lifetime must be positive".into(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            lifetime,
            leeway_secs: i64::try_from(config.leeway_secs).unwrap_or(i64::MAX),
            issuer: config.issuer.clone(),
            clock,
        })
    }

    pub fn with_system_clock(config: &AuthConfig) -> Result<Self, TokenError> {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a token for the given principal, valid for the configured lifetime.
    pub fn issue(
        &self,
        principal_id: PrincipalId,
        username: &str,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + self.lifetime;

        let claims = Claims {
            sub: principal_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        debug!(
            principal_id = %principal_id,
            token = %fingerprint(&token),
            expires_at = %expires_at,
            "Issued token"
        );

        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature and structure first, then expiry against the clock.
    pub fn verify(&self, token: &str) -> Result<TokenIdentity, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(token = %fingerprint(token), error = %e, "Token validation failed");
            TokenError::Invalid
        })?;
        let claims = data.claims;

        let principal_id: PrincipalId = claims.sub.parse().map_err(|_| TokenError::Invalid)?;

        if self.clock.now().timestamp() > claims.exp.saturating_add(self.leeway_secs) {
            debug!(principal_id = %principal_id, token = %fingerprint(token), "Token expired");
            return Err(TokenError::Expired);
        }

        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::Invalid)?;

        Ok(TokenIdentity {
            principal_id,
            username: claims.username,
            token_id: claims.jti,
            expires_at,
        })
    }
}

/// Short, non-reversible token identifier safe to put in logs.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            token_lifetime: std::time::Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn codec_with_clock(secret: &str) -> (TokenCodec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let codec = TokenCodec::new(&config(secret), clock.clone()).unwrap();
        (codec, clock)
    }

    #[test]
    fn test_round_trip_before_expiry() {
        let (codec, clock) = codec_with_clock("test-secret");
        let id = PrincipalId::new();
        let issued = codec.issue(id, "alice").unwrap();

        clock.advance(Duration::minutes(59));
        let identity = codec.verify(&issued.token).unwrap();
        assert_eq!(identity.principal_id, id);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.expires_at.timestamp(), issued.expires_at.timestamp());
    }

    #[test]
    fn test_expired_after_lifetime() {
        let (codec, clock) = codec_with_clock("test-secret");
        let issued = codec.issue(PrincipalId::new(), "alice").unwrap();

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(codec.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_leeway_extends_validity() {
        let clock = Arc::new(ManualClock::starting_now());
        let cfg = AuthConfig {
            leeway_secs: 30,
            ..config("test-secret")
        };
        let codec = TokenCodec::new(&cfg, clock.clone()).unwrap();
        let issued = codec.issue(PrincipalId::new(), "alice").unwrap();

        clock.advance(Duration::hours(1) + Duration::seconds(20));
        assert!(codec.verify(&issued.token).is_ok());
        clock.advance(Duration::seconds(20));
        assert_eq!(codec.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (issuer, _) = codec_with_clock("secret-a");
        let (verifier, _) = codec_with_clock("secret-b");
        let issued = issuer.issue(PrincipalId::new(), "alice").unwrap();
        assert_eq!(verifier.verify(&issued.token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_malformed_is_invalid() {
        let (codec, _) = codec_with_clock("test-secret");
        assert_eq!(codec.verify("not-a-jwt"), Err(TokenError::Invalid));
        assert_eq!(codec.verify(""), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tampered_signature_is_invalid_even_when_expired() {
        let (codec, clock) = codec_with_clock("test-secret");
        let issued = codec.issue(PrincipalId::new(), "alice").unwrap();
        let mut tampered = issued.token.clone();
        tampered.push('x');

        clock.advance(Duration::days(2));
        assert_eq!(codec.verify(&tampered), Err(TokenError::Invalid));
    }

    #[test]
    fn test_issuer_mismatch_is_invalid() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let a = TokenCodec::new(
            &AuthConfig {
                issuer: Some("warden-a".into()),
                ..config("shared")
            },
            clock.clone(),
        )
        .unwrap();
        let b = TokenCodec::new(
            &AuthConfig {
                issuer: Some("warden-b".into()),
                ..config("shared")
            },
            clock,
        )
        .unwrap();

        let issued = a.issue(PrincipalId::new(), "alice").unwrap();
        assert!(a.verify(&issued.token).is_ok());
        assert_eq!(b.verify(&issued.token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = TokenCodec::with_system_clock(&config("")).unwrap_err();
        assert!(matches!(err, TokenError::Configuration(_)));
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 12);
    }
}
