//! Session token validation
//!
//! Session tokens are compact JWTs (`header.claims.signature`) issued by the
//! upstream server and carried in an HTTP-only cookie. With a shared secret
//! configured, only HMAC-signed tokens are accepted. Without one (local
//! development) the signature segment is ignored, which is the only mode in
//! which `alg: none` tokens are accepted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (upstream user identifier)
    pub sub: String,
    /// Issuer
    #[serde(default)]
    pub iss: String,
    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Identity provider the user signed in with (e.g. "github", "dev")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl SessionClaims {
    /// Expiry as a timestamp, if representable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Why a session token was not accepted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session token")]
    Missing,
    #[error("malformed session token")]
    Malformed,
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsigned session token rejected")]
    UnsignedToken,
    #[error("session token signature mismatch")]
    BadSignature,
    #[error("session token expired")]
    Expired,
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Validates (and, with a secret, issues) session tokens
#[derive(Clone)]
pub struct SessionValidator {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for SessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionValidator")
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

impl SessionValidator {
    /// Create a validator. `None` (or an empty secret) disables signature checks.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    /// Whether signatures are verified
    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Validate a token against the current time
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    /// Validate a token as of `now` (unix seconds)
    pub fn validate_at(&self, token: &str, now: i64) -> Result<SessionClaims, SessionError> {
        if token.is_empty() {
            return Err(SessionError::Missing);
        }

        let mut segments = token.split('.');
        let (header, claims) = match (segments.next(), segments.next(), segments.next()) {
            (Some(header), Some(claims), Some(_signature)) if segments.next().is_none() => {
                (header, claims)
            }
            _ => return Err(SessionError::Malformed),
        };

        let header: TokenHeader = decode_segment(header)?;

        let claims = match self.secret {
            Some(ref secret) => verify_signed(token, &header.alg, secret)?,
            None => decode_segment::<SessionClaims>(claims)?,
        };

        // Strictly in the future, whatever the signature mode.
        if claims.exp <= now {
            return Err(SessionError::Expired);
        }

        Ok(claims)
    }

    /// Mint an HS256 token for the given claims.
    ///
    /// Production tokens come from the upstream server; this is for tooling
    /// and tests. Fails when no secret is configured.
    pub fn issue(&self, claims: &SessionClaims) -> anyhow::Result<String> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("cannot sign session tokens without a secret"))?;
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )?)
    }
}

fn verify_signed(token: &str, alg: &str, secret: &[u8]) -> Result<SessionClaims, SessionError> {
    let algorithm = match alg {
        "HS256" => Algorithm::HS256,
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        other if other.eq_ignore_ascii_case("none") => return Err(SessionError::UnsignedToken),
        other => return Err(SessionError::UnsupportedAlgorithm(other.to_string())),
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.validate_aud = false;

    decode::<SessionClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => SessionError::BadSignature,
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => {
                SessionError::UnsupportedAlgorithm(alg.to_string())
            }
            _ => SessionError::Malformed,
        })
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, SessionError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| SessionError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| SessionError::Malformed)
}
