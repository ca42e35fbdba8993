//! Rate limit key generation and handling.

use sha2::{Digest, Sha256};

use crate::error::{Result, TollgateError};

/// Namespace every counter key lives under.
pub const KEY_NAMESPACE: &str = "rate_limit";

/// Upper bound on the full key length, in bytes.
pub const MAX_KEY_LENGTH: usize = 255;

/// Identifies one counter in the backing store.
///
/// The key is `rate_limit:<endpoint type>:<identifier>`. It must start with
/// the namespace prefix, carry something after it, and be at most
/// [`MAX_KEY_LENGTH`] bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Validate and wrap a full key string.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let prefix = namespace_prefix();

        if !key.starts_with(&prefix) {
            return Err(TollgateError::InvalidKey(format!(
                "key must start with {}",
                prefix
            )));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(TollgateError::InvalidKey(format!(
                "key must not exceed {} characters",
                MAX_KEY_LENGTH
            )));
        }
        if key.len() == prefix.len() {
            return Err(TollgateError::InvalidKey(
                "key must have an endpoint type and identifier".to_string(),
            ));
        }

        Ok(Self(key))
    }

    /// Build `rate_limit:<endpoint_type>:<identifier>`.
    pub fn compose(endpoint_type: &str, identifier: &str) -> Result<Self> {
        Self::new(format!("{}:{}:{}", KEY_NAMESPACE, endpoint_type, identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex-encoded SHA-256 of the key, safe to expose in logs and headers.
    pub fn hashed(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

/// `rate_limit:`
fn namespace_prefix() -> String {
    format!("{}:", KEY_NAMESPACE)
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
