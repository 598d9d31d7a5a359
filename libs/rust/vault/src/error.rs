//! Vault error types.

use rust_common::PlatformError;
use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unavailable
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Request exceeded the configured timeout
    #[error("Vault request timed out: {0}")]
    Timeout(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Secret not found
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    /// Secret document has no usable value field
    #[error("Secret {key} has no string field '{field}'")]
    MissingField {
        /// Secret key
        key: String,
        /// Expected field name
        field: String,
    },

    /// Key is not a valid secret name
    #[error("Invalid secret key: {0:?}")]
    InvalidKey(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Classify a transport failure.
    #[must_use]
    pub fn transport(err: reqwest::Error) -> Self {
        match PlatformError::from_request(err) {
            PlatformError::Timeout(msg) => Self::Timeout(msg),
            PlatformError::Unavailable(msg) => Self::Unavailable(msg),
            other => Self::Platform(other),
        }
    }

    /// Whether the caller lacks access (as opposed to the store being down).
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::AuthenticationFailed(_))
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::SecretNotFound(key.into())
    }
}
