//! Error types for token verification and configuration resolution.
//!
//! Component errors are plain `thiserror` enums. [`ServiceError`] aggregates
//! them for the HTTP boundary, where they are turned into an
//! [`ErrorResponse`] with a sanitized message and a correlation ID.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Sensitive patterns that should be sanitized from client-facing messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "credential",
    "bearer",
    "authorization",
    "api_key",
    "apikey",
    "private",
    "postgres://",
];

/// Token verification failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was supplied
    #[error("Requires authentication")]
    Unauthenticated,

    /// A credential was supplied but rejected
    #[error("{reason}")]
    Unauthorized {
        /// Why the token was rejected
        reason: String,
    },
}

impl AuthError {
    /// Shorthand for [`AuthError::Unauthorized`].
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// The rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Unauthenticated => None,
            Self::Unauthorized { reason } => Some(reason),
        }
    }
}

/// Failure to resolve a signing key from the key set endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyResolutionError {
    /// Endpoint could not be reached
    #[error("key set endpoint unreachable: {0}")]
    Fetch(String),

    /// Endpoint answered with a non-success status
    #[error("key set endpoint returned status {0}")]
    Status(u16),

    /// Response body is not a key set document
    #[error("key set document could not be parsed: {0}")]
    Parse(String),

    /// Request did not finish in time
    #[error("key set request timed out after {0:?}")]
    Timeout(Duration),

    /// No usable key carries the requested ID
    #[error("no signing key with kid {kid}")]
    KeyNotFound {
        /// Requested key ID
        kid: String,
    },
}

impl KeyResolutionError {
    /// Classify a transport error.
    pub fn from_request(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Fetch(err.to_string())
        }
    }
}

/// Configuration resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Dynamic store has no value for the key
    #[error("configuration key not found: {key}")]
    NotFound {
        /// Requested key
        key: String,
    },

    /// Secret store rejected or failed the read
    #[error("secret access failed for {key}: {reason}")]
    SecretAccess {
        /// Requested key
        key: String,
        /// Backend failure description (never the value)
        reason: String,
    },

    /// Static source has no such field
    #[error("invalid configuration key: {key}")]
    InvalidKey {
        /// Requested key
        key: String,
    },

    /// Dynamic store could not be queried
    #[error("configuration store unavailable for {key}: {reason}")]
    StoreUnavailable {
        /// Requested key
        key: String,
        /// Backend failure description
        reason: String,
    },

    /// Resolved value has the wrong shape for its use
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Requested key
        key: String,
        /// Parse failure description
        reason: String,
    },
}

impl ConfigError {
    /// Key the error is about.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key }
            | Self::SecretAccess { key, .. }
            | Self::InvalidKey { key }
            | Self::StoreUnavailable { key, .. }
            | Self::InvalidValue { key, .. } => key,
        }
    }
}

/// Errors surfaced at the service boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Token verification failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Configuration could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No credential supplied
    Unauthenticated,
    /// Credential rejected
    Unauthorized,
    /// Configuration missing or malformed
    ConfigInvalid,
    /// Backing store failed
    ConfigUnavailable,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "AUTH_UNAUTHENTICATED",
            Self::Unauthorized => "AUTH_UNAUTHORIZED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigUnavailable => "CONFIG_UNAVAILABLE",
        }
    }

    /// HTTP status for this code
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::ConfigInvalid => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl ServiceError {
    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(AuthError::Unauthenticated) => ErrorCode::Unauthenticated,
            Self::Auth(AuthError::Unauthorized { .. }) => ErrorCode::Unauthorized,
            Self::Config(
                ConfigError::SecretAccess { .. } | ConfigError::StoreUnavailable { .. },
            ) => ErrorCode::ConfigUnavailable,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }
}

/// Structured error response with correlation ID
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message (sanitized)
    pub message: String,
    /// Correlation ID for tracing
    pub correlation_id: Uuid,
}

impl ErrorResponse {
    /// Build a client-facing response from a service error
    #[must_use]
    pub fn from_error(error: &ServiceError, correlation_id: Uuid) -> Self {
        let code = error.code();
        let message = match error {
            ServiceError::Auth(AuthError::Unauthenticated) => "Requires authentication".to_string(),
            ServiceError::Auth(AuthError::Unauthorized { reason }) => sanitize_message(reason),
            // Never expose configuration keys or backend details
            ServiceError::Config(_) => "Service configuration unavailable".to_string(),
        };

        Self {
            code,
            message,
            correlation_id,
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} [correlation_id: {}]",
            self.code.as_str(),
            self.message,
            self.correlation_id
        )
    }
}

/// Sanitize a message by removing sensitive information
fn sanitize_message(message: &str) -> String {
    if contains_sensitive_info(message) {
        "Invalid credentials".to_string()
    } else {
        message.to_string()
    }
}

/// Check if a string contains sensitive information
#[must_use]
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}
