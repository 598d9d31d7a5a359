//! API Service core - bearer token verification and cached configuration.
//!
//! This crate provides the authentication and configuration layer of the
//! Armedis API: JWT verification against a remote key set with a type-state
//! token, and a per-key TTL cache over the dynamic config store, the secret
//! store and static environment settings.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
pub mod settings;

pub use config::{CACHE_DURATION_KEY, ConfigCache, ConfigSource, ConfigStore, ConsulConfigStore};
pub use context::{AppContext, DatabaseSettings};
pub use error::{AuthError, ConfigError, ErrorCode, ErrorResponse, KeyResolutionError, ServiceError};
pub use jwt::{KeySetClient, KeySetConfig, SigningKey, SigningKeySource, TokenVerifier, VerifierConfig};
pub use settings::{SettingsError, StaticSettings};
