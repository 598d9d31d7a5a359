//! HashiCorp Vault client for Armedis services.
//!
//! Reads single-valued secrets from a KV v2 mount, authenticating either
//! with a static token or through the Kubernetes auth method.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod secrets;

pub use client::VaultClient;
pub use config::{VaultAuth, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use provider::{SecretMetadata, SecretProvider};
