//! Secret provider seam.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::VaultResult;

/// Metadata about a retrieved secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretMetadata {
    /// KV v2 version number
    pub version: Option<u32>,
    /// Creation time reported by the store
    pub created_time: Option<String>,
}

/// Key → secret value lookup.
///
/// Implementations never log the value they return.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch the current value stored under `key`.
    async fn get_secret(&self, key: &str) -> VaultResult<(SecretString, SecretMetadata)>;
}
