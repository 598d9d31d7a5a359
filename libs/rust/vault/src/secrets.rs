//! Vault wire types.

use serde::Deserialize;
use std::collections::HashMap;

/// Vault KV v2 read response
#[derive(Debug, Deserialize)]
pub struct KvResponse {
    /// Response payload
    pub data: KvData,
}

/// KV v2 document with its version metadata
#[derive(Debug, Deserialize)]
pub struct KvData {
    /// Stored fields
    pub data: HashMap<String, serde_json::Value>,
    /// Version metadata
    pub metadata: KvMetadata,
}

/// KV v2 version metadata
#[derive(Debug, Deserialize)]
pub struct KvMetadata {
    /// Creation timestamp
    #[serde(default)]
    pub created_time: Option<String>,
    /// Version number
    #[serde(default)]
    pub version: Option<u32>,
}

/// Vault auth response
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Login result
    pub auth: AuthData,
}

/// Token issued by a login
#[derive(Deserialize)]
pub struct AuthData {
    /// Vault token
    pub client_token: String,
    /// Token lifetime in seconds
    pub lease_duration: u64,
    /// Whether the token can be renewed
    #[serde(default)]
    pub renewable: bool,
}

impl std::fmt::Debug for AuthData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthData")
            .field("client_token", &"[REDACTED]")
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}
