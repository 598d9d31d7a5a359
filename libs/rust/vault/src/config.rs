//! Vault client configuration.

use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Default service account token location inside a pod.
pub const DEFAULT_K8S_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Identity the client presents to Vault.
#[derive(Debug, Clone)]
pub enum VaultAuth {
    /// Pre-issued Vault token
    Token(SecretString),
    /// Kubernetes auth method: exchange the pod's service account JWT
    Kubernetes {
        /// Vault role bound to the service account
        role: String,
        /// Path of the service account token file
        token_path: PathBuf,
    },
}

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address, without trailing slash
    pub addr: String,
    /// KV v2 mount name
    pub mount: String,
    /// Field of the KV document holding the secret value
    pub value_field: String,
    /// How the client authenticates
    pub auth: VaultAuth,
    /// Request timeout
    pub timeout: Duration,
    /// Re-authenticate when a login token has less than this left
    pub grace_period: Duration,
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(addr: impl Into<String>, auth: VaultAuth) -> Self {
        Self {
            addr: addr.into().trim_end_matches('/').to_string(),
            mount: "secret".to_string(),
            value_field: "value".to_string(),
            auth,
            timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(300),
        }
    }

    /// Build the auth method from `VAULT_TOKEN`, falling back to Kubernetes
    /// auth with `VAULT_ROLE` and `VAULT_K8S_TOKEN_PATH`.
    #[must_use]
    pub fn auth_from_env() -> VaultAuth {
        match std::env::var("VAULT_TOKEN") {
            Ok(token) if !token.is_empty() => VaultAuth::Token(SecretString::from(token)),
            _ => VaultAuth::Kubernetes {
                role: std::env::var("VAULT_ROLE").unwrap_or_default(),
                token_path: std::env::var("VAULT_K8S_TOKEN_PATH")
                    .map_or_else(|_| PathBuf::from(DEFAULT_K8S_TOKEN_PATH), PathBuf::from),
            },
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set grace period.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the KV v2 mount.
    #[must_use]
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into().trim_matches('/').to_string();
        self
    }

    /// Set the document field holding the value.
    #[must_use]
    pub fn with_value_field(mut self, field: impl Into<String>) -> Self {
        self.value_field = field.into();
        self
    }
}
