//! Vault HTTP client.

use crate::{
    config::{VaultAuth, VaultConfig},
    error::{VaultError, VaultResult},
    provider::{SecretMetadata, SecretProvider},
    secrets::{AuthResponse, KvResponse},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_common::{HttpConfig, build_http_client};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Login token obtained through the Kubernetes auth method.
struct LoginToken {
    token: SecretString,
    expires_at: Instant,
}

/// Vault client reading single-valued secrets from a KV v2 mount.
pub struct VaultClient {
    config: VaultConfig,
    http: Client,
    login: RwLock<Option<LoginToken>>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.config.addr)
            .field("mount", &self.config.mount)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Create a new Vault client.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Platform`] if the HTTP client cannot be built.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        let http = build_http_client(&HttpConfig::default().with_timeout(config.timeout))?;

        Ok(Self {
            config,
            http,
            login: RwLock::new(None),
        })
    }

    /// Authenticate with the Kubernetes auth method and cache the login token.
    #[instrument(skip(self, token_path))]
    async fn login(&self, role: &str, token_path: &Path) -> VaultResult<SecretString> {
        let jwt = tokio::fs::read_to_string(token_path)
            .await
            .map_err(|e| VaultError::auth_failed(format!("service account token: {e}")))?;

        let url = format!("{}/v1/auth/kubernetes/login", self.config.addr);
        let body = serde_json::json!({
            "role": role,
            "jwt": jwt.trim()
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(VaultError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::auth_failed(format!("login returned status {status}")));
        }

        let auth_response: AuthResponse = response.json().await.map_err(VaultError::transport)?;
        let ttl = Duration::from_secs(auth_response.auth.lease_duration);
        let token = SecretString::from(auth_response.auth.client_token);

        *self.login.write().await = Some(LoginToken {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });

        info!(ttl_secs = ttl.as_secs(), "Authenticated with Vault");
        Ok(token)
    }

    async fn token(&self) -> VaultResult<SecretString> {
        let (role, token_path) = match &self.config.auth {
            VaultAuth::Token(token) => return Ok(token.clone()),
            VaultAuth::Kubernetes { role, token_path } => (role, token_path),
        };

        {
            let login = self.login.read().await;
            if let Some(current) = login.as_ref() {
                let remaining = current.expires_at.saturating_duration_since(Instant::now());
                if remaining > self.config.grace_period {
                    return Ok(current.token.clone());
                }
            }
        }

        self.login(role, token_path).await
    }

    async fn read_kv(&self, key: &str) -> VaultResult<KvResponse> {
        let token = self.token().await?;
        let url = format!("{}/v1/{}/data/{key}", self.config.addr, self.config.mount);

        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", token.expose_secret())
            .send()
            .await
            .map_err(VaultError::transport)?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Err(VaultError::not_found(key)),
            StatusCode::FORBIDDEN => {
                if matches!(self.config.auth, VaultAuth::Kubernetes { .. }) {
                    // A revoked login token looks like a permission error; log in again next time.
                    self.login.write().await.take();
                }
                return Err(VaultError::PermissionDenied(key.to_string()));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(VaultError::RateLimited),
            s if !s.is_success() => {
                return Err(VaultError::unavailable(format!("status {status} reading {key}")));
            }
            _ => {}
        }

        let body = response.bytes().await.map_err(VaultError::transport)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn validate_key(key: &str) -> VaultResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|segment| segment.is_empty() || segment == "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(())
    } else {
        Err(VaultError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl SecretProvider for VaultClient {
    #[instrument(skip(self))]
    async fn get_secret(&self, key: &str) -> VaultResult<(SecretString, SecretMetadata)> {
        validate_key(key)?;
        debug!("Reading secret");

        let mut response = self.read_kv(key).await?;
        let field = &self.config.value_field;

        let value = match response.data.data.remove(field) {
            Some(serde_json::Value::String(value)) => SecretString::from(value),
            _ => {
                warn!(field = %field, "Secret document has no string value field");
                return Err(VaultError::MissingField {
                    key: key.to_string(),
                    field: field.clone(),
                });
            }
        };

        let metadata = SecretMetadata {
            version: response.data.metadata.version,
            created_time: response.data.metadata.created_time,
        };

        Ok((value, metadata))
    }
}
