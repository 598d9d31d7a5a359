//! Dynamic configuration store.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_common::{HttpConfig, PlatformError, build_http_client};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Runtime-tunable key/value lookups.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the raw value for `key`; `Ok(None)` when the store has no such key.
    async fn fetch(&self, key: &str) -> Result<Option<String>, PlatformError>;
}

/// Consul KV backed store, read through `GET /v1/kv/<key>?raw`.
pub struct ConsulConfigStore {
    endpoint: Url,
    token: Option<SecretString>,
    http: Client,
}

impl std::fmt::Debug for ConsulConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulConfigStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ConsulConfigStore {
    /// Create a store client.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint cannot carry a path or the HTTP client cannot be built.
    pub fn new(
        endpoint: Url,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        if endpoint.cannot_be_a_base() {
            return Err(PlatformError::invalid_input(format!(
                "config store endpoint {endpoint} cannot be a base URL"
            )));
        }
        let http = build_http_client(&HttpConfig::default().with_timeout(timeout))?;
        Ok(Self {
            endpoint,
            token,
            http,
        })
    }

    fn key_url(&self, key: &str) -> Result<Url, PlatformError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::invalid_input("config store endpoint has no path"))?
            .pop_if_empty()
            .extend(["v1", "kv"])
            .extend(key.split('/'));
        url.set_query(Some("raw"));
        Ok(url)
    }
}

#[async_trait]
impl ConfigStore for ConsulConfigStore {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<Option<String>, PlatformError> {
        let url = self.key_url(key)?;
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token.expose_secret());
        }

        let response = request.send().await.map_err(PlatformError::from_request)?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Key absent from config store");
                Ok(None)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlatformError::AuthFailed(
                format!("config store rejected read of {key}"),
            )),
            status if !status.is_success() => Err(PlatformError::unavailable(format!(
                "config store returned status {status}"
            ))),
            _ => {
                let body = response.text().await.map_err(PlatformError::from_request)?;
                Ok(Some(body))
            }
        }
    }
}
