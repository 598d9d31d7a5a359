//! Per-key TTL cache over the configuration sources.

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, instrument, warn};
use vault_client::SecretProvider;

use super::{ConfigSource, ConfigStore};
use crate::error::ConfigError;
use crate::settings::StaticSettings;

/// Dynamic setting holding the default TTL, in whole seconds, for every other key.
pub const CACHE_DURATION_KEY: &str = "Config Cache Duration Seconds";

/// TTL used for credentials read through [`ConfigCache::secret`].
pub const SECRET_TTL: Duration = Duration::from_secs(86_400);

struct CacheEntry {
    value: SecretString,
    fetched_at: Instant,
}

/// Process-wide configuration cache.
///
/// Entries are keyed by setting name only. A miss or an expired entry goes to
/// the backend named by the caller; on failure the error propagates and the
/// old entry is left untouched but never served past its TTL.
pub struct ConfigCache {
    settings: Arc<StaticSettings>,
    dynamic: Arc<dyn ConfigStore>,
    secrets: Arc<dyn SecretProvider>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("entries", &self.entries.read().len())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl ConfigCache {
    /// Create an empty cache over the given backends.
    pub fn new(
        settings: Arc<StaticSettings>,
        dynamic: Arc<dyn ConfigStore>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        let fetch_timeout = Duration::from_secs(settings.request_timeout_secs);
        Self {
            settings,
            dynamic,
            secrets,
            entries: RwLock::new(HashMap::new()),
            fetch_timeout,
        }
    }

    /// Resolve `key` from `source`, serving a cached value while it is younger
    /// than the effective TTL.
    ///
    /// The effective TTL is `ttl_override` when given. Otherwise the
    /// cache-duration key itself lives for the bootstrap TTL from static
    /// settings, static fields live for the life of the process, and every
    /// other key lives for the current value of [`CACHE_DURATION_KEY`].
    ///
    /// # Errors
    ///
    /// Returns the source's [`ConfigError`] kind; nothing stale is returned.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        key: &str,
        source: ConfigSource,
        ttl_override: Option<Duration>,
    ) -> Result<String, ConfigError> {
        let ttl = match ttl_override {
            Some(ttl) => ttl,
            None => self.default_ttl(key, source).await?,
        };
        let value = self.resolve(key, source, ttl).await?;
        Ok(value.expose_secret().to_string())
    }

    /// [`get`](Self::get) against the dynamic store with the default TTL.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn get_dynamic(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key, ConfigSource::Dynamic, None).await
    }

    /// Read a credential from the secret store, cached for [`SECRET_TTL`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SecretAccess`] on any backend failure.
    #[instrument(skip(self))]
    pub async fn secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        self.resolve(key, ConfigSource::Secret, SECRET_TTL).await
    }

    /// Current default TTL, read from [`CACHE_DURATION_KEY`].
    ///
    /// # Errors
    ///
    /// Fails when the key cannot be fetched or is not a whole number of seconds.
    pub async fn cache_duration(&self) -> Result<Duration, ConfigError> {
        let raw = self
            .resolve(CACHE_DURATION_KEY, ConfigSource::Dynamic, self.bootstrap_ttl())
            .await?;
        parse_seconds(CACHE_DURATION_KEY, raw.expose_secret())
    }

    /// Static settings backing the `Static` source.
    #[must_use]
    pub fn settings(&self) -> &StaticSettings {
        &self.settings
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn bootstrap_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.default_config_cache_duration_seconds)
    }

    async fn default_ttl(&self, key: &str, source: ConfigSource) -> Result<Duration, ConfigError> {
        if key == CACHE_DURATION_KEY {
            return Ok(self.bootstrap_ttl());
        }
        if source == ConfigSource::Static {
            return Ok(Duration::MAX);
        }
        self.cache_duration().await
    }

    async fn resolve(
        &self,
        key: &str,
        source: ConfigSource,
        ttl: Duration,
    ) -> Result<SecretString, ConfigError> {
        if let Some(value) = self.cached(key, ttl) {
            debug!(key, "Config cache hit");
            return Ok(value);
        }

        let value = self.fetch(key, source).await.inspect_err(|e| {
            warn!(key, source = %source, error = %e, "Configuration fetch failed");
        })?;

        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                fetched_at: Instant::now(),
            },
        );
        debug!(key, source = %source, ttl_secs = ttl.as_secs(), "Config cache refreshed");
        Ok(value)
    }

    fn cached(&self, key: &str, ttl: Duration) -> Option<SecretString> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    async fn fetch(&self, key: &str, source: ConfigSource) -> Result<SecretString, ConfigError> {
        match source {
            ConfigSource::Dynamic => match timeout(self.fetch_timeout, self.dynamic.fetch(key)).await {
                Ok(Ok(Some(value))) => Ok(SecretString::from(value)),
                Ok(Ok(None)) => Err(ConfigError::NotFound {
                    key: key.to_string(),
                }),
                Ok(Err(e)) => Err(ConfigError::StoreUnavailable {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(ConfigError::StoreUnavailable {
                    key: key.to_string(),
                    reason: format!("timed out after {:?}", self.fetch_timeout),
                }),
            },
            ConfigSource::Secret => {
                match timeout(self.fetch_timeout, self.secrets.get_secret(key)).await {
                    Ok(Ok((value, metadata))) => {
                        debug!(key, version = ?metadata.version, "Secret read");
                        Ok(value)
                    }
                    Ok(Err(e)) => Err(ConfigError::SecretAccess {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }),
                    Err(_) => Err(ConfigError::SecretAccess {
                        key: key.to_string(),
                        reason: format!("timed out after {:?}", self.fetch_timeout),
                    }),
                }
            }
            ConfigSource::Static => self.settings.get(key).map(SecretString::from),
        }
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected whole seconds: {e}"),
        })
}
