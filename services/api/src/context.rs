//! Process-wide service context.
//!
//! Built once at startup and handed to request handlers; owns the config
//! cache and the token verifier that sits on top of it.

use anyhow::Context;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vault_client::{VaultAuth, VaultClient, VaultConfig};

use crate::config::{ConfigCache, ConfigSource, ConsulConfigStore};
use crate::error::ConfigError;
use crate::jwt::{KeySetClient, KeySetConfig, TokenVerifier, VerifierConfig};
use crate::settings::StaticSettings;

/// Secret holding the database coordinator connection URL.
pub const DATABASE_URL_SECRET: &str = "postgresql-coordinator-url";
/// Secret holding the database password.
pub const DATABASE_PASSWORD_SECRET: &str = "postgresql-password";

/// Connection settings handed to the database pool.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Coordinator URL
    pub url: SecretString,
    /// Password
    pub password: SecretString,
    /// Database name
    pub database_name: String,
}

/// Shared service state.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: Arc<ConfigCache>,
    verifier: Arc<TokenVerifier>,
}

impl AppContext {
    /// Load settings from the environment and wire every component.
    ///
    /// # Errors
    ///
    /// Fails on invalid settings or when a client cannot be constructed.
    pub async fn from_env() -> anyhow::Result<Self> {
        let settings = StaticSettings::from_env().context("invalid service settings")?;
        Self::bootstrap(settings, VaultConfig::auth_from_env()).await
    }

    /// Wire the config stores, config cache, key set client and verifier.
    ///
    /// # Errors
    ///
    /// Fails when a client cannot be constructed or the verifier settings
    /// cannot be resolved.
    pub async fn bootstrap(settings: StaticSettings, vault_auth: VaultAuth) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        let dynamic = ConsulConfigStore::new(
            settings.config_store_endpoint.clone(),
            settings.config_store_token.clone(),
            timeout,
        )
        .context("failed to create config store client")?;

        let vault_config = VaultConfig::new(settings.secret_store_endpoint.as_str(), vault_auth)
            .with_mount(settings.secret_store_mount.as_str())
            .with_timeout(timeout);
        let secrets = VaultClient::new(vault_config).context("failed to create secret store client")?;

        let config = Arc::new(ConfigCache::new(
            Arc::new(settings),
            Arc::new(dynamic),
            Arc::new(secrets),
        ));
        Self::with_config(config).await
    }

    /// Build the verifier from settings served by an existing config cache.
    ///
    /// # Errors
    ///
    /// Fails when the key set or verifier settings cannot be resolved.
    pub async fn with_config(config: Arc<ConfigCache>) -> anyhow::Result<Self> {
        let key_set_config = KeySetConfig::from_cache(&config)
            .await
            .context("failed to resolve key set settings")?;
        let jwks_url = key_set_config.jwks_url.clone();
        let key_set = KeySetClient::new(key_set_config).context("failed to create key set client")?;

        let verifier_config = VerifierConfig::from_cache(&config)
            .await
            .context("failed to resolve verifier settings")?;
        let verifier = TokenVerifier::new(Arc::new(key_set), verifier_config);

        info!(jwks_url = %jwks_url, "Service context ready");
        Ok(Self::from_parts(config, Arc::new(verifier)))
    }

    /// Assemble a context from already built components.
    #[must_use]
    pub const fn from_parts(config: Arc<ConfigCache>, verifier: Arc<TokenVerifier>) -> Self {
        Self { config, verifier }
    }

    /// Configuration cache
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigCache> {
        &self.config
    }

    /// Token verifier
    #[must_use]
    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    /// Database connection settings, read through the config cache.
    ///
    /// # Errors
    ///
    /// Fails when a credential cannot be read from the secret store.
    pub async fn database_settings(&self) -> Result<DatabaseSettings, ConfigError> {
        Ok(DatabaseSettings {
            url: self.config.secret(DATABASE_URL_SECRET).await?,
            password: self.config.secret(DATABASE_PASSWORD_SECRET).await?,
            database_name: self
                .config
                .get("postgresql_database_name", ConfigSource::Static, None)
                .await?,
        })
    }
}
