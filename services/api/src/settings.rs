//! Static, environment-bound settings.
//!
//! Loaded once at process start (a `.env` file is honored through dotenvy)
//! and read-only afterwards. These values back the `Static` configuration
//! source and bootstrap every remote client.

use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::error::ConfigError;

/// Settings errors raised while reading the environment.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Invalid TTL or timeout value
    #[error("Invalid duration for {0}: must be greater than 0")]
    InvalidDuration(String),

    /// Algorithm list is empty or names an unsupported algorithm
    #[error("Invalid AUTH_ALGORITHMS: {0}")]
    InvalidAlgorithms(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Immutable settings bound at startup.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    /// Accepted token signature algorithms
    pub auth_algorithms: Vec<Algorithm>,
    /// Expected `aud` claim
    pub auth_api_audience: String,
    /// Expected `iss` claim
    pub auth_issuer: String,
    /// JSON Web Key Set endpoint
    pub auth_jwks_url: Url,
    /// Claim carrying the subject UUID
    pub auth_subject_claim: String,
    /// Maximum age of a fetched key set before it is refetched
    pub jwks_cache_ttl_seconds: u64,
    /// Minimum gap between refetches triggered by unknown key IDs
    pub jwks_min_refresh_seconds: u64,
    /// Dynamic configuration store (Consul KV) endpoint
    pub config_store_endpoint: Url,
    /// ACL token for the configuration store
    pub config_store_token: Option<SecretString>,
    /// Secret store (Vault) endpoint
    pub secret_store_endpoint: Url,
    /// KV v2 mount holding service secrets
    pub secret_store_mount: String,
    /// Database name handed to the connection pool
    pub postgresql_database_name: String,
    /// TTL used for the cache-duration setting itself
    pub default_config_cache_duration_seconds: u64,
    /// Timeout applied to every outbound call
    pub request_timeout_secs: u64,
}

impl StaticSettings {
    /// Loads settings from the process environment with validation.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Self {
            auth_algorithms: parse_algorithms(&parse_list_env(&lookup, "AUTH_ALGORITHMS", "RS256"))?,
            auth_api_audience: required(&lookup, "AUTH_API_AUDIENCE")?,
            auth_issuer: required(&lookup, "AUTH_ISSUER")?,
            auth_jwks_url: parse_url_env(&lookup, "AUTH_JWKS_URL", None)?,
            auth_subject_claim: lookup("AUTH_SUBJECT_CLAIM").unwrap_or_else(|| "sub".to_string()),
            jwks_cache_ttl_seconds: parse_env(&lookup, "JWKS_CACHE_TTL", 300)?,
            jwks_min_refresh_seconds: parse_env(&lookup, "JWKS_MIN_REFRESH", 30)?,
            config_store_endpoint: parse_url_env(
                &lookup,
                "CONFIG_STORE_ENDPOINT",
                Some("http://localhost:8500"),
            )?,
            config_store_token: lookup("CONFIG_STORE_TOKEN")
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            secret_store_endpoint: parse_url_env(
                &lookup,
                "SECRET_STORE_ENDPOINT",
                Some("http://localhost:8200"),
            )?,
            secret_store_mount: lookup("SECRET_STORE_MOUNT").unwrap_or_else(|| "secret".to_string()),
            postgresql_database_name: lookup("POSTGRESQL_DATABASE_NAME")
                .unwrap_or_else(|| "armedis".to_string()),
            default_config_cache_duration_seconds: parse_env(
                &lookup,
                "DEFAULT_CONFIG_CACHE_DURATION_SECONDS",
                300,
            )?,
            request_timeout_secs: parse_env(&lookup, "REQUEST_TIMEOUT", 10)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    fn validate(&self) -> Result<(), SettingsError> {
        if self.jwks_cache_ttl_seconds == 0 {
            return Err(SettingsError::InvalidDuration("JWKS_CACHE_TTL".to_string()));
        }
        if self.default_config_cache_duration_seconds == 0 {
            return Err(SettingsError::InvalidDuration(
                "DEFAULT_CONFIG_CACHE_DURATION_SECONDS".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::InvalidDuration("REQUEST_TIMEOUT".to_string()));
        }
        if self.auth_subject_claim.trim().is_empty() {
            return Err(SettingsError::MissingRequired("AUTH_SUBJECT_CLAIM".to_string()));
        }
        if self.secret_store_mount.trim_matches('/').is_empty() {
            return Err(SettingsError::MissingRequired("SECRET_STORE_MOUNT".to_string()));
        }
        Ok(())
    }

    /// Reads a field by name. This is the `Static` configuration source.
    ///
    /// The config store token is deliberately not addressable.
    pub fn get(&self, field: &str) -> Result<String, ConfigError> {
        let value = match field {
            "auth_algorithms" => format_algorithms(&self.auth_algorithms),
            "auth_api_audience" => self.auth_api_audience.clone(),
            "auth_issuer" => self.auth_issuer.clone(),
            "auth_jwks_url" => self.auth_jwks_url.to_string(),
            "auth_subject_claim" => self.auth_subject_claim.clone(),
            "jwks_cache_ttl_seconds" => self.jwks_cache_ttl_seconds.to_string(),
            "jwks_min_refresh_seconds" => self.jwks_min_refresh_seconds.to_string(),
            "config_store_endpoint" => self.config_store_endpoint.to_string(),
            "secret_store_endpoint" => self.secret_store_endpoint.to_string(),
            "secret_store_mount" => self.secret_store_mount.clone(),
            "postgresql_database_name" => self.postgresql_database_name.clone(),
            "default_config_cache_duration_seconds" => {
                self.default_config_cache_duration_seconds.to_string()
            }
            "request_timeout_secs" => self.request_timeout_secs.to_string(),
            _ => {
                return Err(ConfigError::InvalidKey {
                    key: field.to_string(),
                });
            }
        };
        Ok(value)
    }
}

/// Parse algorithm names such as `["RS256", "ES256"]`, dropping duplicates.
pub fn parse_algorithms<S: AsRef<str>>(names: &[S]) -> Result<Vec<Algorithm>, SettingsError> {
    let mut algorithms = Vec::new();
    for name in names.iter().map(AsRef::as_ref) {
        let algorithm = Algorithm::from_str(name)
            .map_err(|_| SettingsError::InvalidAlgorithms(format!("unknown algorithm {name}")))?;
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }
    if algorithms.is_empty() {
        return Err(SettingsError::InvalidAlgorithms("no algorithms configured".to_string()));
    }
    Ok(algorithms)
}

/// Inverse of [`parse_algorithms`].
#[must_use]
pub fn format_algorithms(algorithms: &[Algorithm]) -> String {
    algorithms
        .iter()
        .map(|a| format!("{a:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn required<F>(lookup: &F, name: &str) -> Result<String, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SettingsError::MissingRequired(name.to_string()))
}

/// Parse a comma-separated list variable, skipping blank items.
fn parse_list_env<F>(lookup: &F, name: &str, default: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a variable with a default value.
fn parse_env<F, T>(lookup: &F, name: &str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| SettingsError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a URL variable; `default: None` makes it required.
fn parse_url_env<F>(lookup: &F, name: &str, default: Option<&str>) -> Result<Url, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match (lookup(name), default) {
        (Some(val), _) => val,
        (None, Some(default)) => default.to_string(),
        (None, None) => return Err(SettingsError::MissingRequired(name.to_string())),
    };
    Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidUrl {
        field: name.to_string(),
        reason: e.to_string(),
    })
}
