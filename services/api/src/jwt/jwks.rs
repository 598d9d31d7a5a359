//! Signing key resolution from a remote JSON Web Key Set.
//!
//! [`KeySetClient`] keeps the last fetched key set in an `ArcSwapOption` so
//! lookups never block. The set is refetched when it is older than the cache
//! TTL, or when a token names a key ID the set does not contain (at most once
//! per minimum refresh interval). A refresh runs as a single shared future:
//! callers arriving while it is in flight await the same outcome, failures
//! included, instead of fetching again.

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use rust_common::{HttpConfig, PlatformError, build_http_client};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{ConfigCache, ConfigSource};
use crate::error::{ConfigError, KeyResolutionError};

const MIN_RSA_BITS: usize = 2048;
const MIN_HMAC_BYTES: usize = 32;

/// Source of verification keys by key ID.
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    /// Resolve the key a token header names.
    async fn signing_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError>;
}

/// Algorithm family a key can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// HS256/384/512
    Hmac,
    /// RS*/PS*
    Rsa,
    /// ES256/384
    Ec,
    /// EdDSA
    Ed,
}

impl KeyFamily {
    /// Family of a signature algorithm.
    #[must_use]
    pub const fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Self::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => Self::Ec,
            Algorithm::EdDSA => Self::Ed,
        }
    }
}

/// Verification key with its identity.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Wrap already decoded key material.
    pub fn new(
        kid: impl Into<String>,
        family: KeyFamily,
        algorithm: Option<Algorithm>,
        key: DecodingKey,
    ) -> Self {
        Self {
            kid: kid.into(),
            family,
            algorithm,
            key,
        }
    }

    /// Key ID
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm family the key material belongs to
    #[must_use]
    pub const fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm pinned by the key set entry, if any
    #[must_use]
    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for `jsonwebtoken::decode`
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Whether this key may verify a token signed with `algorithm`.
    #[must_use]
    pub fn accepts(&self, algorithm: Algorithm) -> bool {
        KeyFamily::of(algorithm) == self.family && self.algorithm.is_none_or(|a| a == algorithm)
    }

    /// Convert a key set entry, rejecting weak or non-signature keys.
    ///
    /// # Errors
    ///
    /// Returns the reason the entry is unusable.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk.kid.clone().ok_or("entry has no kid")?;
        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(format!("key use {key_use} is not sig"));
            }
        }
        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| Algorithm::from_str(alg).map_err(|_| format!("unsupported alg {alg}")))
            .transpose()?;

        let (family, key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key without n")?;
                let e = jwk.e.as_deref().ok_or("RSA key without e")?;
                let bits = modulus_bits(n)?;
                if bits < MIN_RSA_BITS {
                    return Err(format!("RSA modulus of {bits} bits is too small"));
                }
                let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let crv = jwk.crv.as_deref().unwrap_or_default();
                if !matches!(crv, "P-256" | "P-384") {
                    return Err(format!("EC curve {crv:?} not allowed"));
                }
                let x = jwk.x.as_deref().ok_or("EC key without x")?;
                let y = jwk.y.as_deref().ok_or("EC key without y")?;
                let key = DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?;
                (KeyFamily::Ec, key)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err("OKP key is not Ed25519".to_string());
                }
                let x = jwk.x.as_deref().ok_or("OKP key without x")?;
                let key = DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?;
                (KeyFamily::Ed, key)
            }
            "oct" => {
                let k = jwk.k.as_deref().ok_or("oct key without k")?;
                let secret = URL_SAFE_NO_PAD
                    .decode(k.trim_end_matches('='))
                    .map_err(|e| format!("oct key is not base64url: {e}"))?;
                if secret.len() < MIN_HMAC_BYTES {
                    return Err(format!("HMAC key of {} bytes is too short", secret.len()));
                }
                (KeyFamily::Hmac, DecodingKey::from_secret(&secret))
            }
            other => return Err(format!("unsupported key type {other}")),
        };

        if let Some(alg) = algorithm {
            if KeyFamily::of(alg) != family {
                return Err(format!("alg {alg:?} does not match key type {}", jwk.kty));
            }
        }

        Ok(Self::new(kid, family, algorithm, key))
    }
}

fn modulus_bits(n: &str) -> Result<usize, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(n.trim_end_matches('='))
        .map_err(|e| format!("RSA modulus is not base64url: {e}"))?;
    let significant = bytes.iter().skip_while(|b| **b == 0).collect::<Vec<_>>();
    Ok(significant
        .first()
        .map_or(0, |lead| significant.len() * 8 - lead.leading_zeros() as usize))
}

/// JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, OKP, oct)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// RSA modulus
    pub n: Option<String>,
    /// RSA exponent
    pub e: Option<String>,
    /// EC/OKP curve
    pub crv: Option<String>,
    /// EC/OKP x coordinate
    pub x: Option<String>,
    /// EC y coordinate
    pub y: Option<String>,
    /// Symmetric key value
    pub k: Option<String>,
}

/// Key set document; entries are parsed one by one so a bad entry only skips itself.
#[derive(Debug, Deserialize)]
struct KeySetDocument {
    keys: Vec<Value>,
}

/// Key set endpoint and refresh policy.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    /// JWKS endpoint
    pub jwks_url: Url,
    /// Age after which the key set is refetched
    pub cache_ttl: Duration,
    /// Minimum gap between refetches triggered by unknown key IDs
    pub min_refresh_interval: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl KeySetConfig {
    /// Config with default refresh policy.
    #[must_use]
    pub const fn new(jwks_url: Url) -> Self {
        Self {
            jwks_url,
            cache_ttl: Duration::from_secs(300),
            min_refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Build from the `Static` settings served by the config cache.
    ///
    /// # Errors
    ///
    /// Fails when a field is missing or unparseable.
    pub async fn from_cache(cache: &ConfigCache) -> Result<Self, ConfigError> {
        let raw = cache.get("auth_jwks_url", ConfigSource::Static, None).await?;
        let jwks_url = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            key: "auth_jwks_url".to_string(),
            reason: e.to_string(),
        })?;
        let settings = cache.settings();
        Ok(Self::new(jwks_url)
            .with_cache_ttl(Duration::from_secs(settings.jwks_cache_ttl_seconds))
            .with_min_refresh_interval(Duration::from_secs(settings.jwks_min_refresh_seconds))
            .with_request_timeout(Duration::from_secs(settings.request_timeout_secs)))
    }

    /// Set the key set cache TTL
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the minimum refresh interval for unknown key IDs
    #[must_use]
    pub const fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct KeySetSnapshot {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
}

type InflightFetch = Shared<BoxFuture<'static, Result<Arc<KeySetSnapshot>, KeyResolutionError>>>;

#[derive(Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    inflight: Option<InflightFetch>,
}

/// Caching client for a remote JSON Web Key Set.
pub struct KeySetClient {
    config: KeySetConfig,
    http: Client,
    snapshot: Arc<ArcSwapOption<KeySetSnapshot>>,
    /// Never held across the fetch itself.
    refresh: Mutex<RefreshState>,
}

impl std::fmt::Debug for KeySetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetClient")
            .field("jwks_url", &self.config.jwks_url.as_str())
            .field("cached_keys", &self.cached_key_count())
            .finish_non_exhaustive()
    }
}

impl KeySetClient {
    /// Create a client; nothing is fetched until the first lookup.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: KeySetConfig) -> Result<Self, PlatformError> {
        let http = build_http_client(&HttpConfig::default().with_timeout(config.request_timeout))?;
        Ok(Self {
            config,
            http,
            snapshot: Arc::new(ArcSwapOption::empty()),
            refresh: Mutex::new(RefreshState::default()),
        })
    }

    /// Resolve the key with ID `kid`.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure, or [`KeyResolutionError::KeyNotFound`] when
    /// the current key set has no usable key with that ID.
    #[instrument(skip(self))]
    pub async fn get_signing_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        if let Some(snapshot) = self.fresh_snapshot() {
            if let Some(key) = snapshot.keys.get(kid) {
                return Ok(Arc::clone(key));
            }
        }

        let snapshot = self.refresh(kid).await?;
        snapshot
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyResolutionError::KeyNotFound {
                kid: kid.to_string(),
            })
    }

    /// Whether the next lookup will refetch regardless of key ID.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.fresh_snapshot().is_none()
    }

    /// Number of keys in the current set.
    #[must_use]
    pub fn cached_key_count(&self) -> usize {
        self.snapshot.load().as_ref().map_or(0, |s| s.keys.len())
    }

    fn fresh_snapshot(&self) -> Option<Arc<KeySetSnapshot>> {
        self.snapshot
            .load_full()
            .filter(|s| s.fetched_at.elapsed() < self.config.cache_ttl)
    }

    async fn refresh(&self, kid: &str) -> Result<Arc<KeySetSnapshot>, KeyResolutionError> {
        let fetch = {
            let mut state = self.refresh.lock().await;

            if let Some(inflight) = &state.inflight {
                debug!(kid, "Joining in-flight key set fetch");
                inflight.clone()
            } else {
                // Another caller may have refreshed while this one waited.
                if let Some(snapshot) = self.fresh_snapshot() {
                    if snapshot.keys.contains_key(kid) {
                        return Ok(snapshot);
                    }
                    let recent = state
                        .last_attempt
                        .is_some_and(|at| at.elapsed() < self.config.min_refresh_interval);
                    if recent {
                        debug!(kid, "Unknown kid; key set refreshed too recently to refetch");
                        return Ok(snapshot);
                    }
                }

                state.last_attempt = Some(Instant::now());
                let fetch = self.start_fetch();
                state.inflight = Some(fetch.clone());
                fetch
            }
        };

        let result = fetch.clone().await;

        let mut state = self.refresh.lock().await;
        if state.inflight.as_ref().is_some_and(|f| f.ptr_eq(&fetch)) {
            state.inflight = None;
        }
        result
    }

    fn start_fetch(&self) -> InflightFetch {
        let http = self.http.clone();
        let url = self.config.jwks_url.clone();
        let timeout = self.config.request_timeout;
        let cache = Arc::clone(&self.snapshot);

        async move {
            let snapshot = Arc::new(fetch(&http, url, timeout).await?);
            cache.store(Some(Arc::clone(&snapshot)));
            Ok::<_, KeyResolutionError>(snapshot)
        }
        .boxed()
        .shared()
    }
}

async fn fetch(
    http: &Client,
    url: Url,
    timeout: Duration,
) -> Result<KeySetSnapshot, KeyResolutionError> {
    info!(url = %url, "Fetching key set");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| KeyResolutionError::from_request(&e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(KeyResolutionError::Status(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| KeyResolutionError::from_request(&e, timeout))?;
    let document: KeySetDocument =
        serde_json::from_slice(&body).map_err(|e| KeyResolutionError::Parse(e.to_string()))?;

    let mut keys = HashMap::new();
    for entry in document.keys {
        let parsed = serde_json::from_value::<Jwk>(entry)
            .map_err(|e| e.to_string())
            .and_then(|jwk| SigningKey::from_jwk(&jwk));
        match parsed {
            Ok(key) => {
                debug!(kid = %key.kid, family = ?key.family, "Loaded signing key");
                keys.insert(key.kid.clone(), Arc::new(key));
            }
            Err(reason) => warn!(reason = %reason, "Skipping key set entry"),
        }
    }

    if keys.is_empty() {
        warn!("Key set contains no usable signing keys");
    } else {
        info!(count = keys.len(), "Key set updated");
    }

    Ok(KeySetSnapshot {
        keys,
        fetched_at: Instant::now(),
    })
}

#[async_trait]
impl SigningKeySource for KeySetClient {
    async fn signing_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        self.get_signing_key(kid).await
    }
}
