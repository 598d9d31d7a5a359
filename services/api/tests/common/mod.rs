//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use api_service::config::{ConfigCache, ConfigStore};
use api_service::error::KeyResolutionError;
use api_service::jwt::{Clock, KeyFamily, SigningKey, SigningKeySource, TokenVerifier, VerifierConfig};
use api_service::settings::StaticSettings;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use parking_lot::Mutex;
use rust_common::PlatformError;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use vault_client::{SecretMetadata, SecretProvider, VaultError, VaultResult};

pub const ISSUER: &str = "https://login.armedis.test/";
pub const AUDIENCE: &str = "https://api.armedis.test";
pub const KID: &str = "test-key-1";
pub const SECRET: &[u8] = b"api-service-test-signing-secret-for-hs256-tokens";
pub const SUBJECT: &str = "3f2b8c1d-6e4a-4b9f-8d2c-1a5e7f9b0c3d";
pub const T: i64 = 1_700_000_000;

pub fn settings_with(overrides: &[(&str, &str)]) -> StaticSettings {
    let mut vars: HashMap<String, String> = [
        ("AUTH_ALGORITHMS", "HS256"),
        ("AUTH_API_AUDIENCE", AUDIENCE),
        ("AUTH_ISSUER", ISSUER),
        ("AUTH_JWKS_URL", "http://127.0.0.1:9/.well-known/jwks.json"),
        ("REQUEST_TIMEOUT", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    StaticSettings::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

pub fn settings() -> StaticSettings {
    settings_with(&[])
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub fn claims(iat: i64, exp: i64) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": iat,
        "exp": exp,
        "sub": SUBJECT,
    })
}

pub fn sign_with(alg: Algorithm, kid: Option<&str>, secret: &[u8], claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(String::from);
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn sign(claims: &Value) -> String {
    sign_with(Algorithm::HS256, Some(KID), SECRET, claims)
}

pub fn hmac_key(kid: &str, secret: &[u8]) -> SigningKey {
    SigningKey::new(kid, KeyFamily::Hmac, None, DecodingKey::from_secret(secret))
}

/// In-memory key source.
#[derive(Default)]
pub struct StaticKeys {
    keys: HashMap<String, Arc<SigningKey>>,
    pub lookups: AtomicUsize,
}

impl StaticKeys {
    pub fn with(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|k| (k.kid().to_string(), Arc::new(k)))
                .collect(),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SigningKeySource for StaticKeys {
    async fn signing_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyResolutionError::KeyNotFound {
                kid: kid.to_string(),
            })
    }
}

/// Key source whose endpoint is down.
pub struct UnreachableKeys;

#[async_trait]
impl SigningKeySource for UnreachableKeys {
    async fn signing_key(&self, _kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        Err(KeyResolutionError::Fetch("connection refused".to_string()))
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(now: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn verifier_config() -> VerifierConfig {
    VerifierConfig::from_settings(&settings())
}

pub fn verifier(clock: Arc<FixedClock>) -> TokenVerifier {
    TokenVerifier::new(
        Arc::new(StaticKeys::with([hmac_key(KID, SECRET)])),
        verifier_config(),
    )
    .with_clock(clock)
}

// ---------------------------------------------------------------------------
// Config backends
// ---------------------------------------------------------------------------

/// Dynamic store backed by a map, counting fetches per key.
#[derive(Default)]
pub struct FakeStore {
    values: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    pub fn with(values: &[(&str, &str)]) -> Arc<Self> {
        let store = Self::default();
        for (k, v) in values {
            store.set(k, v);
        }
        Arc::new(store)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn fetch(&self, key: &str) -> Result<Option<String>, PlatformError> {
        *self.calls.lock().entry(key.to_string()).or_default() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("connection refused"));
        }
        Ok(self.values.lock().get(key).cloned())
    }
}

/// Secret provider backed by a map, counting reads.
#[derive(Default)]
pub struct FakeSecrets {
    values: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    denied: AtomicBool,
}

impl FakeSecrets {
    pub fn with(values: &[(&str, &str)]) -> Arc<Self> {
        let secrets = Self::default();
        for (k, v) in values {
            secrets.set(k, v);
        }
        Arc::new(secrets)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for FakeSecrets {
    async fn get_secret(&self, key: &str) -> VaultResult<(SecretString, SecretMetadata)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.denied.load(Ordering::SeqCst) {
            return Err(VaultError::PermissionDenied(key.to_string()));
        }
        let value = self
            .values
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| VaultError::not_found(key))?;
        Ok((SecretString::from(value), SecretMetadata::default()))
    }
}

pub fn cache(
    settings: StaticSettings,
    store: &Arc<FakeStore>,
    secrets: &Arc<FakeSecrets>,
) -> ConfigCache {
    ConfigCache::new(
        Arc::new(settings),
        Arc::clone(store) as Arc<dyn ConfigStore>,
        Arc::clone(secrets) as Arc<dyn SecretProvider>,
    )
}
