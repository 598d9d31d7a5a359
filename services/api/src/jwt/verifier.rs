//! Bearer token verification.

use jsonwebtoken::Algorithm;
use std::sync::Arc;
use tracing::{Span, debug, field, warn};
use uuid::Uuid;

use super::bearer::bearer_token;
use super::jwks::SigningKeySource;
use super::token::{DecodeRules, KEY_RESOLUTION_FAILED, Token, VerifiedToken};
use crate::config::{ConfigCache, ConfigSource};
use crate::error::{AuthError, ConfigError};
use crate::settings::{StaticSettings, parse_algorithms};

/// Source of the current time in unix seconds.
pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// What a token must satisfy.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Accepted signature algorithms
    pub algorithms: Vec<Algorithm>,
    /// Expected `iss`
    pub issuer: String,
    /// Expected `aud`
    pub audience: String,
    /// Claim holding the subject UUID
    pub subject_claim: String,
}

impl VerifierConfig {
    /// Build directly from static settings.
    #[must_use]
    pub fn from_settings(settings: &StaticSettings) -> Self {
        Self {
            algorithms: settings.auth_algorithms.clone(),
            issuer: settings.auth_issuer.clone(),
            audience: settings.auth_api_audience.clone(),
            subject_claim: settings.auth_subject_claim.clone(),
        }
    }

    /// Build from the `Static` source of the config cache.
    ///
    /// # Errors
    ///
    /// Fails when a field cannot be read or the algorithm list is invalid.
    pub async fn from_cache(cache: &ConfigCache) -> Result<Self, ConfigError> {
        let read = move |key: &'static str| cache.get(key, ConfigSource::Static, None);

        let raw_algorithms = read("auth_algorithms").await?;
        let names: Vec<&str> = raw_algorithms.split(',').collect();
        let algorithms = parse_algorithms(&names).map_err(|e| ConfigError::InvalidValue {
            key: "auth_algorithms".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            algorithms,
            issuer: read("auth_issuer").await?,
            audience: read("auth_api_audience").await?,
            subject_claim: read("auth_subject_claim").await?,
        })
    }

    fn rules(&self) -> DecodeRules<'_> {
        DecodeRules {
            algorithms: &self.algorithms,
            issuer: &self.issuer,
            audience: &self.audience,
        }
    }
}

/// Verifies bearer tokens against keys from a [`SigningKeySource`].
pub struct TokenVerifier {
    keys: Arc<dyn SigningKeySource>,
    config: VerifierConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier using the system clock.
    pub fn new(keys: Arc<dyn SigningKeySource>, config: VerifierConfig) -> Self {
        Self {
            keys,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active verification rules
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify a token and return its subject.
    ///
    /// The subject is recorded as `user_id` on the caller's current span,
    /// which must declare the field (`user_id = tracing::field::Empty`).
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] when no token is given, otherwise
    /// [`AuthError::Unauthorized`] with the rejection reason.
    pub async fn verify(&self, token: Option<&str>) -> Result<Uuid, AuthError> {
        let raw = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let verified = self.verify_token(raw).await.inspect_err(|e| {
            debug!(error = %e, "Token rejected");
        })?;
        let subject = verified.subject();
        Span::current().record("user_id", field::display(subject));
        Ok(subject)
    }

    /// Verify the credential of an `Authorization: Bearer` header value.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify); a header without a bearer credential is
    /// treated as no token.
    pub async fn verify_bearer(&self, authorization: Option<&str>) -> Result<Uuid, AuthError> {
        self.verify(bearer_token(authorization)).await
    }

    /// Verify a token and return it with its decoded claims.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub async fn verify_token(&self, raw: &str) -> Result<VerifiedToken, AuthError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let token = Token::parse(raw)?;
        let key = self.keys.signing_key(token.kid()).await.map_err(|e| {
            warn!(kid = %token.kid(), error = %e, "Signing key resolution failed");
            AuthError::unauthorized(KEY_RESOLUTION_FAILED)
        })?;

        token
            .verify_signature(&key, self.config.rules())?
            .validate_claims(self.clock.now(), &self.config.subject_claim)
    }
}
