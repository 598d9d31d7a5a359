//! Type-State JWT Token with compile-time validation guarantees
//!
//! A token moves from [`Unvalidated`] to [`SignatureValidated`] to
//! [`Validated`]; claims are only reachable once the signature has been
//! checked, and the subject only once every claim rule has passed.

use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use uuid::Uuid;

use super::claims::TokenClaims;
use super::jwks::{KeyFamily, SigningKey};
use crate::error::AuthError;

/// Rejection reason for every failure before the signature check.
pub(crate) const KEY_RESOLUTION_FAILED: &str = "key resolution failed";

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Header parsed; nothing verified
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature, issuer and audience verified
pub struct SignatureValidated {
    claims: TokenClaims,
}
impl private::Sealed for SignatureValidated {}
impl TokenState for SignatureValidated {
    fn state_name() -> &'static str {
        "SignatureValidated"
    }
}

/// Fully validated - signature, time claims and subject
pub struct Validated {
    claims: TokenClaims,
    subject: Uuid,
}
impl private::Sealed for Validated {}
impl TokenState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

/// A token that passed every check.
pub type VerifiedToken = Token<Validated>;

/// Claim rules applied during signature verification.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRules<'a> {
    /// Configured algorithm allow-list
    pub algorithms: &'a [Algorithm],
    /// Expected issuer
    pub issuer: &'a str,
    /// Expected audience
    pub audience: &'a str,
}

/// Type-state token wrapper that enforces validation at compile time
pub struct Token<State: TokenState> {
    raw: String,
    header: Header,
    kid: String,
    state: State,
}

impl<S: TokenState> std::fmt::Debug for Token<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("state", &S::state_name())
            .field("kid", &self.kid)
            .field("alg", &self.header.alg)
            .finish_non_exhaustive()
    }
}

impl Token<Unvalidated> {
    /// Parse the header without trusting it. A key ID is required.
    ///
    /// # Errors
    ///
    /// Malformed headers, `alg: none` and a missing `kid` are all rejected as
    /// a key resolution failure.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let header = decode_header(raw).map_err(|e| {
            tracing::warn!(error = %e, "Token header rejected");
            AuthError::unauthorized(KEY_RESOLUTION_FAILED)
        })?;

        let kid = header.kid.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            tracing::warn!("Token header has no kid");
            AuthError::unauthorized(KEY_RESOLUTION_FAILED)
        })?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            kid,
            state: Unvalidated,
        })
    }

    /// Verify the signature with `key`, plus issuer, audience and presence
    /// of `exp`, `iss` and `aud`. Time claims are left to
    /// [`Token::validate_claims`].
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` with the decoder's error text.
    pub fn verify_signature(
        self,
        key: &SigningKey,
        rules: DecodeRules<'_>,
    ) -> Result<Token<SignatureValidated>, AuthError> {
        let validation = validation_for(key, rules)?;
        let data = decode::<TokenClaims>(&self.raw, key.decoding_key(), &validation)
            .map_err(|e| AuthError::unauthorized(e.to_string()))?;

        Ok(Token {
            raw: self.raw,
            header: self.header,
            kid: self.kid,
            state: SignatureValidated { claims: data.claims },
        })
    }
}

/// Allowed algorithms narrowed to what `key` can verify.
fn validation_for(key: &SigningKey, rules: DecodeRules<'_>) -> Result<Validation, AuthError> {
    let allowed: Vec<Algorithm> = rules
        .algorithms
        .iter()
        .copied()
        .filter(|alg| key.accepts(*alg))
        .collect();
    let Some(first) = allowed.first().copied() else {
        return Err(AuthError::unauthorized("InvalidAlgorithm"));
    };

    let mut validation = Validation::new(first);
    validation.algorithms = allowed;
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.set_issuer(&[rules.issuer]);
    validation.set_audience(&[rules.audience]);
    Ok(validation)
}

impl Token<SignatureValidated> {
    /// Check time claims against `now` (unix seconds) and extract the subject.
    ///
    /// # Errors
    ///
    /// `exp < now`, `iat >= now`, or a subject claim that is absent or not a UUID.
    pub fn validate_claims(
        self,
        now: i64,
        subject_claim: &str,
    ) -> Result<Token<Validated>, AuthError> {
        let claims = self.state.claims;

        if claims.exp < now {
            return Err(AuthError::unauthorized("Token has expired"));
        }
        if claims.iat >= now {
            return Err(AuthError::unauthorized("Token issued in the future"));
        }

        let subject = claims
            .claim_str(subject_claim)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AuthError::unauthorized("missing or invalid subject"))?;

        Ok(Token {
            raw: self.raw,
            header: self.header,
            kid: self.kid,
            state: Validated { claims, subject },
        })
    }

    /// Read-only access to claims before time and subject checks
    pub const fn peek_claims(&self) -> &TokenClaims {
        &self.state.claims
    }
}

impl Token<Validated> {
    /// Access claims - only available on fully validated tokens
    pub const fn claims(&self) -> &TokenClaims {
        &self.state.claims
    }

    /// Authenticated subject
    pub const fn subject(&self) -> Uuid {
        self.state.subject
    }

    /// Get the issuer claim
    pub fn issuer(&self) -> &str {
        &self.state.claims.iss
    }

    /// Get the expiration timestamp
    pub const fn expires_at(&self) -> i64 {
        self.state.claims.exp
    }

    /// Get the issued-at timestamp
    pub const fn issued_at(&self) -> i64 {
        self.state.claims.iat
    }

    /// Get the raw token string
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// Common methods for all states
impl<S: TokenState> Token<S> {
    /// Get the current state name
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }

    /// Key ID from the header
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm named by the header
    pub const fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    /// Family of the header algorithm
    pub const fn family(&self) -> KeyFamily {
        KeyFamily::of(self.header.alg)
    }
}
