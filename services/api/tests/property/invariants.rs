//! Property-based tests for token time checks, header parsing, error
//! sanitization and cache expiry.

use api_service::config::ConfigSource;
use api_service::error::{AuthError, ErrorResponse, ServiceError};
use api_service::jwt::bearer_token;
use crate::common::{FakeSecrets, FakeStore, FixedClock, SUBJECT, T, cache, claims, settings, sign, verifier};
use proptest::prelude::*;
use std::time::Duration;
use uuid::Uuid;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A correctly signed token inside its validity window yields its subject.
    #[test]
    fn token_inside_window_verifies(age in 1i64..1_000_000, remaining in 0i64..1_000_000) {
        let verifier = verifier(FixedClock::at(T));
        let token = sign(&claims(T - age, T + remaining));
        let result = tokio_test::block_on(verifier.verify(Some(&token)));
        prop_assert_eq!(result, Ok(Uuid::parse_str(SUBJECT).unwrap()));
    }

    /// Any token whose expiry is before now is rejected, whatever its signature.
    #[test]
    fn expired_token_rejected(expired_for in 1i64..1_000_000) {
        let verifier = verifier(FixedClock::at(T));
        let token = sign(&claims(T - expired_for - 60, T - expired_for));
        let result = tokio_test::block_on(verifier.verify(Some(&token)));
        prop_assert_eq!(result, Err(AuthError::unauthorized("Token has expired")));
    }

    /// Any token issued at or after now is rejected.
    #[test]
    fn future_token_rejected(ahead in 0i64..1_000_000) {
        let verifier = verifier(FixedClock::at(T));
        let token = sign(&claims(T + ahead, T + ahead + 3600));
        let result = tokio_test::block_on(verifier.verify(Some(&token)));
        prop_assert_eq!(result, Err(AuthError::unauthorized("Token issued in the future")));
    }

    /// The bearer credential is extracted verbatim regardless of scheme case.
    #[test]
    fn bearer_credential_extracted(
        scheme in prop::sample::select(vec!["Bearer", "bearer", "BEARER", "BeArEr"]),
        credential in "[A-Za-z0-9._~+/=-]{1,200}"
    ) {
        let header = format!("{scheme} {credential}");
        prop_assert_eq!(bearer_token(Some(&header)), Some(credential.as_str()));
    }

    /// Other schemes never yield a credential.
    #[test]
    fn other_schemes_ignored(scheme in "[A-Za-z]{1,10}", credential in "[A-Za-z0-9]{1,50}") {
        prop_assume!(!scheme.eq_ignore_ascii_case("bearer"));
        let header = format!("{scheme} {credential}");
        prop_assert_eq!(bearer_token(Some(&header)), None);
    }

    /// Rejection reasons mentioning credentials never reach the client.
    #[test]
    fn sensitive_reasons_sanitized(
        prefix in "[a-z ]{0,20}",
        word in prop::sample::select(vec!["password", "secret", "Bearer", "private"]),
        suffix in "[a-z ]{0,20}"
    ) {
        let reason = format!("{prefix}{word}{suffix}");
        let error = ServiceError::from(AuthError::unauthorized(reason.clone()));
        let response = ErrorResponse::from_error(&error, Uuid::new_v4());
        prop_assert_eq!(response.message.as_str(), "Invalid credentials");
        prop_assert!(!response.to_string().contains(&reason));
    }

    /// An entry is served from cache strictly before its TTL and refetched after.
    #[test]
    fn cache_entry_expires_at_ttl(ttl_secs in 1u64..10_000, elapsed_secs in 0u64..20_000) {
        let rt = paused_runtime();
        rt.block_on(async {
            let store = FakeStore::with(&[("Feature Banner", "on")]);
            let secrets = FakeSecrets::with(&[]);
            let cache = cache(settings(), &store, &secrets);
            let ttl = Some(Duration::from_secs(ttl_secs));

            cache.get("Feature Banner", ConfigSource::Dynamic, ttl).await.unwrap();
            tokio::time::advance(Duration::from_secs(elapsed_secs)).await;
            cache.get("Feature Banner", ConfigSource::Dynamic, ttl).await.unwrap();

            let expected = if elapsed_secs < ttl_secs { 1 } else { 2 };
            prop_assert_eq!(store.calls("Feature Banner"), expected);
            Ok(())
        })?;
    }
}
