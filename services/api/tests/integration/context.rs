//! Service context wiring over fake config backends and a mock key set.

use crate::common;

use api_service::context::{AppContext, DATABASE_PASSWORD_SECRET, DATABASE_URL_SECRET};
use api_service::error::{AuthError, ServiceError};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use crate::common::{FakeSecrets, FakeStore, KID, SECRET, SUBJECT, cache, claims, settings_with, sign};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn jwks_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{ "kty": "oct", "kid": KID, "k": URL_SAFE_NO_PAD.encode(SECRET) }]
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_context_verifies_with_configured_key_set() {
    let server = jwks_server().await;
    let jwks_url = format!("{}/jwks.json", server.uri());
    let store = FakeStore::with(&[]);
    let secrets = FakeSecrets::with(&[]);
    let config = Arc::new(cache(settings_with(&[("AUTH_JWKS_URL", &jwks_url)]), &store, &secrets));

    let context = AppContext::with_config(config).await.unwrap();
    assert_eq!(context.verifier().config().issuer, common::ISSUER);

    let now = chrono::Utc::now().timestamp();
    let header = format!("Bearer {}", sign(&claims(now - 10, now + 3600)));
    let subject = context.verifier().verify_bearer(Some(&header)).await.unwrap();
    assert_eq!(subject.to_string(), SUBJECT);

    let err = context.verifier().verify_bearer(None).await.unwrap_err();
    assert_eq!(ServiceError::from(err).status_code(), StatusCode::UNAUTHORIZED);

    // Verifier settings come from the static source only.
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_rejected_token_maps_to_forbidden() {
    let server = jwks_server().await;
    let jwks_url = format!("{}/jwks.json", server.uri());
    let store = FakeStore::with(&[]);
    let secrets = FakeSecrets::with(&[]);
    let config = Arc::new(cache(settings_with(&[("AUTH_JWKS_URL", &jwks_url)]), &store, &secrets));
    let context = AppContext::with_config(config).await.unwrap();

    let now = chrono::Utc::now().timestamp();
    let expired = sign(&claims(now - 7200, now - 3600));
    let err = context.verifier().verify(Some(&expired)).await.unwrap_err();
    assert_eq!(err, AuthError::unauthorized("Token has expired"));
    assert_eq!(ServiceError::from(err).status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_database_settings_read_through_cache() {
    let store = FakeStore::with(&[]);
    let secrets = FakeSecrets::with(&[
        (DATABASE_URL_SECRET, "postgres://coordinator.armedis.test:5432"),
        (DATABASE_PASSWORD_SECRET, "s3cr3t"),
    ]);
    let config = Arc::new(cache(
        settings_with(&[("POSTGRESQL_DATABASE_NAME", "citus")]),
        &store,
        &secrets,
    ));
    let context = AppContext::with_config(config).await.unwrap();

    let db = context.database_settings().await.unwrap();
    assert_eq!(db.url.expose_secret(), "postgres://coordinator.armedis.test:5432");
    assert_eq!(db.password.expose_secret(), "s3cr3t");
    assert_eq!(db.database_name, "citus");
    assert!(!format!("{db:?}").contains("s3cr3t"));

    context.database_settings().await.unwrap();
    assert_eq!(secrets.calls(), 2);
}

#[tokio::test]
async fn test_subject_claim_from_settings() {
    let store = FakeStore::with(&[]);
    let secrets = FakeSecrets::with(&[]);
    let settings = settings_with(&[("AUTH_SUBJECT_CLAIM", "uid")]);
    let config = Arc::new(cache(settings, &store, &secrets));

    let context = AppContext::with_config(config).await.unwrap();
    assert_eq!(context.verifier().config().subject_claim, "uid");
}
