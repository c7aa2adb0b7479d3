//! Integration tests for the token cache backed by a real identity endpoint.
//!
//! Verifies that:
//! - the cache issues exactly one token request across repeated calls
//! - an identity-endpoint rejection surfaces as a credential error
//! - a failed scope is retried on the next call

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelgate::credentials::{AzureClientCredentials, TokenCache};
use modelgate::Error;

fn cache_for(server: &MockServer) -> TokenCache {
    TokenCache::new(
        AzureClientCredentials::new("test-tenant", "client-123", "secret-456")
            .with_token_url(format!("{}/token", server.uri())),
    )
}

#[tokio::test]
async fn test_repeated_calls_hit_identity_endpoint_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued-1",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let first = cache.get_token("scope/.default").await.unwrap();
    let second = cache.get_token("scope/.default").await.unwrap();

    assert_eq!(first, "issued-1");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_rejection_surfaces_as_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("AADSTS900023: bad tenant"))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let err = cache.get_token("scope/.default").await.unwrap_err();
    match err {
        Error::CredentialAcquisition(message) => {
            assert!(message.contains("AADSTS900023"), "{}", message);
        }
        other => panic!("expected CredentialAcquisition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_scope_retries_on_next_call() {
    let server = MockServer::start().await;
    // First attempt fails, second succeeds.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("temporarily unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued-after-retry",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    assert!(cache.get_token("scope/.default").await.is_err());
    let token = cache.get_token("scope/.default").await.unwrap();
    assert_eq!(token, "issued-after-retry");
}
