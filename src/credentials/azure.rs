//! Client-credentials grant against the Microsoft identity platform.
//!
//! Token URL format:
//! `https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token`

use async_trait::async_trait;
use serde::Deserialize;

use super::TokenSource;
use crate::config::ApiKey;
use crate::error::{Error, Result};

/// Scope requested when a provider does not name its own.
pub const DEFAULT_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Acquires bearer tokens via the OAuth2 client-credentials flow.
pub struct AzureClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: ApiKey,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Reported lifetime in seconds. The cache applies its own fixed
    /// lifetime; this is only logged.
    #[serde(default)]
    expires_in: i64,
}

impl AzureClientCredentials {
    /// Create a source for the given tenant and client credentials.
    pub fn new(
        tenant_id: impl AsRef<str>,
        client_id: impl Into<String>,
        client_secret: impl Into<ApiKey>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                DEFAULT_AUTHORITY,
                tenant_id.as_ref()
            ),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build a source from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let require = |name: &str| -> Result<String> {
            std::env::var(name).map_err(|_| {
                Error::CredentialAcquisition(format!(
                    "environment variable {} is required for cloud identity providers",
                    name
                ))
            })
        };
        Ok(Self::new(
            require("AZURE_TENANT_ID")?,
            require("AZURE_CLIENT_ID")?,
            require("AZURE_CLIENT_SECRET")?,
        ))
    }

    /// Override the token endpoint (primarily for deterministic tests).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl TokenSource for AzureClientCredentials {
    async fn acquire(&self, scope: &str) -> Result<String> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", scope),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                Error::CredentialAcquisition(format!("identity endpoint unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::CredentialAcquisition(format!(
                "identity endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            Error::CredentialAcquisition(format!("invalid token response: {}", e))
        })?;

        tracing::debug!(
            scope = %scope,
            reported_expires_in = token.expires_in,
            "identity endpoint issued token"
        );
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_source(server: &MockServer) -> AzureClientCredentials {
        AzureClientCredentials::new("test-tenant", "client-123", "secret-456")
            .with_token_url(format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn test_acquire_posts_client_credentials_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-123"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fcognitiveservices.azure.com%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "eyJ-test-token",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = test_source(&server).acquire(DEFAULT_SCOPE).await.unwrap();
        assert_eq!(token, "eyJ-test-token");
    }

    #[tokio::test]
    async fn test_rejection_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string("AADSTS7000215: invalid client secret"),
            )
            .mount(&server)
            .await;

        let err = test_source(&server).acquire(DEFAULT_SCOPE).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"), "{}", message);
        assert!(message.contains("AADSTS7000215"), "{}", message);
    }

    #[tokio::test]
    async fn test_malformed_token_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = test_source(&server).acquire(DEFAULT_SCOPE).await;
        assert!(matches!(result, Err(Error::CredentialAcquisition(_))));
    }

    #[test]
    fn test_default_token_url_targets_tenant() {
        let source = AzureClientCredentials::new("contoso", "id", "secret");
        assert_eq!(
            source.token_url,
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
    }
}
