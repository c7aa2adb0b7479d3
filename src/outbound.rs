//! Outbound authentication and endpoint preparation.
//!
//! Turns a routing decision into the headers and endpoint the transport
//! layer dispatches to. All side effects live in the returned value; the
//! shared provider configuration is never written to.

use crate::config::AuthType;
use crate::credentials::{TokenCache, DEFAULT_SCOPE};
use crate::error::Result;
use crate::router::RoutingDecision;

/// API version pinned on rewritten cloud-identity endpoints.
pub const CLOUD_API_VERSION: &str = "2024-02-15-preview";

/// Static-key headers stripped from requests to cloud-identity providers.
const STATIC_KEY_HEADERS: [&str; 2] = ["x-api-key", "api-key"];

/// Headers and endpoint for one outbound request.
///
/// The endpoint string is the sole contract with the transport layer: for
/// cloud-identity providers the deployment id and API version are embedded
/// in the URL, never carried as separate metadata.
#[derive(Debug, Clone)]
pub struct OutboundAuth {
    /// Fully resolved URL the request is dispatched to.
    pub endpoint: String,
    /// Headers to set on the outbound request, replacing inbound values.
    pub set_headers: Vec<(&'static str, String)>,
    /// Headers to strip from the outbound request.
    pub remove_headers: Vec<&'static str>,
}

/// Prepare authentication for a routed request.
///
/// Cloud-identity providers get a bearer token from the cache and a
/// deployment-qualified endpoint; static-key providers get their configured
/// key with no network call. A [`crate::error::Error::CredentialAcquisition`]
/// from the cache fails this request only, never the process.
pub async fn prepare(decision: &RoutingDecision, tokens: &TokenCache) -> Result<OutboundAuth> {
    let provider = &decision.provider;
    match provider.auth_type {
        AuthType::CloudIdentity => {
            let scope = provider.auth_scope.as_deref().unwrap_or(DEFAULT_SCOPE);
            let token = tokens.get_token(scope).await?;

            // Unmapped models deploy under their own name.
            let deployment = provider
                .deployment_map
                .get(&decision.model)
                .map(String::as_str)
                .unwrap_or(&decision.model);

            let endpoint = format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                provider.api_base_url.trim_end_matches('/'),
                deployment,
                CLOUD_API_VERSION
            );

            Ok(OutboundAuth {
                endpoint,
                set_headers: vec![("authorization", format!("Bearer {}", token))],
                remove_headers: STATIC_KEY_HEADERS.to_vec(),
            })
        }
        AuthType::StaticKey => {
            let mut set_headers = Vec::new();
            if let Some(key) = &provider.api_key {
                set_headers.push((
                    "authorization",
                    format!("Bearer {}", key.expose_secret()),
                ));
            }
            Ok(OutboundAuth {
                endpoint: provider.api_base_url.clone(),
                set_headers,
                remove_headers: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::credentials::TokenSource;
    use crate::error::Error;
    use crate::router::RouteClass;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedToken(&'static str);

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn acquire(&self, _scope: &str) -> crate::error::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl TokenSource for BrokenSource {
        async fn acquire(&self, _scope: &str) -> crate::error::Result<String> {
            Err(Error::CredentialAcquisition("identity outage".to_string()))
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(
            Config::parse_str(
                r#"{
                    "providers": [
                        {
                            "name": "openrouter",
                            "api_base_url": "https://openrouter.ai/api/v1/chat/completions",
                            "api_key": "sk-or-static",
                            "models": ["claude-3-5-sonnet"]
                        },
                        {
                            "name": "azure-east",
                            "api_base_url": "https://east.openai.azure.com/",
                            "auth_type": "azure",
                            "models": ["gpt-4o", "gpt-4o-mini"],
                            "deployment_map": {"gpt-4o": "prod-gpt4o"}
                        }
                    ],
                    "router": {"default": "openrouter,claude-3-5-sonnet"}
                }"#,
            )
            .unwrap(),
        )
    }

    fn decision(config: &Arc<Config>, provider: &str, model: &str) -> RoutingDecision {
        RoutingDecision {
            provider: config.provider(provider).unwrap().clone(),
            model: model.to_string(),
            route_class: RouteClass::Default,
        }
    }

    #[tokio::test]
    async fn test_cloud_identity_rewrites_endpoint() {
        let config = test_config();
        let tokens = TokenCache::new(FixedToken("tok-abc"));

        let auth = prepare(&decision(&config, "azure-east", "gpt-4o"), &tokens)
            .await
            .unwrap();

        assert_eq!(
            auth.endpoint,
            format!(
                "https://east.openai.azure.com/openai/deployments/prod-gpt4o/chat/completions?api-version={}",
                CLOUD_API_VERSION
            )
        );
        assert_eq!(
            auth.set_headers,
            vec![("authorization", "Bearer tok-abc".to_string())]
        );
        assert_eq!(auth.remove_headers, vec!["x-api-key", "api-key"]);
    }

    #[tokio::test]
    async fn test_unmapped_model_deploys_under_its_own_name() {
        let config = test_config();
        let tokens = TokenCache::new(FixedToken("tok-abc"));

        let auth = prepare(&decision(&config, "azure-east", "gpt-4o-mini"), &tokens)
            .await
            .unwrap();

        assert!(
            auth.endpoint.contains("/openai/deployments/gpt-4o-mini/"),
            "{}",
            auth.endpoint
        );
    }

    #[tokio::test]
    async fn test_static_key_uses_configured_endpoint_and_key() {
        let config = test_config();
        let tokens = TokenCache::new(FixedToken("unused"));

        let auth = prepare(&decision(&config, "openrouter", "claude-3-5-sonnet"), &tokens)
            .await
            .unwrap();

        assert_eq!(
            auth.endpoint,
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            auth.set_headers,
            vec![("authorization", "Bearer sk-or-static".to_string())]
        );
        assert!(auth.remove_headers.is_empty());
    }

    #[tokio::test]
    async fn test_credential_failure_propagates() {
        let config = test_config();
        let tokens = TokenCache::new(BrokenSource);

        let result = prepare(&decision(&config, "azure-east", "gpt-4o"), &tokens).await;
        assert!(matches!(result, Err(Error::CredentialAcquisition(_))));
    }

    #[tokio::test]
    async fn test_provider_config_is_untouched() {
        let config = test_config();
        let tokens = TokenCache::new(FixedToken("tok-abc"));
        let before = format!("{:?}", config.provider("azure-east").unwrap());

        prepare(&decision(&config, "azure-east", "gpt-4o"), &tokens)
            .await
            .unwrap();

        let after = format!("{:?}", config.provider("azure-east").unwrap());
        assert_eq!(before, after);
    }
}
