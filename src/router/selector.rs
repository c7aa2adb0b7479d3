//! Route-class classification and provider/model resolution.

use std::sync::Arc;

use crate::config::{Config, ProviderConfig, RouteTarget};
use crate::error::{Error, Result};

/// Prompt-token count above which a request is classified as long-context.
pub const LONG_CONTEXT_THRESHOLD: usize = 60_000;

/// Separator splitting a direct `"provider,model"` override.
const OVERRIDE_SEPARATOR: char = ',';

/// Named category of request used to select a provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Default,
    Background,
    Think,
    LongContext,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Default => "default",
            RouteClass::Background => "background",
            RouteClass::Think => "think",
            RouteClass::LongContext => "longContext",
        }
    }
}

/// The routing outcome for one request. Produced once, then read-only;
/// the provider is a per-request copy so nothing downstream can write
/// into the shared configuration.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub provider: ProviderConfig,
    pub model: String,
    pub route_class: RouteClass,
}

/// Router resolving requests to a provider/model pair.
#[derive(Debug, Clone)]
pub struct Router {
    config: Arc<Config>,
}

impl Router {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Select a provider and model for a request.
    ///
    /// Priority order:
    /// 1. Direct `"provider,model"` override (validated, bypasses classification)
    /// 2. `thinking` requested
    /// 3. Prompt exceeds [`LONG_CONTEXT_THRESHOLD`]
    /// 4. Model matches a background alias prefix
    /// 5. Default
    ///
    /// Thinking deliberately outranks long-context: a thinking request with a
    /// huge prompt still routes to the think class.
    pub fn select(
        &self,
        model_field: &str,
        thinking: bool,
        prompt_tokens: usize,
    ) -> Result<RoutingDecision> {
        if let Some((provider, model)) = split_override(model_field) {
            return self.resolve_override(provider, model);
        }

        let class = if thinking {
            RouteClass::Think
        } else if prompt_tokens > LONG_CONTEXT_THRESHOLD {
            RouteClass::LongContext
        } else if self.is_background_alias(model_field) {
            RouteClass::Background
        } else {
            RouteClass::Default
        };

        tracing::debug!(
            model = %model_field,
            route = %class.as_str(),
            prompt_tokens,
            "classified request"
        );

        self.resolve_class(class)
    }

    /// Resolve an explicit `"provider,model"` override.
    fn resolve_override(&self, provider_name: &str, model: &str) -> Result<RoutingDecision> {
        let provider = self.lookup_provider(provider_name)?;
        if !provider.models.iter().any(|m| m == model) {
            return Err(Error::UnknownModel {
                provider: provider_name.to_string(),
                model: model.to_string(),
            });
        }
        Ok(RoutingDecision {
            provider: provider.clone(),
            model: model.to_string(),
            route_class: RouteClass::Default,
        })
    }

    /// Resolve a route class via the table, falling back to `default`.
    fn resolve_class(&self, class: RouteClass) -> Result<RoutingDecision> {
        let target = self
            .route_for(class)
            .or_else(|| self.route_for(RouteClass::Default))
            .ok_or(Error::NoRouteConfigured {
                class: class.as_str(),
            })?;

        // Load-time validation guarantees this resolves; the error path is
        // defensive against a provider list diverging from the table.
        let provider = self.lookup_provider(&target.provider)?;

        Ok(RoutingDecision {
            provider: provider.clone(),
            model: target.model.clone(),
            route_class: class,
        })
    }

    fn route_for(&self, class: RouteClass) -> Option<&RouteTarget> {
        let table = &self.config.router;
        match class {
            RouteClass::Default => table.default.as_ref(),
            RouteClass::Background => table.background.as_ref(),
            RouteClass::Think => table.think.as_ref(),
            RouteClass::LongContext => table.long_context.as_ref(),
        }
    }

    fn lookup_provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.config.provider(name).ok_or_else(|| Error::UnknownProvider {
            name: name.to_string(),
        })
    }

    fn is_background_alias(&self, model_field: &str) -> bool {
        self.config
            .router
            .background_aliases
            .iter()
            .any(|alias| model_field.starts_with(alias.as_str()))
    }
}

/// Split a direct override into its provider and model parts.
///
/// Only a field with exactly two non-empty comma-separated parts counts as
/// an override; anything else falls through to classification.
fn split_override(model_field: &str) -> Option<(&str, &str)> {
    let (provider, model) = model_field.split_once(OVERRIDE_SEPARATOR)?;
    if provider.is_empty() || model.is_empty() || model.contains(OVERRIDE_SEPARATOR) {
        return None;
    }
    Some((provider, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_router() -> Router {
        let config = Config::parse_str(
            r#"{
                "providers": [
                    {
                        "name": "main",
                        "api_base_url": "https://main.test/v1/chat/completions",
                        "api_key": "sk-main",
                        "models": ["big-model", "claude-3-5-haiku"]
                    },
                    {
                        "name": "aux",
                        "api_base_url": "https://aux.test/v1/chat/completions",
                        "api_key": "sk-aux",
                        "models": ["think-model", "huge-context-model", "tiny-model"]
                    }
                ],
                "router": {
                    "default": "main,big-model",
                    "background": "aux,tiny-model",
                    "think": "aux,think-model",
                    "longContext": "aux,huge-context-model"
                }
            }"#,
        )
        .unwrap();
        Router::new(Arc::new(config))
    }

    #[test]
    fn test_direct_override() {
        let router = test_router();
        // Override wins regardless of the other signals.
        let decision = router.select("aux,think-model", false, 500_000).unwrap();
        assert_eq!(decision.provider.name, "aux");
        assert_eq!(decision.model, "think-model");
        assert_eq!(decision.route_class, RouteClass::Default);
    }

    #[test]
    fn test_override_unknown_provider() {
        let router = test_router();
        let result = router.select("ghost,big-model", false, 0);
        assert!(matches!(result, Err(Error::UnknownProvider { .. })));
    }

    #[test]
    fn test_override_unknown_model() {
        let router = test_router();
        let result = router.select("main,think-model", false, 0);
        match result {
            Err(Error::UnknownModel { provider, model }) => {
                assert_eq!(provider, "main");
                assert_eq!(model, "think-model");
            }
            other => panic!("expected UnknownModel, got {:?}", other),
        }
    }

    #[test]
    fn test_three_part_field_is_not_an_override() {
        let router = test_router();
        // Falls through to classification and lands on the default route.
        let decision = router.select("a,b,c", false, 0).unwrap();
        assert_eq!(decision.provider.name, "main");
        assert_eq!(decision.route_class, RouteClass::Default);
    }

    #[test]
    fn test_thinking_routes_to_think() {
        let router = test_router();
        let decision = router.select("big-model", true, 0).unwrap();
        assert_eq!(decision.route_class, RouteClass::Think);
        assert_eq!(decision.model, "think-model");
    }

    #[test]
    fn test_thinking_outranks_long_context() {
        let router = test_router();
        let decision = router
            .select("big-model", true, LONG_CONTEXT_THRESHOLD + 10_000)
            .unwrap();
        assert_eq!(decision.route_class, RouteClass::Think);
    }

    #[test]
    fn test_long_context_above_threshold() {
        let router = test_router();
        let decision = router.select("big-model", false, 70_000).unwrap();
        assert_eq!(decision.route_class, RouteClass::LongContext);
        assert_eq!(decision.model, "huge-context-model");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let router = test_router();
        let decision = router
            .select("big-model", false, LONG_CONTEXT_THRESHOLD)
            .unwrap();
        assert_eq!(decision.route_class, RouteClass::Default);
    }

    #[test]
    fn test_background_alias_prefix_match() {
        let router = test_router();
        let decision = router
            .select("claude-3-5-haiku-20241022", false, 100)
            .unwrap();
        assert_eq!(decision.route_class, RouteClass::Background);
        assert_eq!(decision.provider.name, "aux");
        assert_eq!(decision.model, "tiny-model");
    }

    #[test]
    fn test_absent_class_falls_back_to_default() {
        let config = Config::parse_str(
            r#"{
                "providers": [
                    {
                        "name": "main",
                        "api_base_url": "https://main.test/v1/chat/completions",
                        "api_key": "sk-main",
                        "models": ["big-model"]
                    }
                ],
                "router": {"default": "main,big-model"}
            }"#,
        )
        .unwrap();
        let router = Router::new(Arc::new(config));

        let decision = router.select("big-model", true, 0).unwrap();
        assert_eq!(decision.route_class, RouteClass::Think);
        assert_eq!(decision.provider.name, "main");
        assert_eq!(decision.model, "big-model");
    }
}
