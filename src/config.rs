//! Configuration parsing and validation for modelgate.
//!
//! The configuration file is JSON with two relaxations: `//` and `/* */`
//! comments, and trailing commas. Both are stripped before handing the
//! document to serde. After a successful load the file is rewritten with a
//! leading comment advertising that support, and top-level scalar values are
//! exported into the process environment for collaborators that read env
//! rather than the config object.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;

/// Leading comment written back to the config file on load.
const RELAXED_SYNTAX_HEADER: &str =
    "// Comments and trailing commas are supported in this file.\n";

/// Default listen host when the config carries none.
const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port when the config carries none.
const DEFAULT_PORT: u16 = 3456;

/// Root configuration structure.
///
/// Immutable after load: accessors hand out shared references and no
/// component may write back into a provider or route it received.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inbound API key clients must present (optional).
    pub apikey: Option<ApiKey>,
    /// Listen host override.
    pub host: Option<String>,
    /// Listen port override.
    pub port: Option<u16>,
    /// Configured backend providers.
    pub providers: Vec<ProviderConfig>,
    /// Route-class to provider/model table.
    pub router: RoutingTable,
    /// Unrecognized top-level scalars, kept for environment export.
    extra: serde_json::Map<String, serde_json::Value>,
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only `.expose_secret()` yields the raw value, so every use site is
/// auditable with a grep.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider authenticates to its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Long-lived key from config, sent as-is.
    StaticKey,
    /// Short-lived bearer token acquired from a cloud identity provider.
    CloudIdentity,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::StaticKey => "static_key",
            AuthType::CloudIdentity => "cloud_identity",
        }
    }
}

/// Provider configuration. Never mutated after load.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Unique name for this provider.
    pub name: String,
    /// Endpoint URL for static-key providers; resource base URL for
    /// cloud-identity providers (the deployment path is appended per request).
    pub api_base_url: String,
    /// How requests to this provider are authenticated.
    pub auth_type: AuthType,
    /// Static API key, if any.
    pub api_key: Option<ApiKey>,
    /// Models served by this provider.
    pub models: Vec<String>,
    /// Model name to hosted deployment id, for cloud-identity providers.
    pub deployment_map: HashMap<String, String>,
    /// Identity scope override for cloud-identity providers.
    pub auth_scope: Option<String>,
}

/// A `"provider,model"` routing target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub provider: String,
    pub model: String,
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.provider, self.model)
    }
}

/// Route-class to provider/model table. `default` is mandatory; other
/// classes fall back to it when absent.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub default: Option<RouteTarget>,
    pub background: Option<RouteTarget>,
    pub think: Option<RouteTarget>,
    pub long_context: Option<RouteTarget>,
    /// Model-name prefixes routed to the background class.
    pub background_aliases: Vec<String>,
}

/// Configuration errors. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Router.default is required: routing cannot proceed without a default route")]
    NoDefaultRoute,
}

// ── Raw (wire) structures ────────────────────────────────────────────

/// A model entry is either a bare string or an object with a `name` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModelEntry {
    Name(String),
    Object { name: String },
}

impl ModelEntry {
    fn into_name(self) -> String {
        match self {
            ModelEntry::Name(name) => name,
            ModelEntry::Object { name } => name,
        }
    }
}

#[derive(Deserialize)]
struct RawProviderConfig {
    name: String,
    api_base_url: String,
    auth_type: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(default)]
    deployment_map: HashMap<String, String>,
    auth_scope: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawRoutingTable {
    default: Option<String>,
    background: Option<String>,
    think: Option<String>,
    #[serde(rename = "longContext", alias = "long_context")]
    long_context: Option<String>,
    #[serde(default, rename = "backgroundAliases", alias = "background_aliases")]
    background_aliases: Vec<String>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default, alias = "Providers")]
    providers: Vec<RawProviderConfig>,
    #[serde(default, alias = "Router")]
    router: RawRoutingTable,
    #[serde(alias = "APIKEY")]
    apikey: Option<String>,
    #[serde(alias = "HOST")]
    host: Option<String>,
    #[serde(alias = "PORT")]
    port: Option<u16>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Default prefix treated as the lightweight/background model identifier
/// when the config names no aliases of its own.
const DEFAULT_BACKGROUND_ALIAS: &str = "claude-3-5-haiku";

// ── Relaxed JSON ─────────────────────────────────────────────────────

/// Strip `//` and `/* */` comments and trailing commas so the remainder is
/// strict JSON. String literals are tracked so comment markers and commas
/// inside them survive untouched.
fn strip_relaxed_json(input: &str) -> String {
    // Pass 1: comments.
    let mut no_comments = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            no_comments.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    no_comments.push(escaped);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                no_comments.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    while let Some(&next) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                }
                _ => no_comments.push(c),
            },
            _ => no_comments.push(c),
        }
    }

    // Pass 2: commas whose next non-whitespace character closes a scope.
    let chars: Vec<char> = no_comments.chars().collect();
    let mut out = String::with_capacity(no_comments.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if !(j >= chars.len() || chars[j] == '}' || chars[j] == ']') {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Parse a `"provider,model"` route string.
fn parse_route_target(class: &str, raw: &str) -> Result<RouteTarget, ConfigError> {
    match raw.split_once(',') {
        Some((provider, model))
            if !provider.is_empty() && !model.is_empty() && !model.contains(',') =>
        {
            Ok(RouteTarget {
                provider: provider.to_string(),
                model: model.to_string(),
            })
        }
        _ => Err(ConfigError::Validation(format!(
            "Router.{} value '{}' is not a 'provider,model' pair",
            class, raw
        ))),
    }
}

impl Config {
    /// Load configuration from a relaxed-JSON file.
    ///
    /// On success the file is rewritten with a leading comment noting the
    /// relaxed syntax, unless one is already present. The rewrite is
    /// best-effort; a read-only file does not fail the load.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::parse_str(&content)?;

        if !content.starts_with("//") {
            let annotated = format!("{}{}", RELAXED_SYNTAX_HEADER, content);
            if let Err(e) = std::fs::write(path, annotated) {
                tracing::warn!(path = %path.display(), error = %e, "could not annotate config file");
            }
        }

        Ok(config)
    }

    /// Parse configuration from a relaxed-JSON string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let strict = strip_relaxed_json(content);
        let raw: RawConfig = serde_json::from_str(&strict)?;
        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut providers = Vec::with_capacity(raw.providers.len());
        for rp in raw.providers {
            let auth_type = match rp.auth_type.as_deref() {
                None => AuthType::StaticKey,
                Some("azure") => AuthType::CloudIdentity,
                Some(other) => {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' has unknown auth_type '{}' (expected 'azure' or absent)",
                        rp.name, other
                    )));
                }
            };

            providers.push(ProviderConfig {
                name: rp.name,
                api_base_url: rp.api_base_url,
                auth_type,
                api_key: rp.api_key.map(ApiKey::from),
                models: rp.models.into_iter().map(ModelEntry::into_name).collect(),
                deployment_map: rp.deployment_map,
                auth_scope: rp.auth_scope,
            });
        }

        let parse_slot = |class: &str, slot: Option<String>| -> Result<Option<RouteTarget>, ConfigError> {
            slot.map(|raw| parse_route_target(class, &raw)).transpose()
        };

        let mut background_aliases = raw.router.background_aliases;
        if background_aliases.is_empty() {
            background_aliases.push(DEFAULT_BACKGROUND_ALIAS.to_string());
        }

        let router = RoutingTable {
            default: parse_slot("default", raw.router.default)?,
            background: parse_slot("background", raw.router.background)?,
            think: parse_slot("think", raw.router.think)?,
            long_context: parse_slot("longContext", raw.router.long_context)?,
            background_aliases,
        };

        Ok(Config {
            apikey: raw.apikey.map(ApiKey::from),
            host: raw.host,
            port: raw.port,
            providers,
            router,
            extra: raw.extra,
        })
    }

    /// Validate the configuration.
    ///
    /// Every routing-table entry must resolve to a configured provider that
    /// lists the routed model. Checking here means a bad route fails the
    /// process at startup instead of a request at runtime.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            tracing::warn!("No providers configured - proxy will reject all requests");
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.api_base_url.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty api_base_url",
                    provider.name
                )));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.auth_type == AuthType::StaticKey && provider.api_key.is_none() {
                tracing::warn!(provider = %provider.name, "provider has no api_key configured");
            }
        }

        if self.router.default.is_none() {
            return Err(ConfigError::NoDefaultRoute);
        }

        let routes = [
            ("default", &self.router.default),
            ("background", &self.router.background),
            ("think", &self.router.think),
            ("longContext", &self.router.long_context),
        ];
        for (class, slot) in routes {
            let Some(target) = slot else { continue };
            let Some(provider) = self.provider(&target.provider) else {
                return Err(ConfigError::Validation(format!(
                    "Router.{} references unknown provider '{}'",
                    class, target.provider
                )));
            };
            if !provider.models.iter().any(|m| m == &target.model) {
                return Err(ConfigError::Validation(format!(
                    "Router.{} references model '{}' not served by provider '{}'",
                    class, target.model, target.provider
                )));
            }
        }

        Ok(())
    }

    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Whether any provider authenticates via cloud identity.
    pub fn has_cloud_identity_provider(&self) -> bool {
        self.providers
            .iter()
            .any(|p| p.auth_type == AuthType::CloudIdentity)
    }

    /// Address the HTTP server should bind.
    pub fn listen(&self) -> String {
        format!(
            "{}:{}",
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }

    /// Export top-level configuration scalars into the process environment.
    ///
    /// Collaborators launched by or linked into this process read `APIKEY`,
    /// `HOST`, `PORT` and any extra top-level scalars from env rather than
    /// the config object.
    pub fn export_env(&self) {
        if let Some(key) = &self.apikey {
            std::env::set_var("APIKEY", key.expose_secret());
        }
        if let Some(host) = &self.host {
            std::env::set_var("HOST", host);
        }
        if let Some(port) = self.port {
            std::env::set_var("PORT", port.to_string());
        }
        for (name, value) in &self.extra {
            match value {
                serde_json::Value::String(s) => std::env::set_var(name, s),
                serde_json::Value::Number(n) => std::env::set_var(name, n.to_string()),
                serde_json::Value::Bool(b) => std::env::set_var(name, b.to_string()),
                _ => {}
            }
        }
    }
}
