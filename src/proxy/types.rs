//! Inbound chat-completion request types.
//!
//! Only the fields the routing decision depends on are parsed; the raw body
//! is forwarded byte-for-byte, so nothing here serializes back out.

use serde::Deserialize;

/// The slice of an inbound request that routing reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Bare model id, or a `"provider,model"` override.
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub thinking: Option<ThinkingField>,
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// A chat message. Content arrives either as a plain string or as structured
/// blocks; token estimation handles both, so it stays raw JSON here.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// The `thinking` field arrives either as a bare flag or as a configuration
/// object with a `type` discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThinkingField {
    Flag(bool),
    Config(serde_json::Value),
}

impl ChatRequest {
    /// Whether the request asks for extended thinking.
    pub fn thinking_requested(&self) -> bool {
        match &self.thinking {
            None => false,
            Some(ThinkingField::Flag(flag)) => *flag,
            Some(ThinkingField::Config(value)) => {
                value.is_object()
                    && value.get("type").and_then(|t| t.as_str()) != Some("disabled")
            }
        }
    }
}
