//! Prompt token estimation for long-context classification.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::proxy::Message;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| tiktoken_rs::o200k_base().ok())
        .as_ref()
}

/// Count tokens in a piece of text, falling back to a bytes/4 heuristic if
/// the encoder is unavailable. An estimate only feeds a threshold check, so
/// the fallback just has to be in the right ballpark.
fn count_text(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len() / 4,
    }
}

/// Estimate the prompt token count of a request: message contents plus the
/// serialized tool descriptors.
pub fn estimate_prompt_tokens(messages: &[Message], tools: &[serde_json::Value]) -> usize {
    let mut total = 0;
    for message in messages {
        total += match &message.content {
            serde_json::Value::String(text) => count_text(text),
            other => count_text(&other.to_string()),
        };
    }
    for tool in tools {
        total += count_text(&tool.to_string());
    }
    total
}
