use serde_json::{json, Value};

use ragchat_core::messages::{ConversationTurn, Role};
use ragchat_core::provider::{LlmContext, StreamOptions};

use crate::models::ClaudeModelInfo;

/// Output budget used when the caller sets none.
pub const DEFAULT_MAX_TOKENS: u32 = 2_000;

/// Convert an LlmContext into the Anthropic Messages API request body.
pub fn build_request_body(
    context: &LlmContext,
    options: &StreamOptions,
    model: &str,
    model_info: &ClaudeModelInfo,
) -> Value {
    let max_tokens = model_info.clamp_max_tokens(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "stream": true,
    });

    if let Some(temp) = options.temperature {
        body["temperature"] = json!(temp);
    }

    if !options.stop_sequences.is_empty() {
        body["stop_sequences"] = json!(options.stop_sequences);
    }

    if let Some(system) = system_text(context) {
        body["system"] = json!(system);
    }

    body["messages"] = json!(convert_messages(&context.messages));

    body
}

/// Explicit system prompt followed by any system-role turns. The Messages API
/// has no system role inside `messages`.
fn system_text(context: &LlmContext) -> Option<String> {
    let parts: Vec<&str> = context
        .system_prompt
        .as_deref()
        .into_iter()
        .chain(
            context
                .messages
                .iter()
                .filter(|t| t.role() == Role::System)
                .map(ConversationTurn::content),
        )
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Map user/assistant turns to API messages, merging consecutive turns of the
/// same role so the request alternates.
fn convert_messages(turns: &[ConversationTurn]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();

    for turn in turns.iter().filter(|t| t.role() != Role::System) {
        let role = turn.role().as_str();
        let block = json!({"type": "text", "text": turn.content()});

        match result.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(content) = last["content"].as_array_mut() {
                    content.push(block);
                }
            }
            _ => result.push(json!({"role": role, "content": [block]})),
        }
    }

    result
}
