use serde::Deserialize;
use serde_json::Value;

use ragchat_core::errors::GatewayError;
use ragchat_core::stream::{StopReason, StreamEvent};
use ragchat_core::tokens::TokenUsage;

/// State machine for parsing Anthropic SSE stream events.
///
/// Only text blocks are surfaced; any other block type is tracked so its
/// deltas can be ignored without corrupting the text accumulator.
pub struct SseParser {
    text: String,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
    in_text_block: bool,
    block_text: String,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            usage: TokenUsage::default(),
            stop_reason: None,
            in_text_block: false,
            block_text: String::new(),
        }
    }

    /// Parse a single SSE event and return zero or more StreamEvents.
    pub fn parse_event(&mut self, event_type: &str, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        match event_type {
            "message_start" => {
                if let Ok(msg) = serde_json::from_str::<MessageStartEvent>(data) {
                    if let Some(usage) = msg.message.usage {
                        self.usage.merge(usage.into());
                    }
                }
                events.push(StreamEvent::Start);
            }

            "content_block_start" => {
                if let Ok(block) = serde_json::from_str::<ContentBlockStartEvent>(data) {
                    self.in_text_block =
                        block.content_block.get("type").and_then(Value::as_str) == Some("text");
                    if self.in_text_block {
                        self.block_text.clear();
                        events.push(StreamEvent::TextStart);
                    }
                }
            }

            "content_block_delta" => {
                if let Ok(delta) = serde_json::from_str::<ContentBlockDeltaEvent>(data) {
                    if self.in_text_block
                        && delta.delta.get("type").and_then(Value::as_str) == Some("text_delta")
                    {
                        let text = delta.delta.get("text").and_then(Value::as_str).unwrap_or("");
                        self.block_text.push_str(text);
                        self.text.push_str(text);
                        events.push(StreamEvent::TextDelta {
                            delta: text.to_string(),
                        });
                    }
                }
            }

            "content_block_stop" => {
                if self.in_text_block {
                    events.push(StreamEvent::TextEnd {
                        text: std::mem::take(&mut self.block_text),
                    });
                }
                self.in_text_block = false;
            }

            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<MessageDeltaEvent>(data) {
                    if let Some(usage) = delta.usage {
                        self.usage.merge(usage.into());
                    }
                    if let Some(reason) = delta.delta.and_then(|d| d.stop_reason) {
                        self.stop_reason = Some(StopReason::from_wire(&reason));
                    }
                }
            }

            "message_stop" => {
                events.push(StreamEvent::Done {
                    text: self.text.clone(),
                    stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
                    usage: self.usage,
                });
            }

            "error" => {
                if let Ok(err) = serde_json::from_str::<ErrorEvent>(data) {
                    events.push(StreamEvent::Error {
                        error: classify_error(&err),
                    });
                }
            }

            _ => {} // ping, etc.
        }

        events
    }
}

fn classify_error(err: &ErrorEvent) -> GatewayError {
    match err.error.error_type.as_str() {
        "overloaded_error" => GatewayError::ProviderOverloaded,
        "rate_limit_error" => GatewayError::RateLimited { retry_after: None },
        "authentication_error" | "permission_error" => {
            GatewayError::AuthenticationFailed(err.error.message.clone())
        }
        "invalid_request_error" => GatewayError::InvalidRequest(err.error.message.clone()),
        _ => GatewayError::ServerError {
            status: 500,
            body: err.error.message.clone(),
        },
    }
}

/// Parse raw SSE text into (event_type, data) pairs.
pub fn parse_sse_lines(raw: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data = String::new();

    for line in raw.lines() {
        if let Some(event) = line.strip_prefix("event:") {
            current_event = event.trim_start().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            if !current_data.is_empty() {
                current_data.push('\n');
            }
            current_data.push_str(data.strip_prefix(' ').unwrap_or(data));
        } else if line.is_empty() && !current_event.is_empty() {
            events.push((std::mem::take(&mut current_event), std::mem::take(&mut current_data)));
        } else if line.is_empty() {
            current_data.clear();
        }
    }

    // Handle trailing event without blank line
    if !current_event.is_empty() {
        events.push((current_event, current_data));
    }

    events
}

// --- Deserialization types for Anthropic SSE events ---

#[derive(Deserialize)]
struct MessageStartEvent {
    message: MessageStartPayload,
}

#[derive(Deserialize)]
struct MessageStartPayload {
    usage: Option<UsagePayload>,
}

#[derive(Deserialize)]
struct UsagePayload {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl From<UsagePayload> for TokenUsage {
    fn from(u: UsagePayload) -> Self {
        TokenUsage {
            input_tokens: u.input_tokens.unwrap_or(0),
            output_tokens: u.output_tokens.unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
struct ContentBlockStartEvent {
    content_block: Value,
}

#[derive(Deserialize)]
struct ContentBlockDeltaEvent {
    delta: Value,
}

#[derive(Deserialize)]
struct MessageDeltaEvent {
    delta: Option<MessageDeltaPayload>,
    usage: Option<UsagePayload>,
}

#[derive(Deserialize)]
struct MessageDeltaPayload {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_text_stream() {
        let mut parser = SseParser::new();

        let events = parser.parse_event(
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"usage":{"input_tokens":100,"output_tokens":1}}}"#,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Start));

        let events = parser.parse_event(
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        );
        assert!(matches!(events[..], [StreamEvent::TextStart]));

        let events = parser.parse_event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        );
        assert!(matches!(&events[..], [StreamEvent::TextDelta { delta }] if delta == "Hello"));

        parser.parse_event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" world!"}}"#,
        );

        let events =
            parser.parse_event("content_block_stop", r#"{"type":"content_block_stop","index":0}"#);
        assert!(matches!(&events[..], [StreamEvent::TextEnd { text }] if text == "Hello world!"));

        let events = parser.parse_event(
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"},"usage":{"output_tokens":25}}"#,
        );
        assert!(events.is_empty());

        let events = parser.parse_event("message_stop", r#"{"type":"message_stop"}"#);
        match &events[..] {
            [StreamEvent::Done { text, stop_reason, usage }] => {
                assert_eq!(text, "Hello world!");
                assert_eq!(*stop_reason, StopReason::MaxTokens);
                assert_eq!(usage.input_tokens, 100);
                assert_eq!(usage.output_tokens, 25);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn non_text_blocks_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.parse_event(
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
        );
        assert!(events.is_empty());
        let events = parser.parse_event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
        );
        assert!(events.is_empty());
        assert!(parser.parse_event("content_block_stop", "{}").is_empty());

        let events = parser.parse_event("message_stop", "{}");
        assert!(matches!(&events[..], [StreamEvent::Done { text, .. }] if text.is_empty()));
    }

    #[test]
    fn parse_error_event() {
        let mut parser = SseParser::new();
        let events = parser.parse_event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"server busy"}}"#,
        );
        assert!(matches!(
            &events[..],
            [StreamEvent::Error { error: GatewayError::ProviderOverloaded }]
        ));
    }

    #[test]
    fn parse_auth_error() {
        let mut parser = SseParser::new();
        let events = parser.parse_event(
            "error",
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid key"}}"#,
        );
        match &events[..] {
            [StreamEvent::Error { error: GatewayError::AuthenticationFailed(msg) }] => {
                assert_eq!(msg, "invalid key");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn ping_produces_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.parse_event("ping", r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn parse_sse_lines_basic() {
        let raw = "event: message_start\ndata: {\"hello\":true}\n\nevent: message_stop\ndata: {}\n\n";
        let events = parse_sse_lines(raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ("message_start".to_string(), "{\"hello\":true}".to_string()));
        assert_eq!(events[1].0, "message_stop");
    }

    #[test]
    fn parse_sse_lines_without_space_and_trailing_event() {
        let raw = "event:ping\ndata:{}";
        let events = parse_sse_lines(raw);
        assert_eq!(events, vec![("ping".to_string(), "{}".to_string())]);
    }
}
