use serde::{Deserialize, Serialize};

/// Outbound event, one per text frame. The wire shape is the only session
/// state a client ever sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Progress information; never affects control flow.
    VerboseInfo { text: String },
    /// Ends the current turn.
    ErrorMessage { text: String },
    /// Incremental answer text in the provider's chunk shape.
    ContentDelta { delta: Delta },
    /// Whole answer, sent when streaming is off.
    FullResponse { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
}

impl ClientEvent {
    pub fn verbose(text: impl Into<String>) -> Self {
        Self::VerboseInfo { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::ErrorMessage { text: text.into() }
    }

    pub fn delta(text: impl Into<String>) -> Self {
        Self::ContentDelta {
            delta: Delta::TextDelta { text: text.into() },
        }
    }

    pub fn full_response(text: impl Into<String>) -> Self {
        Self::FullResponse { text: text.into() }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::VerboseInfo { .. } => "verbose_info",
            Self::ErrorMessage { .. } => "error_message",
            Self::ContentDelta { .. } => "content_delta",
            Self::FullResponse { .. } => "full_response",
        }
    }

    /// True for events that carry answer text.
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::ContentDelta { .. } | Self::FullResponse { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            Self::VerboseInfo { text }
            | Self::ErrorMessage { text }
            | Self::FullResponse { text }
            | Self::ContentDelta {
                delta: Delta::TextDelta { text },
            } => text,
        }
    }
}

/// Inbound chat message: `{"message": "..."}`. Unknown fields are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message: String,
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parsed: Self = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if parsed.message.trim().is_empty() {
            return Err("message must not be empty".into());
        }
        Ok(parsed)
    }
}
