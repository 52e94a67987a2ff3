use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::tokens::TokenUsage;

/// Why the provider stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

/// Events emitted during LLM streaming. Ordering contract:
///
/// Start → (TextStart → TextDelta* → TextEnd)* → Done
///
/// Error can appear at any point and ends the stream.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,

    TextStart,
    TextDelta { delta: String },
    TextEnd { text: String },

    Done {
        text: String,
        stop_reason: StopReason,
        usage: TokenUsage,
    },
    Error { error: GatewayError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub fn is_content_delta(&self) -> bool {
        matches!(self, Self::TextDelta { .. })
    }

    /// Short name used when logging dropped events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TextStart => "text_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextEnd { .. } => "text_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        let done = StreamEvent::Done {
            text: "hi".into(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        };
        assert!(done.is_terminal());
        assert!(!done.is_content_delta());

        let delta = StreamEvent::TextDelta {
            delta: "x".into(),
        };
        assert!(!delta.is_terminal());
        assert!(delta.is_content_delta());
        assert_eq!(StreamEvent::TextStart.kind(), "text_start");
    }

    #[test]
    fn stop_reason_from_wire() {
        assert_eq!(StopReason::from_wire("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_wire("stop_sequence"), StopReason::StopSequence);
        assert_eq!(StopReason::from_wire("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_wire("something_new"), StopReason::EndTurn);
    }
}
