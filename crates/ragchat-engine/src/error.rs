use ragchat_core::errors::{GatewayError, SearchError};

/// Turn-scoped failures. Each one ends the current turn with a single
/// `error_message`; none of them closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("partition not found: {partition_key} (index {index})")]
    PartitionNotFound { partition_key: String, index: String },

    #[error("retrieval failed: {0}")]
    Retrieval(SearchError),

    #[error("fallback retrieval failed: {0}")]
    Fallback(SearchError),

    #[error("generation failed: {0}")]
    Generation(GatewayError),

    #[error("history compaction failed: {0}")]
    HistoryCompaction(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("turn cancelled")]
    Cancelled,
}

const PLANNING_FAILED: &str =
    "Sorry, I couldn't work out how to search for that. Please try rephrasing your question.";

const COMPACTION_FAILED: &str = "The answer above was delivered, but the conversation history \
     could not be summarized. The previous history was kept.";

impl TurnError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Planning(_) => "planning",
            Self::PartitionNotFound { .. } => "partition_not_found",
            Self::Retrieval(_) => "retrieval",
            Self::Fallback(_) => "fallback",
            Self::Generation(_) => "generation",
            Self::HistoryCompaction(_) => "history_compaction",
            Self::Protocol(_) => "protocol",
            Self::Cancelled => "cancelled",
        }
    }

    /// Text of the `error_message` event sent to the client. `topic` is the
    /// corpus display name, e.g. "Notary".
    pub fn user_message(&self, topic: &str) -> String {
        match self {
            Self::Planning(_) => PLANNING_FAILED.into(),
            Self::PartitionNotFound { partition_key, .. } => {
                format!("I'm sorry but I don't seem to have {topic} info for {partition_key}.")
            }
            Self::Retrieval(e) | Self::Fallback(e) => {
                format!("Sorry, I couldn't search the knowledge base at the moment due to: {e}")
            }
            Self::Generation(e) => {
                format!("Sorry, I couldn't process your request at the moment due to: {e}")
            }
            Self::HistoryCompaction(_) => COMPACTION_FAILED.into(),
            Self::Protocol(detail) => format!(
                "Invalid message ({detail}). Expected {{\"message\": \"<your question>\"}}."
            ),
            Self::Cancelled => "The request was cancelled.".into(),
        }
    }
}
