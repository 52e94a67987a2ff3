use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use ragchat_core::messages::{ConversationState, ConversationTurn};
use ragchat_core::provider::{LlmContext, LlmProvider, StreamOptions};

use crate::corpus::CorpusProfile;
use crate::error::TurnError;
use crate::prompts;

/// Raw turns kept before the log is compacted into a summary.
pub const RAW_TURN_BOUND: usize = 4;

/// Owns the compaction policy for a conversation log.
///
/// Below [`RAW_TURN_BOUND`] an exchange is appended as-is. At or above it,
/// one summarizer call folds everything into
/// `[system summary, h[-2], h[-1], user, assistant]`.
pub struct HistoryManager {
    provider: Arc<dyn LlmProvider>,
    corpus: Arc<CorpusProfile>,
    options: StreamOptions,
    timeout: Duration,
}

impl HistoryManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        corpus: Arc<CorpusProfile>,
        options: StreamOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            corpus,
            options,
            timeout,
        }
    }

    pub fn needs_compaction(history: &ConversationState) -> bool {
        history.len() >= RAW_TURN_BOUND
    }

    /// Returns the next history. `history` is never modified, so on error the
    /// caller still holds the pre-call log.
    #[instrument(skip_all, fields(len = history.len()))]
    pub async fn append(
        &self,
        history: &ConversationState,
        user_message: &str,
        ai_response: &str,
    ) -> Result<ConversationState, TurnError> {
        if !Self::needs_compaction(history) {
            debug!("appending exchange without summary");
            return Ok(history.with_exchange(user_message, ai_response));
        }

        info!("compacting conversation history");
        let prompt = prompts::summary_prompt(&self.corpus, history, user_message, ai_response);
        let ctx = LlmContext::from_prompt(prompt);

        let call = self.provider.complete(&ctx, &self.options);
        let summary = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                TurnError::HistoryCompaction(format!(
                    "summarizer did not answer within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TurnError::HistoryCompaction(e.to_string()))?;

        let summary = summary.trim();
        if summary.is_empty() {
            warn!("summarizer returned empty text");
            return Err(TurnError::HistoryCompaction("summarizer returned empty text".into()));
        }

        let recent = history.tail(2);
        let mut turns = Vec::with_capacity(RAW_TURN_BOUND + 1);
        turns.push(ConversationTurn::system(summary));
        turns.extend_from_slice(recent);
        turns.push(ConversationTurn::user(user_message));
        turns.push(ConversationTurn::assistant(ai_response));

        Ok(ConversationState::from_turns(turns))
    }
}
