use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use ragchat_core::errors::GatewayError;
use ragchat_core::messages::ConversationState;
use ragchat_core::provider::{LlmContext, LlmProvider, StreamOptions};
use ragchat_core::retrieval::ContextType;
use ragchat_core::search::SearchBackend;

use crate::assembler::ContextAssembler;
use crate::corpus::CorpusProfile;
use crate::error::TurnError;
use crate::executor::RetrievalExecutor;
use crate::history::HistoryManager;
use crate::planner::RetrievalPlanner;
use crate::prompts;
use crate::streamer::AnswerStreamer;

/// Per-stage limits and generation options.
#[derive(Clone, Debug)]
pub struct TurnConfig {
    pub plan_timeout: Duration,
    pub search_timeout: Duration,
    pub summary_timeout: Duration,
    pub answer_timeout: Duration,
    pub streaming: bool,
    pub stream_options: StreamOptions,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            plan_timeout: Duration::from_secs(45),
            search_timeout: Duration::from_secs(90),
            summary_timeout: Duration::from_secs(45),
            answer_timeout: Duration::from_secs(60),
            streaming: true,
            stream_options: StreamOptions {
                max_tokens: Some(2_000),
                ..Default::default()
            },
        }
    }
}

/// Stateless turn stages built over the injected collaborators. One instance
/// is shared by every session; per-connection state lives in the session.
pub struct TurnPipeline {
    pub corpus: Arc<CorpusProfile>,
    pub planner: RetrievalPlanner,
    pub executor: RetrievalExecutor,
    pub assembler: ContextAssembler,
    pub streamer: AnswerStreamer,
    pub history: HistoryManager,
    provider: Arc<dyn LlmProvider>,
    options: StreamOptions,
    answer_timeout: Duration,
}

impl TurnPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        backend: Arc<dyn SearchBackend>,
        corpus: CorpusProfile,
        config: TurnConfig,
    ) -> Self {
        let corpus = Arc::new(corpus);
        Self {
            planner: RetrievalPlanner::new(
                provider.clone(),
                corpus.clone(),
                config.stream_options.clone(),
                config.plan_timeout,
            ),
            executor: RetrievalExecutor::new(backend, corpus.clone(), config.search_timeout),
            assembler: ContextAssembler::new(corpus.document_field.clone()),
            streamer: AnswerStreamer::new(
                provider.clone(),
                config.stream_options.clone(),
                config.streaming,
                config.answer_timeout,
            ),
            history: HistoryManager::new(
                provider.clone(),
                corpus.clone(),
                config.stream_options.clone(),
                config.summary_timeout,
            ),
            corpus,
            provider,
            options: config.stream_options,
            answer_timeout: config.answer_timeout,
        }
    }

    /// Stateless question answering: broad semantic search over every
    /// partition, then one blocking completion. Returns `(prompt, answer)`.
    #[instrument(skip_all, fields(context_type = ?context_type))]
    pub async fn answer_once(
        &self,
        question: &str,
        context_type: ContextType,
    ) -> Result<(String, String), TurnError> {
        let wildcard = self.corpus.wildcard_index();
        let result = self.executor.execute_fallback(question, &wildcard).await?;
        let search_type = result.search_type;
        let context = self.assembler.assemble(result, context_type, search_type);

        let history = ConversationState::new();
        let prompt = prompts::answer_prompt(&self.corpus, &context.formatted, question, &history);
        let ctx = LlmContext::from_prompt(prompt.as_str());
        let call = self.provider.complete(&ctx, &self.options);
        let answer = tokio::time::timeout(self.answer_timeout, call)
            .await
            .map_err(|_| TurnError::Generation(GatewayError::Timeout(self.answer_timeout)))?
            .map_err(TurnError::Generation)?;
        Ok((prompt, answer))
    }
}
