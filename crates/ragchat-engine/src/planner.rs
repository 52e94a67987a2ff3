use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use ragchat_core::messages::ConversationState;
use ragchat_core::provider::{LlmContext, LlmProvider, StreamOptions};
use ragchat_core::retrieval::RetrievalPlan;

use crate::corpus::CorpusProfile;
use crate::error::TurnError;
use crate::prompts;

/// Turns a question plus history into a [`RetrievalPlan`] with one
/// non-streaming model call. No retries.
pub struct RetrievalPlanner {
    provider: Arc<dyn LlmProvider>,
    corpus: Arc<CorpusProfile>,
    options: StreamOptions,
    timeout: Duration,
}

impl RetrievalPlanner {
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

    pub fn prompt_for(&self, question: &str, history: &ConversationState) -> String {
        prompts::retriever_prompt(&self.corpus, question, history)
    }

    pub async fn plan(
        &self,
        question: &str,
        history: &ConversationState,
    ) -> Result<RetrievalPlan, TurnError> {
        let prompt = self.prompt_for(question, history);
        self.plan_with_prompt(&prompt).await
    }

    /// Run an already rendered planning prompt. Split from [`Self::plan`] so
    /// the caller can show the prompt before the model call.
    #[instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn plan_with_prompt(&self, prompt: &str) -> Result<RetrievalPlan, TurnError> {
        let ctx = LlmContext::from_prompt(prompt);
        let call = self.provider.complete(&ctx, &self.options);
        let raw = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                TurnError::Planning(format!(
                    "model did not answer within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| TurnError::Planning(format!("model call failed: {e}")))?;

        debug!(raw_len = raw.len(), "planner output received");
        decode_plan(&raw).map_err(|reason| {
            warn!(reason = %reason, "planner output rejected");
            TurnError::Planning(reason)
        })
    }
}

/// Decode model output into a plan. Markdown fences and surrounding prose are
/// tolerated: only the outermost `{ .. }` is parsed.
pub fn decode_plan(raw: &str) -> Result<RetrievalPlan, String> {
    let json = outermost_object(raw).ok_or_else(|| "no JSON object in model output".to_string())?;
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;

    let mut plan: RetrievalPlan =
        serde_json::from_value(value).map_err(|e| format!("unexpected plan shape: {e}"))?;

    plan.index = plan.index.trim().to_ascii_lowercase();
    if plan.index.is_empty() {
        return Err("plan has an empty index".into());
    }
    if plan.query.is_empty() {
        return Err("plan has an empty query".into());
    }
    Ok(plan)
}

fn outermost_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::retrieval::SearchType;
    use ragchat_llm::{MockProvider, MockResponse};

    const PLAN: &str = r#"{"query": {"query": {"match": {"body": "age"}}}, "index": "notary_*", "search_type": "lexical"}"#;

    fn planner(responses: Vec<MockResponse>) -> (RetrievalPlanner, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        let planner = RetrievalPlanner::new(
            provider.clone(),
            Arc::new(CorpusProfile::default()),
            StreamOptions::default(),
            Duration::from_secs(5),
        );
        (planner, provider)
    }

    #[test]
    fn decode_plain_json() {
        let plan = decode_plan(PLAN).unwrap();
        assert_eq!(plan.index, "notary_*");
        assert_eq!(plan.search_type, SearchType::Lexical);
    }

    #[test]
    fn decode_fenced_and_wrapped_output() {
        let raw = format!("Here is the retriever:\n```json\n{PLAN}\n```\nLet me know!");
        let plan = decode_plan(&raw).unwrap();
        assert_eq!(plan.index, "notary_*");
    }

    #[test]
    fn decode_normalizes_index_case() {
        let raw = PLAN.replace("notary_*", " Notary_California ");
        assert_eq!(decode_plan(&raw).unwrap().index, "notary_california");
    }

    #[test]
    fn decode_rejects_bad_output() {
        assert!(decode_plan("I cannot help with that.").is_err());
        assert!(decode_plan("} backwards {").is_err());
        assert!(decode_plan(r#"{"index": "notary_*", "search_type": "semantic"}"#).is_err());
        for bad in [
            r#"{"query": {}, "index": "notary_*", "search_type": "semantic"}"#,
            r#"{"query": {"a": 1}, "index": "  ", "search_type": "semantic"}"#,
            r#"{"query": "match all", "index": "notary_*", "search_type": "semantic"}"#,
        ] {
            assert!(decode_plan(bad).is_err(), "accepted {bad}");
        }
    }

    #[tokio::test]
    async fn plan_issues_one_call_with_question_in_prompt() {
        let (planner, provider) = planner(vec![MockResponse::stream_text(PLAN)]);
        let plan = planner
            .plan("What is the age requirement?", &ConversationState::new())
            .await
            .unwrap();
        assert_eq!(plan.index, "notary_*");
        assert_eq!(provider.call_count(), 1);
        assert!(provider.prompts()[0].contains("Question: What is the age requirement?"));
    }

    #[tokio::test]
    async fn unparseable_output_is_planning_error() {
        let (planner, provider) = planner(vec![MockResponse::stream_text("not a plan")]);
        let err = planner.plan("q", &ConversationState::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Planning(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_planning_error() {
        let (planner, _) = planner(vec![MockResponse::Error(
            ragchat_core::errors::GatewayError::ProviderOverloaded,
        )]);
        let err = planner.plan("q", &ConversationState::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Planning(msg) if msg.contains("overloaded")));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        tokio::time::pause();
        let (planner, _) = planner(vec![MockResponse::delayed(
            Duration::from_secs(60),
            MockResponse::stream_text(PLAN),
        )]);
        let err = planner.plan("q", &ConversationState::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Planning(msg) if msg.contains("within 5s")));
    }
}
