use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use ragchat_core::errors::SearchError;
use ragchat_core::retrieval::{RetrievalPlan, SearchResponse, SearchResult, SearchType};
use ragchat_core::search::SearchBackend;

use crate::corpus::CorpusProfile;
use crate::error::TurnError;

/// Runs retrieval plans against the search backend.
///
/// The primary and fallback paths are separate calls; the caller decides when
/// to fall back.
pub struct RetrievalExecutor {
    backend: Arc<dyn SearchBackend>,
    corpus: Arc<CorpusProfile>,
    timeout: Duration,
}

impl RetrievalExecutor {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        corpus: Arc<CorpusProfile>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            corpus,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Issue the planned query against `plan.index`.
    ///
    /// A missing index becomes [`TurnError::PartitionNotFound`]; every other
    /// failure becomes [`TurnError::Retrieval`].
    #[instrument(skip_all, fields(index = %plan.index, search_type = %plan.search_type))]
    pub async fn execute(&self, plan: RetrievalPlan) -> Result<SearchResult, TurnError> {
        let body = Value::Object(plan.query);
        match self.search(&plan.index, &body).await {
            Ok(response) => Ok(SearchResult {
                index: plan.index,
                search_type: plan.search_type,
                via_fallback: false,
                response,
            }),
            Err(SearchError::PartitionNotFound { index }) => {
                let partition_key = self.corpus.partitions.key_of(&index).to_string();
                info!(partition_key = %partition_key, "partition not found");
                Err(TurnError::PartitionNotFound { partition_key, index })
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "primary retrieval failed");
                Err(TurnError::Retrieval(e))
            }
        }
    }

    /// Broad semantic query over `wildcard_index`. Any failure, including a
    /// missing index, is [`TurnError::Fallback`].
    #[instrument(skip_all, fields(index = %wildcard_index))]
    pub async fn execute_fallback(
        &self,
        question: &str,
        wildcard_index: &str,
    ) -> Result<SearchResult, TurnError> {
        let body = self.fallback_query(question);
        let response = self.search(wildcard_index, &body).await.map_err(|e| {
            warn!(error = %e, kind = e.error_kind(), "fallback retrieval failed");
            TurnError::Fallback(e)
        })?;
        Ok(SearchResult {
            index: wildcard_index.to_string(),
            search_type: SearchType::Semantic,
            via_fallback: true,
            response,
        })
    }

    pub fn fallback_query(&self, question: &str) -> Value {
        self.corpus.semantic_query(question)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        tokio::time::timeout(self.timeout, self.backend.search(index, body))
            .await
            .unwrap_or(Err(SearchError::Timeout(self.timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_search::MockSearchBackend;
    use serde_json::json;

    fn executor(backend: Arc<MockSearchBackend>) -> RetrievalExecutor {
        RetrievalExecutor::new(backend, Arc::new(CorpusProfile::default()), Duration::from_secs(5))
    }

    fn plan(index: &str) -> RetrievalPlan {
        serde_json::from_value(json!({
            "query": {"query": {"match": {"body": "age"}}},
            "index": index,
            "search_type": "lexical"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn primary_success_keeps_plan_metadata() {
        let backend = Arc::new(MockSearchBackend::new(vec![Ok(MockSearchBackend::response(&[(
            "notary_ohio",
            "Ohio body",
            &[][..],
        )]))]));
        let result = executor(backend.clone()).execute(plan("notary_ohio")).await.unwrap();
        assert_eq!(result.index, "notary_ohio");
        assert_eq!(result.search_type, SearchType::Lexical);
        assert!(!result.via_fallback);
        assert_eq!(result.hits().len(), 1);

        let calls = backend.calls();
        assert_eq!(calls[0].index, "notary_ohio");
        assert_eq!(calls[0].body, json!({"query": {"match": {"body": "age"}}}));
    }

    #[tokio::test]
    async fn missing_partition_reports_key() {
        let backend = Arc::new(MockSearchBackend::new(vec![Err(SearchError::PartitionNotFound {
            index: "notary_atlantis".into(),
        })]));
        let err = executor(backend).execute(plan("notary_atlantis")).await.unwrap_err();
        match err {
            TurnError::PartitionNotFound { partition_key, index } => {
                assert_eq!(partition_key, "atlantis");
                assert_eq!(index, "notary_atlantis");
            }
            other => panic!("expected PartitionNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_failures_are_retrieval_errors() {
        let backend = Arc::new(MockSearchBackend::new(vec![Err(SearchError::InvalidQuery(
            "parsing_exception".into(),
        ))]));
        let err = executor(backend).execute(plan("notary_*")).await.unwrap_err();
        assert!(matches!(err, TurnError::Retrieval(SearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn fallback_issues_semantic_query_on_wildcard() {
        let backend = Arc::new(MockSearchBackend::new(vec![Ok(MockSearchBackend::response(&[(
            "notary_texas",
            "b",
            &["chunk"][..],
        )]))]));
        let result = executor(backend.clone())
            .execute_fallback("What is the age requirement?", "notary_*")
            .await
            .unwrap();
        assert!(result.via_fallback);
        assert_eq!(result.search_type, SearchType::Semantic);
        assert_eq!(result.index, "notary_*");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index, "notary_*");
        assert_eq!(
            calls[0].body["query"]["nested"]["query"]["sparse_vector"]["query"],
            "What is the age requirement?"
        );
    }

    #[tokio::test]
    async fn fallback_failure_is_fatal_error() {
        let backend = Arc::new(MockSearchBackend::new(vec![Err(SearchError::PartitionNotFound {
            index: "notary_*".into(),
        })]));
        let err = executor(backend).execute_fallback("q", "notary_*").await.unwrap_err();
        assert!(matches!(err, TurnError::Fallback(_)));
    }

    struct StalledBackend;

    #[async_trait::async_trait]
    impl SearchBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn search(&self, _index: &str, _body: &Value) -> Result<SearchResponse, SearchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out_as_retrieval_error() {
        tokio::time::pause();
        let exec = RetrievalExecutor::new(
            Arc::new(StalledBackend),
            Arc::new(CorpusProfile::default()),
            Duration::from_secs(2),
        );
        let err = exec.execute(plan("notary_*")).await.unwrap_err();
        assert!(matches!(err, TurnError::Retrieval(SearchError::Timeout(_))));
    }
}
