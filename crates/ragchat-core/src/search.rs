use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchError;
use crate::retrieval::SearchResponse;

/// Search backend collaborator.
///
/// `body` is a complete request body; implementations must report a missing
/// index as [`SearchError::PartitionNotFound`] and nothing else.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError>;
}
