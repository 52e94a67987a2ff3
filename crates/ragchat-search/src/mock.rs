use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ragchat_core::errors::SearchError;
use ragchat_core::retrieval::{ChunkMatch, SearchHit, SearchResponse};
use ragchat_core::search::SearchBackend;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchCall {
    pub index: String,
    pub body: Value,
}

/// Scripted search backend that records every call.
#[derive(Default)]
pub struct MockSearchBackend {
    responses: Mutex<VecDeque<Result<SearchResponse, SearchError>>>,
    calls: Mutex<Vec<SearchCall>>,
}

impl MockSearchBackend {
    pub fn new(responses: Vec<Result<SearchResponse, SearchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Response with one hit per `(index, body, chunks)` entry.
    pub fn response(hits: &[(&str, &str, &[&str])]) -> SearchResponse {
        SearchResponse {
            took_ms: 1,
            total: Some(hits.len() as u64),
            hits: hits
                .iter()
                .enumerate()
                .map(|(i, (index, body, chunks))| SearchHit {
                    index: (*index).to_string(),
                    id: format!("doc-{i}"),
                    score: Some(1.0),
                    source: json!({ "body": body }),
                    chunks: chunks
                        .iter()
                        .map(|c| ChunkMatch {
                            text: (*c).to_string(),
                            score: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        self.calls.lock().push(SearchCall {
            index: index.to_string(),
            body: body.clone(),
        });
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(SearchError::Network("MockSearchBackend: no response configured".into()))
        })
    }
}
