use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Retrieval mode chosen by the planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Lexical,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity of the passages handed to the answer prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Doc,
    #[default]
    Passage,
    Surrounding,
}

impl std::str::FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doc" | "document" => Ok(Self::Doc),
            "passage" => Ok(Self::Passage),
            "surrounding" => Ok(Self::Surrounding),
            other => Err(format!("unknown context type: {other}")),
        }
    }
}

/// Structured retrieval instruction produced by the planner.
///
/// `query` is the request body sent to the backend as-is (for Elasticsearch,
/// an object holding `query` or `retriever`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub query: Map<String, Value>,
    pub index: String,
    pub search_type: SearchType,
}

impl RetrievalPlan {
    pub fn query_value(&self) -> Value {
        Value::Object(self.query.clone())
    }
}

/// One nested sub-document match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// One hit in backend order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub chunks: Vec<ChunkMatch>,
}

impl SearchHit {
    /// String value of a top-level source field, if present.
    pub fn source_text(&self, field: &str) -> Option<&str> {
        self.source.get(field).and_then(Value::as_str)
    }
}

/// Backend response envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// Executor output. Both the primary and the fallback path produce this.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub index: String,
    pub search_type: SearchType,
    pub via_fallback: bool,
    pub response: SearchResponse,
}

impl SearchResult {
    pub fn hits(&self) -> &[SearchHit] {
        &self.response.hits
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        self.response.hits
    }
}

/// Passages in citation order plus the prompt-ready rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextBlock {
    pub passages: Vec<String>,
    pub formatted: String,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Naming scheme for backend partitions, e.g. `notary_california`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionScheme {
    pub prefix: String,
    pub wildcard_label: String,
}

impl PartitionScheme {
    pub fn new(prefix: impl Into<String>, wildcard_label: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            wildcard_label: wildcard_label.into(),
        }
    }

    /// Index pattern covering every partition.
    pub fn wildcard(&self) -> String {
        format!("{}*", self.prefix)
    }

    pub fn index_for(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Category key of an index: the prefix stripped, else the text after the
    /// first `_`, else the index itself.
    pub fn key_of<'a>(&self, index: &'a str) -> &'a str {
        if let Some(rest) = index.strip_prefix(self.prefix.as_str()) {
            if !rest.is_empty() {
                return rest;
            }
        }
        match index.split_once('_') {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => index,
        }
    }

    pub fn is_wildcard(&self, index: &str) -> bool {
        self.key_of(index) == "*"
    }

    /// Human label for progress events.
    pub fn label_of<'a>(&'a self, index: &'a str) -> &'a str {
        if self.is_wildcard(index) {
            &self.wildcard_label
        } else {
            self.key_of(index)
        }
    }
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self::new("notary_", "All States")
    }
}
