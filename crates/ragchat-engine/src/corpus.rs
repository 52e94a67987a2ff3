use serde_json::{json, Value};

use ragchat_core::retrieval::{ContextType, PartitionScheme};

/// Describes the indexed corpus: how partitions are named and which fields
/// hold document and chunk text.
#[derive(Clone, Debug)]
pub struct CorpusProfile {
    /// Display name used in prompts and apologies, e.g. "Notary".
    pub topic: String,
    /// What one partition represents, e.g. "state".
    pub partition_label: String,
    pub partitions: PartitionScheme,
    /// Partition keys the planner may choose from. Empty means any.
    pub known_partitions: Vec<String>,
    pub context_type: ContextType,
    pub document_field: String,
    pub chunk_path: String,
    pub chunk_text_field: String,
    pub inference_id: String,
    pub inner_hits_size: u32,
}

impl Default for CorpusProfile {
    fn default() -> Self {
        Self {
            topic: "Notary".into(),
            partition_label: "state".into(),
            partitions: PartitionScheme::default(),
            known_partitions: Vec::new(),
            context_type: ContextType::Passage,
            document_field: "body".into(),
            chunk_path: "semantic_body.inference.chunks".into(),
            chunk_text_field: "text".into(),
            inference_id: ".elser-2-elasticsearch".into(),
            inner_hits_size: 3,
        }
    }
}

impl CorpusProfile {
    pub fn wildcard_index(&self) -> String {
        self.partitions.wildcard()
    }

    /// Nested sparse-vector query over chunk embeddings, returning the best
    /// chunks of each hit as inner hits. Valid for any question text.
    pub fn semantic_query(&self, question: &str) -> Value {
        json!({
            "_source": { "excludes": [format!("{}.embeddings", self.chunk_path)] },
            "query": {
                "nested": {
                    "path": self.chunk_path,
                    "query": {
                        "sparse_vector": {
                            "inference_id": self.inference_id,
                            "field": format!("{}.embeddings", self.chunk_path),
                            "query": question
                        }
                    },
                    "inner_hits": {
                        "size": self.inner_hits_size,
                        "name": self.chunk_path,
                        "_source": [format!("{}.{}", self.chunk_path, self.chunk_text_field)]
                    }
                }
            }
        })
    }

    /// Full-text match on the document field.
    pub fn lexical_query(&self, question: &str) -> Value {
        let mut field = serde_json::Map::new();
        field.insert(self.document_field.clone(), json!({ "query": question }));
        json!({ "query": { "match": field } })
    }
}
