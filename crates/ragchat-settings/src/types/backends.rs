//! Language-model and search backend settings.

use serde::{Deserialize, Serialize};

/// Language-model provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    pub model: String,
    /// Output token cap per call.
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Idle timeout between streamed chunks, in milliseconds.
    pub request_timeout_ms: u64,
    /// Stream answers as `content_delta`; otherwise send one `full_response`.
    pub streaming: bool,
    /// Messages API endpoint.
    pub api_url: String,
    /// Usually supplied through `ANTHROPIC_API_KEY` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 2_000,
            temperature: None,
            request_timeout_ms: 60_000,
            streaming: true,
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: None,
        }
    }
}

/// Search cluster settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Takes precedence over basic auth when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hits: Option<u32>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            api_key: None,
            request_timeout_ms: 90_000,
            max_hits: None,
        }
    }
}

/// Indexed corpus description: partition naming and field layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorpusSettings {
    pub topic: String,
    pub partition_label: String,
    pub partition_prefix: String,
    pub wildcard_label: String,
    pub known_partitions: Vec<String>,
    /// `doc`, `passage` or `surrounding`.
    pub context_type: String,
    pub document_field: String,
    pub chunk_path: String,
    pub chunk_text_field: String,
    pub inference_id: String,
    pub inner_hits_size: u32,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            topic: "Notary".to_string(),
            partition_label: "state".to_string(),
            partition_prefix: "notary_".to_string(),
            wildcard_label: "All States".to_string(),
            known_partitions: Vec::new(),
            context_type: "passage".to_string(),
            document_field: "body".to_string(),
            chunk_path: "semantic_body.inference.chunks".to_string(),
            chunk_text_field: "text".to_string(),
            inference_id: ".elser-2-elasticsearch".to_string(),
            inner_hits_size: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_defaults() {
        let l = LlmSettings::default();
        assert_eq!(l.max_tokens, 2_000);
        assert!(l.streaming);
        assert!(l.api_key.is_none());
    }

    #[test]
    fn secrets_are_not_serialized_when_absent() {
        let json = serde_json::to_value(SearchSettings::default()).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("apiKey").is_none());
        assert_eq!(json["requestTimeoutMs"], 90_000);
    }

    #[test]
    fn corpus_defaults_match_notary_index_layout() {
        let c = CorpusSettings::default();
        assert_eq!(c.partition_prefix, "notary_");
        assert_eq!(c.wildcard_label, "All States");
        assert_eq!(c.chunk_path, "semantic_body.inference.chunks");
    }

    #[test]
    fn corpus_known_partitions_from_json() {
        let c: CorpusSettings =
            serde_json::from_str(r#"{"knownPartitions": ["ca", "ny"]}"#).unwrap();
        assert_eq!(c.known_partitions, vec!["ca", "ny"]);
        assert_eq!(c.topic, "Notary");
    }
}
