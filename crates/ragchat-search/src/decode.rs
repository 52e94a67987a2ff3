use serde::Deserialize;
use serde_json::{Map, Value};

use ragchat_core::errors::SearchError;
use ragchat_core::retrieval::{ChunkMatch, SearchHit, SearchResponse};

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    took: u64,
    hits: RawHits,
}

#[derive(Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<Value>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    inner_hits: Map<String, Value>,
}

/// Decode an Elasticsearch `_search` response body.
///
/// Nested chunk matches come from every `inner_hits` section. Sections are
/// taken in name order and chunks within a section keep the backend's order;
/// a chunk's text is `_source.<chunk_text_field>`.
pub fn decode_response(body: &str, chunk_text_field: &str) -> Result<SearchResponse, SearchError> {
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    let hits = raw
        .hits
        .hits
        .into_iter()
        .map(|hit| SearchHit {
            chunks: decode_chunks(&hit.inner_hits, chunk_text_field),
            index: hit.index,
            id: hit.id,
            score: hit.score,
            source: hit.source,
        })
        .collect();

    Ok(SearchResponse {
        took_ms: raw.took,
        total: raw.hits.total.as_ref().and_then(total_value),
        hits,
    })
}

fn decode_chunks(inner_hits: &Map<String, Value>, text_field: &str) -> Vec<ChunkMatch> {
    let mut sections: Vec<_> = inner_hits.iter().collect();
    sections.sort_by(|a, b| a.0.cmp(b.0));
    sections
        .into_iter()
        .map(|(_, section)| section)
        .filter_map(|section| section.pointer("/hits/hits").and_then(Value::as_array))
        .flatten()
        .filter_map(|chunk| {
            let text = chunk
                .get("_source")
                .and_then(|s| s.get(text_field))
                .and_then(Value::as_str)?;
            Some(ChunkMatch {
                text: text.to_string(),
                score: chunk.get("_score").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// `hits.total` is either a number or `{"value": n, "relation": ..}`.
fn total_value(total: &Value) -> Option<u64> {
    total
        .as_u64()
        .or_else(|| total.get("value").and_then(Value::as_u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSAGE_RESPONSE: &str = r#"{
        "took": 12,
        "timed_out": false,
        "hits": {
            "total": {"value": 2, "relation": "eq"},
            "hits": [
                {
                    "_index": "notary_california",
                    "_id": "doc-1",
                    "_score": 14.2,
                    "_source": {"title": "Eligibility", "body": "Full body one"},
                    "inner_hits": {
                        "semantic_body.inference.chunks": {
                            "hits": {"hits": [
                                {"_score": 9.1, "_source": {"text": "Applicants must be 18."}},
                                {"_score": 7.4, "_source": {"text": "Residency is required."}}
                            ]}
                        }
                    }
                },
                {
                    "_index": "notary_texas",
                    "_id": "doc-2",
                    "_score": 11.0,
                    "_source": {"body": "Full body two"},
                    "inner_hits": {
                        "semantic_body.inference.chunks": {
                            "hits": {"hits": [
                                {"_score": 8.0, "_source": {"text": "Texas requires 18 years."}}
                            ]}
                        }
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn decodes_hits_and_chunks_in_order() {
        let resp = decode_response(PASSAGE_RESPONSE, "text").unwrap();
        assert_eq!(resp.took_ms, 12);
        assert_eq!(resp.total, Some(2));
        assert_eq!(resp.hits.len(), 2);

        let first = &resp.hits[0];
        assert_eq!(first.index, "notary_california");
        assert_eq!(first.id, "doc-1");
        assert_eq!(first.source_text("body"), Some("Full body one"));
        let texts: Vec<_> = first.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Applicants must be 18.", "Residency is required."]);
        assert_eq!(first.chunks[0].score, Some(9.1));

        assert_eq!(resp.hits[1].chunks.len(), 1);
    }

    #[test]
    fn lexical_response_has_no_chunks() {
        let body = r#"{"took": 3, "hits": {"total": 1, "hits": [
            {"_index": "notary_ohio", "_id": "x", "_score": 2.0, "_source": {"body": "Ohio rules"}}
        ]}}"#;
        let resp = decode_response(body, "text").unwrap();
        assert_eq!(resp.total, Some(1));
        assert!(resp.hits[0].chunks.is_empty());
    }

    #[test]
    fn chunks_without_text_field_are_skipped() {
        let body = r#"{"hits": {"hits": [
            {"_index": "i", "inner_hits": {"c": {"hits": {"hits": [
                {"_source": {"other": "x"}},
                {"_source": {"text": "kept"}}
            ]}}}}
        ]}}"#;
        let resp = decode_response(body, "text").unwrap();
        assert_eq!(resp.hits[0].chunks.len(), 1);
        assert_eq!(resp.hits[0].chunks[0].text, "kept");
        assert_eq!(resp.hits[0].score, None);
    }

    #[test]
    fn missing_hits_is_decode_error() {
        let err = decode_response(r#"{"took": 1}"#, "text").unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
        assert!(decode_response("<html>", "text").is_err());
    }

    #[test]
    fn multiple_inner_hit_sections_are_ordered_by_name() {
        let body = r#"{
            "took": 3,
            "hits": {"hits": [{
                "_index": "notary_ca",
                "_source": {},
                "inner_hits": {
                    "semantic_title.inference.chunks": {"hits": {"hits": [
                        {"_source": {"text": "title chunk"}}
                    ]}},
                    "semantic_body.inference.chunks": {"hits": {"hits": [
                        {"_source": {"text": "body one"}},
                        {"_source": {"text": "body two"}}
                    ]}}
                }
            }]}
        }"#;
        let response = decode_response(body, "text").unwrap();
        let texts: Vec<_> = response.hits[0].chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["body one", "body two", "title chunk"]);
    }
}
