use tracing::debug;

use ragchat_core::retrieval::{ContextBlock, ContextType, SearchHit, SearchResult, SearchType};

/// Turns search hits into citation-ordered passages.
pub struct ContextAssembler {
    document_field: String,
}

impl ContextAssembler {
    pub fn new(document_field: impl Into<String>) -> Self {
        Self {
            document_field: document_field.into(),
        }
    }

    /// Consumes the result. Passage order follows hit order, then chunk order,
    /// and is the citation index used in the answer prompt.
    pub fn assemble(
        &self,
        result: SearchResult,
        context_type: ContextType,
        search_type: SearchType,
    ) -> ContextBlock {
        let hits = result.into_hits();

        let passages: Vec<String> = match (search_type, context_type) {
            (SearchType::Lexical, _) | (_, ContextType::Doc) => {
                hits.iter().map(|hit| self.document_text(hit)).collect()
            }
            (SearchType::Semantic, ContextType::Passage) => hits
                .into_iter()
                .flat_map(|hit| {
                    if hit.chunks.is_empty() {
                        debug!(index = %hit.index, id = %hit.id, "hit has no chunk matches");
                    }
                    hit.chunks.into_iter().map(|c| c.text)
                })
                .collect(),
            // Window expansion around matched chunks is not implemented.
            (SearchType::Semantic, ContextType::Surrounding) => Vec::new(),
        };

        let formatted = format_passages(&passages);
        ContextBlock { passages, formatted }
    }

    /// The document field when it holds text, else the whole source as JSON.
    fn document_text(&self, hit: &SearchHit) -> String {
        match hit.source_text(&self.document_field) {
            Some(text) => text.to_string(),
            None => hit.source.to_string(),
        }
    }
}

/// Numbered passages, one block each, in citation order.
pub fn format_passages(passages: &[String]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::retrieval::{ChunkMatch, SearchResponse};
    use serde_json::json;

    fn hit(index: &str, body: serde_json::Value, chunks: &[&str]) -> SearchHit {
        SearchHit {
            index: index.into(),
            id: format!("{index}-1"),
            score: Some(1.0),
            source: body,
            chunks: chunks
                .iter()
                .map(|c| ChunkMatch {
                    text: (*c).into(),
                    score: None,
                })
                .collect(),
        }
    }

    fn result(hits: Vec<SearchHit>) -> SearchResult {
        SearchResult {
            index: "notary_*".into(),
            search_type: SearchType::Semantic,
            via_fallback: false,
            response: SearchResponse {
                took_ms: 1,
                total: Some(hits.len() as u64),
                hits,
            },
        }
    }

    fn sample() -> SearchResult {
        result(vec![
            hit("notary_ca", json!({"body": "CA doc"}), &["ca-1", "ca-2"]),
            hit("notary_tx", json!({"body": "TX doc"}), &["tx-1"]),
        ])
    }

    #[test]
    fn passage_mode_emits_each_chunk_in_hit_then_chunk_order() {
        let block = ContextAssembler::new("body").assemble(
            sample(),
            ContextType::Passage,
            SearchType::Semantic,
        );
        assert_eq!(block.passages, vec!["ca-1", "ca-2", "tx-1"]);
        assert_eq!(block.formatted, "[1] ca-1\n\n[2] ca-2\n\n[3] tx-1");
    }

    #[test]
    fn doc_mode_emits_one_passage_per_hit() {
        let block = ContextAssembler::new("body").assemble(
            sample(),
            ContextType::Doc,
            SearchType::Semantic,
        );
        assert_eq!(block.passages, vec!["CA doc", "TX doc"]);
    }

    #[test]
    fn lexical_always_uses_documents() {
        let block = ContextAssembler::new("body").assemble(
            sample(),
            ContextType::Passage,
            SearchType::Lexical,
        );
        assert_eq!(block.passages, vec!["CA doc", "TX doc"]);
    }

    #[test]
    fn missing_document_field_falls_back_to_source_json() {
        let res = result(vec![hit("notary_ny", json!({"title": "NY"}), &[])]);
        let block = ContextAssembler::new("body").assemble(
            res,
            ContextType::Doc,
            SearchType::Lexical,
        );
        assert_eq!(block.passages, vec![r#"{"title":"NY"}"#]);
    }

    #[test]
    fn surrounding_is_an_empty_no_op() {
        let block = ContextAssembler::new("body").assemble(
            sample(),
            ContextType::Surrounding,
            SearchType::Semantic,
        );
        assert!(block.is_empty());
        assert!(block.formatted.is_empty());
    }

    #[test]
    fn empty_result_gives_empty_block() {
        let block = ContextAssembler::new("body").assemble(
            result(vec![]),
            ContextType::Passage,
            SearchType::Semantic,
        );
        assert!(block.is_empty());
    }

    #[test]
    fn ordering_is_stable_across_runs() {
        let assembler = ContextAssembler::new("body");
        let a = assembler.assemble(sample(), ContextType::Passage, SearchType::Semantic);
        let b = assembler.assemble(sample(), ContextType::Passage, SearchType::Semantic);
        assert_eq!(a, b);
    }
}
