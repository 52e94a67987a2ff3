use ragchat_core::messages::ConversationState;

use crate::corpus::CorpusProfile;

const RETRIEVER_TEMPLATE: &str = include_str!("../prompts/retriever.txt");
const ANSWER_TEMPLATE: &str = include_str!("../prompts/answer.txt");
const SUMMARY_TEMPLATE: &str = include_str!("../prompts/summary.txt");

const EMPTY_HISTORY: &str = "(no previous messages)";

/// Single-pass `{{name}}` substitution. Inserted values are never rescanned,
/// so user text containing braces is left alone. Unknown names stay verbatim.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.iter().find(|(k, _)| *k == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn history_text(history: &ConversationState) -> String {
    if history.is_empty() {
        EMPTY_HISTORY.to_string()
    } else {
        history.render("\n")
    }
}

/// Instruction for the planning call.
pub fn retriever_prompt(
    corpus: &CorpusProfile,
    question: &str,
    history: &ConversationState,
) -> String {
    let known = if corpus.known_partitions.is_empty() {
        String::new()
    } else {
        format!(
            "Available {}s: {}.",
            corpus.partition_label,
            corpus.known_partitions.join(", ")
        )
    };
    let semantic = pretty(&corpus.semantic_query("<QUESTION>"));
    let lexical = pretty(&corpus.lexical_query("<TERMS>"));
    let wildcard = corpus.wildcard_index();

    render(
        RETRIEVER_TEMPLATE,
        &[
            ("topic", corpus.topic.as_str()),
            ("partition_label", corpus.partition_label.as_str()),
            ("prefix", corpus.partitions.prefix.as_str()),
            ("known_partitions", known.as_str()),
            ("wildcard", wildcard.as_str()),
            ("semantic_example", semantic.as_str()),
            ("lexical_example", lexical.as_str()),
            ("history", history_text(history).as_str()),
            ("question", question),
        ],
    )
}

/// Final prompt for answer generation.
pub fn answer_prompt(
    corpus: &CorpusProfile,
    context: &str,
    question: &str,
    history: &ConversationState,
) -> String {
    render(
        ANSWER_TEMPLATE,
        &[
            ("topic", corpus.topic.as_str()),
            ("history", history_text(history).as_str()),
            ("context", context),
            ("question", question),
        ],
    )
}

/// Summarizer instruction covering the whole history plus the new exchange.
pub fn summary_prompt(
    corpus: &CorpusProfile,
    history: &ConversationState,
    user_message: &str,
    ai_response: &str,
) -> String {
    render(
        SUMMARY_TEMPLATE,
        &[
            ("topic", corpus.topic.as_str()),
            ("history", history_text(history).as_str()),
            ("user_message", user_message),
            ("ai_response", ai_response),
        ],
    )
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
