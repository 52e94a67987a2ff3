//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every section is `#[serde(default)]`,
//! so a partial JSON file only needs the keys it changes.

mod backends;
mod server;

pub use backends::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

const CONTEXT_TYPES: &[&str] = &["doc", "document", "passage", "surrounding"];

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "corpus": { "knownPartitions": ["ca", "ny", "tx"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagChatSettings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub corpus: CorpusSettings,
    pub turn: TurnSettings,
    pub logging: LoggingSettings,
}

impl RagChatSettings {
    /// Reject values that deserialize but cannot be used.
    pub fn validate(&self) -> Result<()> {
        let context_type = self.corpus.context_type.trim().to_ascii_lowercase();
        if !CONTEXT_TYPES.contains(&context_type.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "corpus.contextType: {}",
                self.corpus.context_type
            )));
        }
        if self.corpus.partition_prefix.is_empty() {
            return Err(SettingsError::InvalidValue(
                "corpus.partitionPrefix must not be empty".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(SettingsError::InvalidValue("llm.maxTokens must be positive".into()));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue("server.maxSendQueue must be positive".into()));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.search.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("search.url must not be empty".into()));
        }
        Ok(())
    }
}
