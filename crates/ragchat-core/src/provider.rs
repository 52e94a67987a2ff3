use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::errors::GatewayError;
use crate::messages::ConversationTurn;
use crate::stream::StreamEvent;

/// Everything the provider needs to build one request.
#[derive(Clone, Debug, Default)]
pub struct LlmContext {
    pub system_prompt: Option<String>,
    pub messages: Vec<ConversationTurn>,
}

impl LlmContext {
    /// Single user message, no system prompt. Every stage in this crate family
    /// sends its instructions as one rendered prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            messages: vec![ConversationTurn::user(prompt)],
        }
    }
}

/// Options controlling LLM generation behavior.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stop_sequences: Vec<String>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Trait implemented by each LLM provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Streaming completion. Dropping the returned stream tears down the
    /// underlying request.
    async fn stream(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> Result<EventStream, GatewayError>;

    /// Blocking completion: drains [`LlmProvider::stream`] and returns the
    /// full text.
    async fn complete(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> Result<String, GatewayError> {
        let mut stream = self.stream(context, options).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta { delta } => text.push_str(&delta),
                StreamEvent::Done { text: done_text, .. } => {
                    if text.is_empty() {
                        text = done_text;
                    }
                    return Ok(text);
                }
                StreamEvent::Error { error } => return Err(error),
                _ => {}
            }
        }
        Err(GatewayError::StreamInterrupted(
            "stream ended without a done event".into(),
        ))
    }
}
