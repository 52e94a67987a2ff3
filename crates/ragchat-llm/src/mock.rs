use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;

use ragchat_core::errors::GatewayError;
use ragchat_core::provider::{EventStream, LlmContext, LlmProvider, StreamOptions};
use ragchat_core::stream::{StopReason, StreamEvent};
use ragchat_core::tokens::TokenUsage;

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Return an error from the stream() call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Yield the events, then never finish. Used to test cancellation.
    Hang(Vec<StreamEvent>),
    /// Panic inside the provider call.
    Panic(String),
}

impl MockResponse {
    /// A complete text response delivered as one delta.
    pub fn stream_text(text: &str) -> Self {
        Self::stream_chunks(&[text])
    }

    /// A complete text response delivered as one delta per chunk.
    pub fn stream_chunks(chunks: &[&str]) -> Self {
        let full: String = chunks.concat();
        let mut events = vec![StreamEvent::Start, StreamEvent::TextStart];
        events.extend(chunks.iter().map(|c| StreamEvent::TextDelta {
            delta: (*c).to_string(),
        }));
        events.push(StreamEvent::TextEnd {
            text: full.clone(),
        });
        events.push(StreamEvent::Done {
            text: full,
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        });
        Self::Stream(events)
    }

    /// Deltas followed by an error event.
    pub fn stream_error_after(chunks: &[&str], error: GatewayError) -> Self {
        let mut events = vec![StreamEvent::Start, StreamEvent::TextStart];
        events.extend(chunks.iter().map(|c| StreamEvent::TextDelta {
            delta: (*c).to_string(),
        }));
        events.push(StreamEvent::Error { error });
        Self::Stream(events)
    }

    /// Deltas, then the stream stays open until dropped.
    pub fn hang_after(chunks: &[&str]) -> Self {
        let mut events = vec![StreamEvent::Start, StreamEvent::TextStart];
        events.extend(chunks.iter().map(|c| StreamEvent::TextDelta {
            delta: (*c).to_string(),
        }));
        Self::Hang(events)
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records the prompt of every call.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    streams_dropped: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            streams_dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Last user message of each call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Number of returned streams that have been dropped.
    pub fn streams_dropped(&self) -> usize {
        self.streams_dropped.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(
        &self,
        context: &LlmContext,
        _options: &StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        let prompt = context
            .messages
            .last()
            .map(|m| m.content().to_string())
            .unwrap_or_default();
        self.prompts.lock().push(prompt);

        let next = self.responses.lock().pop_front();
        let Some(mut current) = next else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        loop {
            match current {
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
                MockResponse::Stream(events) => {
                    let guard = DropCounter(self.streams_dropped.clone());
                    return Ok(Box::pin(stream::iter(events).map(move |e| {
                        let _held = &guard;
                        e
                    })));
                }
                MockResponse::Hang(events) => {
                    let guard = DropCounter(self.streams_dropped.clone());
                    let events = stream::iter(events).chain(stream::pending::<StreamEvent>());
                    return Ok(Box::pin(events.map(move |e| {
                        let _held = &guard;
                        e
                    })));
                }
                MockResponse::Error(e) => return Err(e),
                MockResponse::Panic(msg) => panic!("{msg}"),
            }
        }
    }
}
