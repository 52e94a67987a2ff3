use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Future, Stream, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

use ragchat_core::errors::GatewayError;
use ragchat_core::provider::{EventStream, LlmContext, LlmProvider, StreamOptions};
use ragchat_core::stream::StreamEvent;

use crate::converter;
use crate::models::{self, ClaudeModelInfo};
use crate::sse::{self, SseParser};

pub const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection settings for [`AnthropicProvider`].
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_url: String,
    /// Maximum silence between SSE chunks before the stream is failed.
    pub idle_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            api_url: API_URL.to_string(),
            idle_timeout: SSE_IDLE_TIMEOUT,
        }
    }
}

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
    model_info: &'static ClaudeModelInfo,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let model_info = models::find_model(&config.model).unwrap_or_else(|| {
            warn!(model = %config.model, "unknown model, using default limits");
            models::default_model()
        });

        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            config,
            model_info,
        }
    }

    pub fn model_info(&self) -> &'static ClaudeModelInfo {
        self.model_info
    }

    fn build_request(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> reqwest::RequestBuilder {
        let body =
            converter::build_request_body(context, options, &self.config.model, self.model_info);

        self.client
            .post(&self.config.api_url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("accept", "text/event-stream")
            .header("content-type", "application/json")
            .json(&body)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, context, options), fields(model = %self.config.model))]
    async fn stream(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        let resp = self
            .build_request(context, options)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(CONNECT_TIMEOUT)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, body));
        }

        let model_info = self.model_info;
        let stream = SseStream::with_idle_timeout(resp.bytes_stream(), self.config.idle_timeout)
            .inspect(move |event| {
                if let StreamEvent::Done { usage, stop_reason, .. } = event {
                    let cost_usd =
                        model_info.calculate_cost(usage.input_tokens, usage.output_tokens);
                    debug!(
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        stop_reason = ?stop_reason,
                        cost_usd,
                        "llm response complete"
                    );
                }
            });

        Ok(Box::pin(stream))
    }
}

/// Wraps a byte stream from reqwest and yields StreamEvents.
/// Includes an idle timeout: if no data arrives within `idle_duration`, emits an error.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: SseParser,
    buffer: BytesMut,
    pending: std::collections::VecDeque<StreamEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    finished: bool,
}

impl SseStream {
    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            buffer: BytesMut::new(),
            pending: std::collections::VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            finished: false,
        }
    }

    /// Parse every complete event in the buffer. Bytes are only decoded once
    /// an event is whole, so multibyte characters split across network chunks
    /// survive intact.
    fn drain_buffer(&mut self, flush: bool) {
        while let Some(pos) = find_event_boundary(&self.buffer) {
            let chunk = self.buffer.split_to(pos + 2);
            self.parse_chunk(&chunk);
        }
        if flush && !self.buffer.is_empty() {
            let remaining = self.buffer.split();
            self.parse_chunk(&remaining);
        }
    }

    fn parse_chunk(&mut self, chunk: &[u8]) {
        let Ok(text) = std::str::from_utf8(chunk) else {
            warn!(len = chunk.len(), "skipping SSE event with invalid UTF-8");
            return;
        };
        for (event_type, data) in sse::parse_sse_lines(text) {
            self.pending.extend(self.parser.parse_event(&event_type, &data));
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

impl Stream for SseStream {
    type Item = StreamEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    self.buffer.extend_from_slice(&bytes);
                    self.drain_buffer(false);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(StreamEvent::Error {
                        error: GatewayError::StreamInterrupted(e.to_string()),
                    }));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    self.drain_buffer(true);
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.finished = true;
                        return Poll::Ready(Some(StreamEvent::Error {
                            error: GatewayError::StreamInterrupted(format!(
                                "idle timeout after {}s",
                                self.idle_duration.as_secs()
                            )),
                        }));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
