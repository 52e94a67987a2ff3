use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use ragchat_core::errors::GatewayError;
use ragchat_core::events::ClientEvent;
use ragchat_core::provider::{LlmContext, LlmProvider, StreamOptions};
use ragchat_core::stream::StreamEvent;

use crate::error::TurnError;
use crate::sink::EventSink;

/// Generates the answer and forwards it to the client.
pub struct AnswerStreamer {
    provider: Arc<dyn LlmProvider>,
    options: StreamOptions,
    streaming: bool,
    timeout: Duration,
}

impl AnswerStreamer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        options: StreamOptions,
        streaming: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            options,
            streaming,
            timeout,
        }
    }

    fn timed_out(&self) -> TurnError {
        TurnError::Generation(GatewayError::Timeout(self.timeout))
    }

    /// Returns the accumulated answer. In streaming mode every text delta is
    /// forwarded as `content_delta` in provider order, so the concatenated
    /// deltas equal the returned text. Otherwise one `full_response` is sent.
    ///
    /// The blocking completion, or the request that opens the stream, must
    /// finish within the configured timeout. Gaps inside an open stream are
    /// bounded by the provider's idle timeout.
    ///
    /// Cancelling `cancel` drops the provider stream and yields
    /// [`TurnError::Cancelled`].
    #[instrument(skip_all, fields(streaming = self.streaming, prompt_len = prompt.len()))]
    pub async fn stream(
        &self,
        prompt: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let ctx = LlmContext::from_prompt(prompt);

        if !self.streaming {
            let call =
                tokio::time::timeout(self.timeout, self.provider.complete(&ctx, &self.options));
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                res = call => {
                    res.map_err(|_| self.timed_out())?.map_err(TurnError::Generation)?
                }
            };
            sink.emit(ClientEvent::full_response(text.clone()))
                .await
                .map_err(|_| TurnError::Cancelled)?;
            return Ok(text);
        }

        let open = tokio::time::timeout(self.timeout, self.provider.stream(&ctx, &self.options));
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            res = open => {
                res.map_err(|_| self.timed_out())?.map_err(TurnError::Generation)?
            }
        };

        let mut text = String::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(partial_len = text.len(), "answer stream cancelled");
                    return Err(TurnError::Cancelled);
                }
                event = stream.next() => event,
            };

            match event {
                Some(StreamEvent::TextDelta { delta }) => {
                    text.push_str(&delta);
                    sink.emit(ClientEvent::delta(delta))
                        .await
                        .map_err(|_| TurnError::Cancelled)?;
                }
                Some(StreamEvent::Done { stop_reason, usage, .. }) => {
                    debug!(
                        ?stop_reason,
                        output_tokens = usage.output_tokens,
                        len = text.len(),
                        "answer complete"
                    );
                    return Ok(text);
                }
                Some(StreamEvent::Error { error }) => return Err(TurnError::Generation(error)),
                Some(other) => debug!(kind = other.kind(), "dropping non-delta stream event"),
                None => {
                    return Err(TurnError::Generation(GatewayError::StreamInterrupted(
                        "stream ended before completion".into(),
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use ragchat_llm::{MockProvider, MockResponse};

    fn streamer(
        responses: Vec<MockResponse>,
        streaming: bool,
    ) -> (AnswerStreamer, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        let streamer = AnswerStreamer::new(
            provider.clone(),
            StreamOptions::default(),
            streaming,
            Duration::from_secs(60),
        );
        (streamer, provider)
    }

    fn late_answer() -> MockResponse {
        MockResponse::delayed(Duration::from_secs(86_400), MockResponse::stream_text("late"))
    }

    fn deltas(events: &[ClientEvent]) -> String {
        events
            .iter()
            .filter(|e| matches!(e, ClientEvent::ContentDelta { .. }))
            .map(|e| e.text())
            .collect()
    }

    #[tokio::test]
    async fn forwards_deltas_in_order_and_accumulates() {
        let (streamer, _) =
            streamer(vec![MockResponse::stream_chunks(&["The ", "age ", "is 18."])], true);
        let sink = RecordingSink::default();
        let text = streamer.stream("prompt", &sink, &CancellationToken::new()).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 3, "only deltas are forwarded: {events:?}");
        assert_eq!(events[0], ClientEvent::delta("The "));
        assert_eq!(events[2], ClientEvent::delta("is 18."));
        assert_eq!(text, "The age is 18.");
        assert_eq!(deltas(&events), text);
    }

    #[tokio::test]
    async fn error_event_is_generation_error() {
        let (streamer, _) = streamer(
            vec![MockResponse::stream_error_after(&["partial"], GatewayError::ProviderOverloaded)],
            true,
        );
        let sink = RecordingSink::default();
        let err = streamer.stream("p", &sink, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Generation(GatewayError::ProviderOverloaded)));
        assert_eq!(sink.events(), vec![ClientEvent::delta("partial")]);
    }

    #[tokio::test]
    async fn request_failure_is_generation_error() {
        let (streamer, _) = streamer(
            vec![MockResponse::Error(GatewayError::AuthenticationFailed("k".into()))],
            true,
        );
        let err = streamer
            .stream("p", &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(_)));
    }

    #[tokio::test]
    async fn truncated_stream_is_generation_error() {
        let (streamer, _) = streamer(
            vec![MockResponse::Stream(vec![StreamEvent::TextDelta { delta: "x".into() }])],
            true,
        );
        let err = streamer
            .stream("p", &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(GatewayError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn cancellation_tears_down_provider_stream() {
        let (streamer, provider) = streamer(vec![MockResponse::hang_after(&["one ", "two"])], true);
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let task = {
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { streamer.stream("p", sink.as_ref(), &cancel).await })
        };

        while sink.events().len() < 2 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
        assert_eq!(provider.streams_dropped(), 1);
    }

    #[tokio::test]
    async fn closed_sink_cancels_turn() {
        let (streamer, _) = streamer(vec![MockResponse::stream_chunks(&["a", "b", "c"])], true);
        let sink = RecordingSink::closing_after(1);
        let err = streamer.stream("p", &sink, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
    }

    #[tokio::test]
    async fn slow_stream_request_times_out() {
        tokio::time::pause();
        let (streamer, _) = streamer(vec![late_answer()], true);
        let sink = RecordingSink::default();
        let err = streamer.stream("p", &sink, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::Generation(GatewayError::Timeout(d)) if d == Duration::from_secs(60)
        ));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn slow_completion_times_out() {
        tokio::time::pause();
        let (streamer, _) = streamer(vec![late_answer()], false);
        let err = streamer
            .stream("p", &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(GatewayError::Timeout(_))));
    }

    #[tokio::test]
    async fn non_streaming_sends_single_full_response() {
        let (streamer, _) =
            streamer(vec![MockResponse::stream_chunks(&["Hello ", "there"])], false);
        let sink = RecordingSink::default();
        let text = streamer.stream("p", &sink, &CancellationToken::new()).await.unwrap();
        assert_eq!(text, "Hello there");
        assert_eq!(sink.events(), vec![ClientEvent::full_response("Hello there")]);
    }
}
