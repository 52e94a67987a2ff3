//! Per-connection session: the turn state machine.
//!
//! A [`ChatSession`] owns the conversation history of one connection and runs
//! one turn at a time. Turn-scoped failures end in a single `error_message`
//! and a return to [`SessionState::Idle`]; only a [`ConnectionFault`] closes
//! the connection.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use ragchat_core::events::{ClientEvent, InboundMessage};
use ragchat_core::ids::ConnectionId;
use ragchat_core::messages::ConversationState;
use ragchat_engine::prompts;
use ragchat_engine::{EventSink, TurnError, TurnPipeline};

/// Separator between passages and history entries in progress events.
const RULE: &str = "\n---------------------------------------------------------\n\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Planning,
    Retrieving,
    Fallback,
    AssemblingContext,
    Streaming,
    UpdatingHistory,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Retrieving => "retrieving",
            Self::Fallback => "fallback",
            Self::AssemblingContext => "assembling_context",
            Self::Streaming => "streaming",
            Self::UpdatingHistory => "updating_history",
            Self::Closed => "closed",
        }
    }

    /// Legal edges of the turn state machine. Any in-flight state may fall
    /// back to `Idle` when its turn fails, and anything but `Closed` may close.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Planning) => true,
            (Idle, _) => false,
            (_, Idle) => true,
            (Planning, Retrieving) => true,
            (Retrieving, Fallback | AssemblingContext) => true,
            (Fallback, AssemblingContext) => true,
            (AssemblingContext, Streaming) => true,
            (Streaming, UpdatingHistory) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecoverable failure of one connection. The connection is closed with
/// the internal-error code.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionFault {
    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition { from: SessionState, to: SessionState },
    #[error("turn panicked: {0}")]
    Panicked(String),
}

/// Failure inside a turn: either turn-scoped or fatal to the connection.
enum TurnFailure {
    Turn(TurnError),
    Fault(ConnectionFault),
}

impl From<TurnError> for TurnFailure {
    fn from(e: TurnError) -> Self {
        Self::Turn(e)
    }
}

impl From<ConnectionFault> for TurnFailure {
    fn from(e: ConnectionFault) -> Self {
        Self::Fault(e)
    }
}

pub struct ChatSession {
    id: ConnectionId,
    pipeline: Arc<TurnPipeline>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    history: ConversationState,
    state: SessionState,
    turns: u64,
}

impl ChatSession {
    pub fn new(
        id: ConnectionId,
        pipeline: Arc<TurnPipeline>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            pipeline,
            sink,
            cancel,
            history: ConversationState::new(),
            state: SessionState::Idle,
            turns: 0,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &ConversationState {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Mark the session closed after a client disconnect or shutdown.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            debug!(session_id = %self.id, from = %self.state, to = "closed", "state transition");
            self.state = SessionState::Closed;
        }
    }

    /// Process one inbound text frame to completion.
    ///
    /// Returns `Err` only for faults that must close the connection; a panic
    /// anywhere in the turn is caught and reported the same way.
    pub async fn handle_frame(&mut self, raw: &str) -> Result<(), ConnectionFault> {
        if self.is_closed() {
            return Ok(());
        }
        self.turns += 1;
        let span = info_span!("turn", session_id = %self.id, turn = self.turns);

        let outcome = std::panic::AssertUnwindSafe(self.run_turn(raw))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(session_id = %self.id, state = %self.state, panic = %msg, "turn panicked");
                self.state = SessionState::Closed;
                Err(ConnectionFault::Panicked(msg))
            }
        }
    }

    async fn run_turn(&mut self, raw: &str) -> Result<(), ConnectionFault> {
        let question = match InboundMessage::parse(raw) {
            Ok(inbound) => inbound.message,
            Err(detail) => {
                warn!(error = %detail, "malformed inbound message");
                self.report(&TurnError::Protocol(detail)).await;
                return Ok(());
            }
        };
        info!(question_len = question.len(), "turn started");

        self.transition(SessionState::Planning)?;
        match self.execute_turn(&question).await {
            Ok(()) => {
                info!(history_len = self.history.len(), "turn completed");
                self.transition(SessionState::Idle)
            }
            Err(TurnFailure::Fault(fault)) => {
                error!(error = %fault, "connection fault");
                self.state = SessionState::Closed;
                Err(fault)
            }
            Err(TurnFailure::Turn(TurnError::Cancelled)) => {
                info!(state = %self.state, "turn cancelled by disconnect");
                self.close();
                Ok(())
            }
            Err(TurnFailure::Turn(e)) => {
                warn!(state = %self.state, kind = e.error_kind(), error = %e, "turn failed");
                self.report(&e).await;
                self.transition(SessionState::Idle)
            }
        }
    }

    async fn execute_turn(&mut self, question: &str) -> Result<(), TurnFailure> {
        let pipeline = Arc::clone(&self.pipeline);
        let corpus = &pipeline.corpus;

        // Planning
        let prompt = pipeline.planner.prompt_for(question, &self.history);
        self.progress(format!("Prompt to Generate Semantic or Lexical retriever\n\n{prompt}"))
            .await?;
        let plan = self.cancellable(pipeline.planner.plan_with_prompt(&prompt)).await?;
        let query = serde_json::to_string_pretty(&plan.query_value()).unwrap_or_default();
        self.progress(format!("Generated Retriever of type {}\n\n{query}", plan.search_type))
            .await?;

        // Retrieval, with one fallback hop for non-partition failures
        self.transition(SessionState::Retrieving)?;
        let result = match self.cancellable(pipeline.executor.execute(plan)).await {
            Ok(result) => result,
            Err(TurnError::Retrieval(e)) => {
                self.transition(SessionState::Fallback)?;
                let wildcard = corpus.wildcard_index();
                warn!(error = %e, index = %wildcard, "falling back to broad search");
                self.progress(format!(
                    "Planned search failed ({}), searching {} instead",
                    e.error_kind(),
                    corpus.partitions.wildcard_label
                ))
                .await?;
                self.cancellable(pipeline.executor.execute_fallback(question, &wildcard))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        // Context
        self.transition(SessionState::AssemblingContext)?;
        let searched = result.index.clone();
        let search_type = result.search_type;
        let context = pipeline
            .assembler
            .assemble(result, corpus.context_type, search_type);
        debug!(passages = context.passages.len(), index = %searched, "context assembled");
        self.progress(format!(
            "Context gathered from {}\n\n{RULE}{RULE}{}",
            pipeline.executor.backend_name(),
            context.passages.join(&format!("{RULE}{RULE}\n"))
        ))
        .await?;

        // Answer
        let prompt = prompts::answer_prompt(corpus, &context.formatted, question, &self.history);
        self.transition(SessionState::Streaming)?;
        let answer = pipeline
            .streamer
            .stream(&prompt, self.sink.as_ref(), &self.cancel)
            .await?;
        self.progress(format!(
            "Response gathered from {}",
            corpus.partitions.label_of(&searched)
        ))
        .await?;

        // History; on failure `self.history` still holds the previous log
        self.transition(SessionState::UpdatingHistory)?;
        let next = self
            .cancellable(pipeline.history.append(&self.history, question, &answer))
            .await?;
        self.history = next;
        self.progress(format!(
            "Conversation history updated:\n\n{}",
            self.history.render(RULE)
        ))
        .await?;

        Ok(())
    }

    fn transition(&mut self, next: SessionState) -> Result<(), ConnectionFault> {
        if !self.state.can_transition_to(next) {
            return Err(ConnectionFault::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        Ok(())
    }

    /// Run a collaborator call, abandoning it if the client goes away.
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, TurnError>>,
    ) -> Result<T, TurnError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TurnError::Cancelled),
            res = fut => res,
        }
    }

    async fn progress(&self, text: String) -> Result<(), TurnError> {
        self.sink
            .emit(ClientEvent::verbose(text))
            .await
            .map_err(|_| TurnError::Cancelled)
    }

    async fn report(&self, err: &TurnError) {
        let text = err.user_message(&self.pipeline.corpus.topic);
        if self.sink.emit(ClientEvent::error(text)).await.is_err() {
            debug!("client gone before error could be delivered");
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
