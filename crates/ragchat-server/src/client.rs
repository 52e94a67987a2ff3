use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use ragchat_core::events::ClientEvent;
use ragchat_core::ids::ConnectionId;
use ragchat_engine::TurnPipeline;

use crate::session::ChatSession;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

const INBOUND_QUEUE: usize = 32;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Item queued for the writer task of one connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Event(ClientEvent),
    Close { code: u16, reason: String },
}

impl From<ClientEvent> for Outbound {
    fn from(event: ClientEvent) -> Self {
        Self::Event(event)
    }
}

/// Per-connection settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

struct Connection {
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    connected_at: Instant,
}

/// Live connections, each with its outbound queue and cancellation token.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return its id, outbound queue and token.
    pub fn register(
        &self,
    ) -> (
        ConnectionId,
        mpsc::Sender<Outbound>,
        mpsc::Receiver<Outbound>,
        CancellationToken,
    ) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let cancel = CancellationToken::new();
        self.connections.insert(
            id.clone(),
            Connection {
                tx: tx.clone(),
                cancel: cancel.clone(),
                connected_at: Instant::now(),
            },
        );
        (id, tx, rx, cancel)
    }

    pub fn unregister(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            debug!(
                connection_id = %id,
                connected_secs = conn.connected_at.elapsed().as_secs(),
                "connection unregistered"
            );
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Ask every connection to close with `code`, then cancel its in-flight
    /// turn. Returns how many connections were signalled.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn
                .tx
                .try_send(Outbound::Close {
                    code,
                    reason: reason.to_string(),
                })
                .is_err()
            {
                warn!(
                    connection_id = %entry.key(),
                    "send queue unavailable, close frame not queued"
                );
            }
            conn.cancel.cancel();
            closed += 1;
        }
        closed
    }
}

/// Drive one WebSocket connection: a writer task (outbound queue and
/// heartbeat), a reader task (inbound frames) and the session loop, which
/// processes one frame at a time.
pub async fn handle_ws_connection(
    socket: WebSocket,
    pipeline: Arc<TurnPipeline>,
    registry: Arc<ConnectionRegistry>,
    config: ConnectionConfig,
) {
    let (id, out_tx, mut out_rx, cancel) = registry.register();
    info!(connection_id = %id, "client connected");
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: forward queued events, ping periodically, finish on Close.
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
        ping_interval.tick().await;

        let close = loop {
            tokio::select! {
                item = out_rx.recv() => match item {
                    Some(Outbound::Event(event)) => {
                        let text = match serde_json::to_string(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                error!(
                                    connection_id = %writer_id,
                                    error = %e,
                                    "failed to encode event"
                                );
                                continue;
                            }
                        };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => break (code, reason),
                    None => break (CLOSE_NORMAL, String::new()),
                },
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                    trace!(connection_id = %writer_id, "sent ping");
                }
            }
        };

        let (code, reason) = close;
        debug!(connection_id = %writer_id, code, "closing socket");
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
        let _ = ws_tx.close().await;
    });

    // Reader: forward text (and lossily decoded binary) frames. A closed or
    // broken socket cancels whatever turn is in flight.
    let (in_tx, mut in_rx) = mpsc::channel::<String>(INBOUND_QUEUE);
    let reader_id = id.clone();
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                WsMessage::Text(text) => text.as_str().to_owned(),
                WsMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            };
            if in_tx.send(text).await.is_err() {
                break;
            }
        }
        debug!(connection_id = %reader_id, "reader finished");
        reader_cancel.cancel();
    });

    let sink = Arc::new(out_tx.clone());
    let mut session = ChatSession::new(id.clone(), pipeline, sink, cancel.clone());
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = in_rx.recv() => frame,
        };
        let Some(frame) = frame else {
            session.close();
            break;
        };

        match session.handle_frame(&frame).await {
            Ok(()) if session.is_closed() => break,
            Ok(()) => {}
            Err(fault) => {
                error!(connection_id = %id, error = %fault, "closing connection after fault");
                let _ = out_tx
                    .send(Outbound::Close {
                        code: CLOSE_INTERNAL_ERROR,
                        reason: "internal error".into(),
                    })
                    .await;
                break;
            }
        }
    }

    registry.unregister(&id);
    drop(session);
    drop(out_tx);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!(connection_id = %id, "writer did not finish in time");
    }
    reader.abort();
    info!(connection_id = %id, "client disconnected");
}
