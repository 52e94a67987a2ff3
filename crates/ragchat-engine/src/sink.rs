use async_trait::async_trait;
use tokio::sync::mpsc;

use ragchat_core::events::ClientEvent;

/// The client went away; nothing more can be delivered.
#[derive(Debug, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Destination for outbound events of one connection.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ClientEvent) -> Result<(), SinkClosed>;
}

/// Any channel whose item type can carry a client event.
#[async_trait]
impl<T> EventSink for mpsc::Sender<T>
where
    T: From<ClientEvent> + Send + 'static,
{
    async fn emit(&self, event: ClientEvent) -> Result<(), SinkClosed> {
        self.send(T::from(event)).await.map_err(|_| SinkClosed)
    }
}
