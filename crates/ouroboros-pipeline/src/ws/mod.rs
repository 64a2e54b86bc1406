//! WebSocket gateway side of the pipeline

mod context_creator;

pub use context_creator::{WsContextCreator, WsExceptionsHandler, WsHandler, EXCEPTION_EVENT};

use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A connected socket, as seen by gateway handlers
pub trait WsClient: Send + Sync {
    fn id(&self) -> &str;

    /// Send `data` to the client under `event`.
    fn emit(&self, event: &str, data: Value) -> PipelineResult<()>;
}

/// Outbound gateway message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsMessage {
    pub event: String,
    pub data: Value,
}

/// Client whose messages are queued on an unbounded channel; the
/// connection task drains the receiver into the socket.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    id: String,
    sender: UnboundedSender<WsMessage>,
}

impl ChannelClient {
    pub fn new(id: impl Into<String>) -> (Self, UnboundedReceiver<WsMessage>) {
        let (sender, receiver) = unbounded_channel();
        (Self { id: id.into(), sender }, receiver)
    }
}

impl WsClient for ChannelClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn emit(&self, event: &str, data: Value) -> PipelineResult<()> {
        self.sender
            .send(WsMessage {
                event: event.to_string(),
                data,
            })
            .map_err(|_| PipelineError::Internal("client disconnected".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_client_emit() {
        let (client, mut rx) = ChannelClient::new("c1");
        client.emit("pong", json!({"n": 1})).unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.event, "pong");
        assert_eq!(message.data, json!({"n": 1}));
        assert_eq!(client.id(), "c1");
    }

    #[test]
    fn test_emit_after_disconnect() {
        let (client, rx) = ChannelClient::new("c1");
        drop(rx);
        assert!(matches!(client.emit("pong", json!(null)), Err(PipelineError::Internal(_))));
    }
}
