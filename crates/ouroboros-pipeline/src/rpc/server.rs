//! Pattern registry and reply framing for RPC servers

use crate::error::PipelineResult;
use crate::rpc::RpcHandler;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sent back when no handler matches the inbound pattern.
pub const NO_PATTERN_MESSAGE: &str = "There is no equivalent message pattern defined in the remote service.";

/// One frame of an RPC reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MicroserviceResponse {
    /// Terminates a reply
    Disposed { disposed: bool },
    Reply {
        err: Option<Value>,
        response: Option<Value>,
    },
}

impl MicroserviceResponse {
    pub fn response(value: Value) -> Self {
        MicroserviceResponse::Reply {
            err: None,
            response: Some(value),
        }
    }

    pub fn error(err: Value) -> Self {
        MicroserviceResponse::Reply {
            err: Some(err),
            response: None,
        }
    }

    pub fn disposed() -> Self {
        MicroserviceResponse::Disposed { disposed: true }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, MicroserviceResponse::Disposed { disposed: true })
    }
}

/// Handlers keyed by the canonical JSON of their pattern
#[derive(Debug, Default)]
pub struct MessageHandlers {
    handlers: DashMap<String, RpcHandler>,
}

impl MessageHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key of a pattern; object keys are serialized sorted.
    pub fn pattern_key(pattern: &Value) -> String {
        pattern.to_string()
    }

    pub fn add(&self, pattern: &Value, handler: RpcHandler) {
        let key = Self::pattern_key(pattern);
        tracing::debug!(pattern = %key, handler = %handler.key(), "Registered message handler");
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, pattern: &Value) -> Option<RpcHandler> {
        self.handlers
            .get(&Self::pattern_key(pattern))
            .map(|entry| entry.value().clone())
    }

    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        patterns.sort();
        patterns
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch one inbound message and frame its reply through `respond`.
    pub async fn handle_message<F>(&self, pattern: &Value, data: Value, mut respond: F)
    where
        F: FnMut(MicroserviceResponse),
    {
        match self.get(pattern) {
            Some(handler) => {
                let stream = handler.handle(data).await;
                send(stream, respond).await;
            }
            None => {
                tracing::warn!(pattern = %pattern, "No handler for message pattern");
                respond(MicroserviceResponse::error(json!(NO_PATTERN_MESSAGE)));
            }
        }
    }
}

/// Frame a result stream: one `{err: null, response}` per item, a single
/// `{err, response: null}` on failure, then `{disposed: true}`.
pub async fn send<F>(mut stream: BoxStream<'_, PipelineResult<Value>>, mut respond: F)
where
    F: FnMut(MicroserviceResponse),
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(value) => respond(MicroserviceResponse::response(value)),
            Err(err) => {
                respond(MicroserviceResponse::error(err.to_json()));
                break;
            }
        }
    }
    respond(MicroserviceResponse::disposed());
}
