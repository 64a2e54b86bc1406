//! WebSocket gateway handlers
//!
//! Replies shaped `{event, data}` are emitted to the client; failures go
//! out on the [`EXCEPTION_EVENT`] event.

use crate::config::ApplicationConfig;
use crate::context::ContextType;
use crate::error::PipelineError;
use crate::exceptions::error_payload;
use crate::handler::{Argument, Controller, HandlerRef};
use crate::injector::InstanceResolver;
use crate::message::{MessageContextCreator, MessageUnit};
use crate::metadata::{HandlerKey, MetadataReader};
use crate::ws::WsClient;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Event on which gateway failures are emitted.
pub const EXCEPTION_EVENT: &str = "exception";

/// Emits gateway failures to the client on the `exception` event
#[derive(Debug, Default, Clone, Copy)]
pub struct WsExceptionsHandler;

impl WsExceptionsHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: PipelineError, client: &dyn WsClient) {
        let payload = error_payload(&err);
        if let Err(emit_err) = client.emit(EXCEPTION_EVENT, payload) {
            tracing::warn!(client = client.id(), error = %emit_err, "Failed to emit exception");
        }
    }
}

/// Builds gateway message handlers
pub struct WsContextCreator {
    creator: MessageContextCreator,
    exceptions_handler: WsExceptionsHandler,
}

impl WsContextCreator {
    pub fn new(
        metadata: Arc<dyn MetadataReader>,
        container: Option<Arc<dyn InstanceResolver>>,
        config: &ApplicationConfig,
    ) -> Self {
        Self {
            creator: MessageContextCreator::new(metadata, container, config),
            exceptions_handler: WsExceptionsHandler::new(),
        }
    }

    pub fn create(&self, controller: &Controller, handler: &HandlerRef, module: &str) -> WsHandler {
        WsHandler {
            unit: Arc::new(self.creator.create(controller, handler, module, ContextType::Ws)),
            exceptions_handler: self.exceptions_handler,
        }
    }
}

/// Composed handler for one subscribed event
#[derive(Clone)]
pub struct WsHandler {
    unit: Arc<MessageUnit>,
    exceptions_handler: WsExceptionsHandler,
}

impl WsHandler {
    pub fn key(&self) -> &HandlerKey {
        self.unit.key()
    }

    /// Run the handler for one inbound message. Every `{event, data}`
    /// value it produces is emitted to `client`; the first failure is
    /// emitted on the exception event and ends the exchange.
    pub async fn handle(&self, client: Arc<dyn WsClient>, data: Value) {
        let result = match self
            .unit
            .call(vec![Argument::Client(client.clone())], data)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                self.exceptions_handler.handle(err, client.as_ref());
                return;
            }
        };

        let mut stream = result.into_stream();
        while let Some(item) = stream.next().await {
            match item {
                Ok(value) => emit_reply(client.as_ref(), value),
                Err(err) => {
                    self.exceptions_handler.handle(err, client.as_ref());
                    break;
                }
            }
        }
    }
}

impl fmt::Debug for WsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsHandler").field("handler", self.key()).finish()
    }
}

/// Values without an `event` name are acknowledgements and stay local.
fn emit_reply(client: &dyn WsClient, value: Value) {
    let Value::Object(mut reply) = value else {
        return;
    };
    let Some(Value::String(event)) = reply.remove("event") else {
        return;
    };
    let data = reply.remove("data").unwrap_or(Value::Null);
    if let Err(err) = client.emit(&event, data) {
        tracing::warn!(client = client.id(), event = %event, error = %err, "Failed to emit reply");
    }
}
