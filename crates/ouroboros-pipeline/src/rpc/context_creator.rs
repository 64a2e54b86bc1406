//! RPC message handlers

use crate::config::ApplicationConfig;
use crate::context::ContextType;
use crate::error::PipelineResult;
use crate::handler::{Controller, HandlerRef};
use crate::injector::InstanceResolver;
use crate::message::{MessageContextCreator, MessageUnit};
use crate::metadata::{HandlerKey, MetadataReader};
use crate::rpc::exceptions::{RpcExceptionsHandler, RpcProxy};
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds RPC handlers: guards, then payload pipes, then interceptors
/// around the handler, with every failure normalised by the proxy.
pub struct RpcContextCreator {
    creator: MessageContextCreator,
    rpc_proxy: RpcProxy,
}

impl RpcContextCreator {
    pub fn new(
        metadata: Arc<dyn MetadataReader>,
        container: Option<Arc<dyn InstanceResolver>>,
        config: &ApplicationConfig,
    ) -> Self {
        Self {
            creator: MessageContextCreator::new(metadata, container, config),
            rpc_proxy: RpcProxy::new(RpcExceptionsHandler::new()),
        }
    }

    pub fn create(&self, controller: &Controller, handler: &HandlerRef, module: &str) -> RpcHandler {
        RpcHandler {
            unit: Arc::new(self.creator.create(controller, handler, module, ContextType::Rpc)),
            proxy: self.rpc_proxy,
        }
    }
}

/// Composed handler for one message pattern
#[derive(Clone)]
pub struct RpcHandler {
    unit: Arc<MessageUnit>,
    proxy: RpcProxy,
}

impl RpcHandler {
    pub fn key(&self) -> &HandlerKey {
        self.unit.key()
    }

    /// Handle one inbound payload. Failures arrive as an `Err` item
    /// carrying a normalised RPC payload.
    pub async fn handle(&self, data: Value) -> BoxStream<'static, PipelineResult<Value>> {
        self.proxy.call(self.unit.call(Vec::new(), data)).await
    }
}

impl fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcHandler").field("handler", self.key()).finish()
    }
}
