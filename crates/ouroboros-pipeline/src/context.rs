//! Execution context handed to guards and interceptors
//!
//! The context exposes the raw transport arguments positionally
//! (`[request, response, next]` for HTTP, `[data]` for RPC,
//! `[client, data]` for gateways) together with the identity of the
//! controller and handler being invoked.

use crate::handler::{Argument, NextFn};
use crate::metadata::{HandlerKey, MetadataKind, MetadataReader, MetadataTarget, Metadata};
use crate::request::Request;
use crate::ws::WsClient;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Transport an execution context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    Http,
    Rpc,
    Ws,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Http => "http",
            ContextType::Rpc => "rpc",
            ContextType::Ws => "ws",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation context
#[derive(Clone)]
pub struct ExecutionContext {
    context_type: ContextType,
    args: Arc<[Argument]>,
    handler: HandlerKey,
    metadata: Arc<dyn MetadataReader>,
}

impl ExecutionContext {
    pub fn new(
        context_type: ContextType,
        args: Vec<Argument>,
        handler: HandlerKey,
        metadata: Arc<dyn MetadataReader>,
    ) -> Self {
        Self {
            context_type,
            args: args.into(),
            handler,
            metadata,
        }
    }

    pub fn get_type(&self) -> ContextType {
        self.context_type
    }

    pub fn get_args(&self) -> &[Argument] {
        &self.args
    }

    pub fn get_arg_by_index(&self, index: usize) -> Option<&Argument> {
        self.args.get(index)
    }

    /// Name of the controller owning the handler
    pub fn get_class(&self) -> &str {
        &self.handler.controller
    }

    /// Name of the handler method
    pub fn get_handler(&self) -> &str {
        &self.handler.method
    }

    pub fn handler_key(&self) -> &HandlerKey {
        &self.handler
    }

    /// Custom metadata declared for the handler, falling back to the
    /// controller-level declaration.
    pub fn metadata(&self, key: &str) -> Option<Value> {
        let kind = MetadataKind::Custom(key.to_string());
        let handler_target = MetadataTarget::Handler(self.handler.clone());
        let controller_target = MetadataTarget::Controller(self.handler.controller.clone());
        self.metadata
            .read(&kind, &handler_target)
            .or_else(|| self.metadata.read(&kind, &controller_target))
            .and_then(|metadata| match metadata {
                Metadata::Custom(value) => Some(value),
                _ => None,
            })
    }

    pub fn switch_to_http(&self) -> HttpArgumentsHost<'_> {
        HttpArgumentsHost { args: &self.args }
    }

    pub fn switch_to_rpc(&self) -> RpcArgumentsHost<'_> {
        RpcArgumentsHost { args: &self.args }
    }

    pub fn switch_to_ws(&self) -> WsArgumentsHost<'_> {
        WsArgumentsHost { args: &self.args }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("type", &self.context_type)
            .field("handler", &self.handler)
            .field("args", &self.args.len())
            .finish()
    }
}

/// HTTP view over the context arguments
pub struct HttpArgumentsHost<'a> {
    args: &'a [Argument],
}

impl<'a> HttpArgumentsHost<'a> {
    pub fn request(&self) -> Option<&'a Request> {
        self.args.first().and_then(Argument::request).map(|r| r.as_ref())
    }

    pub fn response<R: Any + Send + Sync>(&self) -> Option<Arc<R>> {
        self.args.get(1).and_then(|arg| arg.response::<R>())
    }

    pub fn next(&self) -> Option<&'a NextFn> {
        self.args.get(2).and_then(Argument::next)
    }
}

/// RPC view over the context arguments
pub struct RpcArgumentsHost<'a> {
    args: &'a [Argument],
}

impl<'a> RpcArgumentsHost<'a> {
    pub fn data(&self) -> Option<&'a Value> {
        self.args.first().and_then(Argument::value)
    }
}

/// Gateway view over the context arguments
pub struct WsArgumentsHost<'a> {
    args: &'a [Argument],
}

impl<'a> WsArgumentsHost<'a> {
    pub fn client(&self) -> Option<&'a Arc<dyn WsClient>> {
        self.args.first().and_then(Argument::client)
    }

    pub fn data(&self) -> Option<&'a Value> {
        self.args.get(1).and_then(Argument::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataStore;
    use ouroboros_common::RequestMethod;
    use serde_json::json;

    fn http_context(store: Arc<MetadataStore>) -> ExecutionContext {
        let request = Arc::new(Request::new(RequestMethod::Get, "/cats").with_header("x-role", "admin"));
        let next: NextFn = Arc::new(|| {});
        ExecutionContext::new(
            ContextType::Http,
            vec![
                Argument::Request(request),
                Argument::Response(Arc::new(String::from("raw-response"))),
                Argument::Next(next),
            ],
            HandlerKey::new("CatsController", "findAll"),
            store,
        )
    }

    #[test]
    fn test_switch_to_http() {
        let ctx = http_context(Arc::new(MetadataStore::new()));
        let http = ctx.switch_to_http();
        assert_eq!(http.request().unwrap().header("x-role"), Some("admin"));
        assert_eq!(http.response::<String>().unwrap().as_str(), "raw-response");
        assert!(http.next().is_some());
        assert_eq!(ctx.get_class(), "CatsController");
        assert_eq!(ctx.get_handler(), "findAll");
        assert_eq!(ctx.get_type(), ContextType::Http);
    }

    #[test]
    fn test_switch_to_rpc() {
        let ctx = ExecutionContext::new(
            ContextType::Rpc,
            vec![json!({"a": 1}).into()],
            HandlerKey::new("MathController", "sum"),
            Arc::new(MetadataStore::new()),
        );
        assert_eq!(ctx.switch_to_rpc().data(), Some(&json!({"a": 1})));
        assert!(ctx.switch_to_http().request().is_none());
    }

    #[test]
    fn test_metadata_handler_overrides_controller() {
        let store = Arc::new(MetadataStore::new());
        store.controller("CatsController").set_metadata("roles", json!(["user"]));
        let ctx = http_context(store.clone());
        assert_eq!(ctx.metadata("roles"), Some(json!(["user"])));

        store
            .handler("CatsController", "findAll")
            .set_metadata("roles", json!(["admin"]));
        assert_eq!(ctx.metadata("roles"), Some(json!(["admin"])));
        assert_eq!(ctx.metadata("missing"), None);
    }
}
