//! Controllers, handler references, call arguments and handler results
//!
//! A handler is a method of a controller instance. The instance itself is
//! owned by the DI container; the pipeline only holds shared references.

use crate::error::{PipelineError, PipelineResult};
use crate::metadata::HandlerKey;
use crate::request::Request;
use crate::ws::WsClient;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{Future, Stream, StreamExt};
use serde_json::Value;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Type-erased controller or injectable instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// `next` callback handed to handlers that take over response delivery
pub type NextFn = Arc<dyn Fn() + Send + Sync>;

/// Boxed handler method
pub type HandlerFn =
    Arc<dyn Fn(Instance, Vec<Argument>) -> BoxFuture<'static, PipelineResult<HandlerResult>> + Send + Sync>;

// ============================================================================
// Arguments
// ============================================================================

/// One positional argument passed to a handler
#[derive(Clone)]
pub enum Argument {
    /// Extracted (and possibly piped) value
    Value(Value),
    /// Raw request passthrough
    Request(Arc<Request>),
    /// Raw response handle passthrough
    Response(Instance),
    /// `next` callback passthrough
    Next(NextFn),
    /// Socket client passthrough (gateway handlers)
    Client(Arc<dyn WsClient>),
}

impl Argument {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Argument::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Argument::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn request(&self) -> Option<&Arc<Request>> {
        match self {
            Argument::Request(req) => Some(req),
            _ => None,
        }
    }

    /// Typed access to the raw response handle.
    pub fn response<R: Any + Send + Sync>(&self) -> Option<Arc<R>> {
        match self {
            Argument::Response(res) => res.clone().downcast::<R>().ok(),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<&NextFn> {
        match self {
            Argument::Next(next) => Some(next),
            _ => None,
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn WsClient>> {
        match self {
            Argument::Client(client) => Some(client),
            _ => None,
        }
    }
}

impl Default for Argument {
    fn default() -> Self {
        Argument::Value(Value::Null)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Argument::Request(req) => f.debug_tuple("Request").field(&req.path).finish(),
            Argument::Response(_) => f.write_str("Response(..)"),
            Argument::Next(_) => f.write_str("Next(..)"),
            Argument::Client(_) => f.write_str("Client(..)"),
        }
    }
}

impl PartialEq<Value> for Argument {
    fn eq(&self, other: &Value) -> bool {
        self.value() == Some(other)
    }
}

// ============================================================================
// Handler results
// ============================================================================

/// What a handler returned
///
/// Deferred and streamed results are drained to a single value before the
/// response is delivered.
pub enum HandlerResult {
    Value(Value),
    Deferred(BoxFuture<'static, PipelineResult<Value>>),
    Stream(BoxStream<'static, PipelineResult<Value>>),
}

impl HandlerResult {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = PipelineResult<Value>> + Send + 'static,
    {
        HandlerResult::Deferred(Box::pin(future))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = PipelineResult<Value>> + Send + 'static,
    {
        HandlerResult::Stream(stream.boxed())
    }

    /// Resolve to a single value.
    ///
    /// A stream resolves to the last item it yields before completing, or
    /// `null` if it completes empty. The first error aborts resolution.
    pub async fn resolve(self) -> PipelineResult<Value> {
        match self {
            HandlerResult::Value(value) => Ok(value),
            HandlerResult::Deferred(future) => future.await,
            HandlerResult::Stream(mut stream) => {
                let mut last = Value::Null;
                while let Some(item) = stream.next().await {
                    last = item?;
                }
                Ok(last)
            }
        }
    }

    /// View the result as a stream of values.
    pub fn into_stream(self) -> BoxStream<'static, PipelineResult<Value>> {
        match self {
            HandlerResult::Value(value) => stream::once(async move { Ok(value) }).boxed(),
            HandlerResult::Deferred(future) => stream::once(future).boxed(),
            HandlerResult::Stream(stream) => stream,
        }
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        HandlerResult::Value(value)
    }
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResult::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HandlerResult::Deferred(_) => f.write_str("Deferred(..)"),
            HandlerResult::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ============================================================================
// Controllers and handlers
// ============================================================================

/// Shared reference to a controller instance
#[derive(Clone)]
pub struct Controller {
    name: Arc<str>,
    instance: Instance,
}

impl Controller {
    pub fn new<C: Any + Send + Sync>(name: impl Into<String>, instance: Arc<C>) -> Self {
        let name: String = name.into();
        Self {
            name: name.into(),
            instance,
        }
    }

    /// Name the controller after its type (last path segment, generic
    /// arguments stripped).
    pub fn of<C: Any + Send + Sync>(instance: Arc<C>) -> Self {
        let full = type_name::<C>();
        let base = full.split('<').next().unwrap_or(full);
        let short = base.rsplit("::").next().unwrap_or(base);
        Self::new(short, instance)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn downcast<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        self.instance.clone().downcast::<C>().ok()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").field("name", &self.name).finish()
    }
}

/// Reference to one controller method
#[derive(Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    call: HandlerFn,
}

impl HandlerRef {
    /// Wrap a method of controller type `C`.
    ///
    /// Invoking the handler with an instance of another type fails with a
    /// configuration error.
    pub fn new<C, F, Fut>(name: impl Into<String>, method: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Vec<Argument>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PipelineResult<HandlerResult>> + Send + 'static,
    {
        let name: String = name.into();
        let method_name = name.clone();
        let call: HandlerFn = Arc::new(
            move |instance: Instance, args: Vec<Argument>| -> BoxFuture<'static, PipelineResult<HandlerResult>> {
                match instance.downcast::<C>() {
                    Ok(this) => Box::pin(method(this, args)),
                    Err(_) => {
                        let message = format!(
                            "Handler '{}' expects a controller of type {}",
                            method_name,
                            type_name::<C>()
                        );
                        Box::pin(async move { Err(PipelineError::Configuration(message)) })
                    }
                }
            },
        );
        Self {
            name: name.into(),
            call,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self, controller: &Controller) -> HandlerKey {
        HandlerKey::new(controller.name(), self.name())
    }

    /// Call the method on `controller` with the prepared arguments.
    pub fn invoke(
        &self,
        controller: &Controller,
        args: Vec<Argument>,
    ) -> BoxFuture<'static, PipelineResult<HandlerResult>> {
        (self.call)(controller.instance().clone(), args)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CatsController {
        prefix: String,
    }

    mod store {
        pub struct Postgres;
    }

    struct Repository<B>(B);

    #[test]
    fn test_controller_name_strips_generic_arguments() {
        let controller = Controller::of(Arc::new(Repository(store::Postgres)));
        assert_eq!(controller.name(), "Repository");

        let controller = Controller::of(Arc::new(Repository::<Vec<store::Postgres>>(Vec::new())));
        assert_eq!(controller.name(), "Repository");
    }

    #[tokio::test]
    async fn test_handler_invokes_method_on_instance() {
        let controller = Controller::of(Arc::new(CatsController { prefix: "cat:".into() }));
        assert_eq!(controller.name(), "CatsController");

        let handler = HandlerRef::new("find", |this: Arc<CatsController>, args: Vec<Argument>| async move {
            let id = args[0].value().and_then(|v| v.as_str()).unwrap_or_default().to_string();
            Ok(json!(format!("{}{}", this.prefix, id)).into())
        });

        let result = handler.invoke(&controller, vec![json!("7").into()]).await.unwrap();
        assert_eq!(result.resolve().await.unwrap(), json!("cat:7"));
    }

    #[tokio::test]
    async fn test_handler_rejects_foreign_instance() {
        let controller = Controller::new("Other", Arc::new(42u32));
        let handler = HandlerRef::new("find", |_: Arc<CatsController>, _| async { Ok(Value::Null.into()) });

        let err = handler.invoke(&controller, vec![]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resolve_deferred_and_stream() {
        let deferred = HandlerResult::deferred(async { Ok(json!(1)) });
        assert_eq!(deferred.resolve().await.unwrap(), json!(1));

        let streamed = HandlerResult::stream(stream::iter(vec![Ok(json!(1)), Ok(json!(2))]));
        assert_eq!(streamed.resolve().await.unwrap(), json!(2));

        let empty = HandlerResult::stream(stream::iter(Vec::<PipelineResult<Value>>::new()));
        assert_eq!(empty.resolve().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_resolve_stream_error_aborts() {
        let streamed = HandlerResult::stream(stream::iter(vec![
            Ok(json!(1)),
            Err(PipelineError::Handler("boom".into())),
            Ok(json!(3)),
        ]));
        assert!(matches!(streamed.resolve().await, Err(PipelineError::Handler(_))));
    }

    #[test]
    fn test_argument_accessors() {
        let arg = Argument::Response(Arc::new(String::from("res")));
        assert_eq!(arg.response::<String>().as_deref().map(String::as_str), Some("res"));
        assert!(arg.response::<u8>().is_none());
        assert!(arg.value().is_none());
        assert_eq!(Argument::default(), Value::Null);
    }
}
