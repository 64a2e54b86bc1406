//! Interceptors: wrappers around the handler call
//!
//! The first interceptor of a chain is the outermost one: its pre-phase
//! runs first and its post-phase runs last. An interceptor that never
//! calls `next.handle()` short-circuits the handler entirely.

use crate::context::ExecutionContext;
use crate::enhancers::{ContextCreator, InterceptorKind};
use crate::error::PipelineResult;
use crate::handler::HandlerResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

/// Outcome of an intercepted call
#[derive(Debug)]
pub struct Interception {
    pub result: HandlerResult,
    /// An interceptor already rendered the view; `result` is the HTML string.
    pub skip_render: bool,
}

impl Interception {
    pub fn new(result: HandlerResult) -> Self {
        Self {
            result,
            skip_render: false,
        }
    }

    /// Result produced by an interceptor that rendered the view itself.
    pub fn rendered(view: impl Into<String>) -> Self {
        Self {
            result: HandlerResult::Value(serde_json::Value::String(view.into())),
            skip_render: true,
        }
    }
}

impl From<HandlerResult> for Interception {
    fn from(result: HandlerResult) -> Self {
        Interception::new(result)
    }
}

/// The rest of the chain, handed to an interceptor
pub struct CallHandler<'a> {
    next: BoxFuture<'a, PipelineResult<Interception>>,
}

impl<'a> CallHandler<'a> {
    pub fn new(next: BoxFuture<'a, PipelineResult<Interception>>) -> Self {
        Self { next }
    }

    /// Run the inner interceptors and the handler.
    pub async fn handle(self) -> PipelineResult<Interception> {
        self.next.await
    }
}

impl fmt::Debug for CallHandler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallHandler(..)")
    }
}

/// Wraps a handler invocation
///
/// Implementors either override [`Interceptor::intercept`] for full control
/// or only the `before`/`after` hooks.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, context: &ExecutionContext, next: CallHandler<'_>) -> PipelineResult<Interception> {
        self.before(context).await?;
        let interception = next.handle().await?;
        let result = self.after(context, interception.result).await?;
        Ok(Interception {
            result,
            skip_render: interception.skip_render,
        })
    }

    async fn before(&self, _context: &ExecutionContext) -> PipelineResult<()> {
        Ok(())
    }

    async fn after(&self, _context: &ExecutionContext, result: HandlerResult) -> PipelineResult<HandlerResult> {
        Ok(result)
    }

    /// Whether this interceptor post-processes rendered views.
    fn intercepts_render(&self) -> bool {
        false
    }

    async fn render_intercept(&self, view: String) -> PipelineResult<String> {
        Ok(view)
    }
}

/// Resolves the interceptor chain of a handler
pub type InterceptorsContextCreator = ContextCreator<InterceptorKind>;

/// Runs interceptor chains
#[derive(Debug, Default, Clone, Copy)]
pub struct InterceptorsConsumer;

impl InterceptorsConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Run `handler` wrapped by `interceptors`.
    ///
    /// `handler` is lazy: it only runs if every interceptor calls through.
    pub async fn intercept<'a>(
        &self,
        interceptors: &'a [Arc<dyn Interceptor>],
        context: &'a ExecutionContext,
        handler: BoxFuture<'a, PipelineResult<HandlerResult>>,
    ) -> PipelineResult<Interception> {
        if interceptors.is_empty() {
            return Ok(Interception::new(handler.await?));
        }
        chain(interceptors, context, handler).await
    }

    pub fn can_render_intercept(&self, interceptors: &[Arc<dyn Interceptor>]) -> bool {
        interceptors.iter().any(|i| i.intercepts_render())
    }

    /// Post-process a rendered view, innermost interceptor first.
    pub async fn render_intercept(
        &self,
        interceptors: &[Arc<dyn Interceptor>],
        view: String,
    ) -> PipelineResult<String> {
        let mut view = view;
        for interceptor in interceptors.iter().rev().filter(|i| i.intercepts_render()) {
            view = interceptor.render_intercept(view).await?;
        }
        Ok(view)
    }
}

fn chain<'a>(
    interceptors: &'a [Arc<dyn Interceptor>],
    context: &'a ExecutionContext,
    handler: BoxFuture<'a, PipelineResult<HandlerResult>>,
) -> BoxFuture<'a, PipelineResult<Interception>> {
    match interceptors.split_first() {
        None => async move { handler.await.map(Interception::new) }.boxed(),
        Some((outer, inner)) => {
            let next = CallHandler::new(chain(inner, context, handler));
            async move { outer.intercept(context, next).await }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextType;
    use crate::metadata::{HandlerKey, MetadataStore};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Recording {
        async fn before(&self, _context: &ExecutionContext) -> PipelineResult<()> {
            self.log.lock().push(format!("{}:before", self.name));
            Ok(())
        }

        async fn after(&self, _context: &ExecutionContext, result: HandlerResult) -> PipelineResult<HandlerResult> {
            self.log.lock().push(format!("{}:after", self.name));
            Ok(result)
        }
    }

    struct Cached;

    #[async_trait]
    impl Interceptor for Cached {
        async fn intercept(&self, _context: &ExecutionContext, _next: CallHandler<'_>) -> PipelineResult<Interception> {
            Ok(Interception::new(json!("cached").into()))
        }
    }

    struct Wrap(&'static str);

    #[async_trait]
    impl Interceptor for Wrap {
        fn intercepts_render(&self) -> bool {
            true
        }

        async fn render_intercept(&self, view: String) -> PipelineResult<String> {
            Ok(format!("<{0}>{1}</{0}>", self.0, view))
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            ContextType::Http,
            vec![],
            HandlerKey::new("CatsController", "find"),
            Arc::new(MetadataStore::new()),
        )
    }

    #[tokio::test]
    async fn test_nested_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Recording { name: "outer", log: log.clone() }),
            Arc::new(Recording { name: "inner", log: log.clone() }),
        ];
        let ctx = context();
        let handler_log = log.clone();
        let handler: BoxFuture<'_, PipelineResult<HandlerResult>> = async move {
            handler_log.lock().push("handler".to_string());
            Ok(HandlerResult::Value(json!(1)))
        }
        .boxed();

        let interception = InterceptorsConsumer.intercept(&interceptors, &ctx, handler).await.unwrap();
        assert_eq!(interception.result.resolve().await.unwrap(), json!(1));
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let handler: BoxFuture<'_, PipelineResult<HandlerResult>> = async move {
            *flag.lock() = true;
            Ok(HandlerResult::Value(Value::Null))
        }
        .boxed();
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Cached)];
        let ctx = context();

        let interception = InterceptorsConsumer.intercept(&interceptors, &ctx, handler).await.unwrap();
        assert_eq!(interception.result.resolve().await.unwrap(), json!("cached"));
        assert!(!*called.lock());
    }

    #[tokio::test]
    async fn test_render_intercept_innermost_first() {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Wrap("outer")), Arc::new(Wrap("inner"))];
        assert!(InterceptorsConsumer.can_render_intercept(&interceptors));
        let view = InterceptorsConsumer
            .render_intercept(&interceptors, "x".to_string())
            .await
            .unwrap();
        assert_eq!(view, "<outer><inner>x</inner></outer>");
        assert!(!InterceptorsConsumer.can_render_intercept(&[]));
    }
}
