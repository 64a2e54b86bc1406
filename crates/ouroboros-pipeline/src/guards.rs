//! Guards: authorization gates evaluated before any pipe or handler code

use crate::context::ExecutionContext;
use crate::enhancers::{ContextCreator, GuardKind};
use crate::error::{PipelineError, PipelineResult, FORBIDDEN_MESSAGE};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides whether a call may proceed
#[async_trait]
pub trait CanActivate: Send + Sync {
    async fn can_activate(&self, context: &ExecutionContext) -> PipelineResult<bool>;
}

/// Resolves the guard chain of a handler
pub type GuardsContextCreator = ContextCreator<GuardKind>;

/// Evaluates a guard chain
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardsConsumer;

impl GuardsConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Conjunction of every guard in the chain.
    ///
    /// Guards run in chain order and evaluation stops at the first denial.
    /// An error raised by a guard propagates unchanged.
    pub async fn try_activate(
        &self,
        guards: &[Arc<dyn CanActivate>],
        context: &ExecutionContext,
    ) -> PipelineResult<bool> {
        for guard in guards {
            if !guard.can_activate(context).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Guard check of one execution unit; only built for a non-empty chain
#[derive(Clone)]
pub struct GuardsFn {
    guards: Vec<Arc<dyn CanActivate>>,
    consumer: GuardsConsumer,
}

impl GuardsFn {
    /// `None` when there is nothing to evaluate.
    pub fn new(guards: Vec<Arc<dyn CanActivate>>, consumer: GuardsConsumer) -> Option<Self> {
        if guards.is_empty() {
            None
        } else {
            Some(Self { guards, consumer })
        }
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Fail with [`PipelineError::Forbidden`] unless every guard allows the call.
    pub async fn check(&self, context: &ExecutionContext) -> PipelineResult<()> {
        if self.consumer.try_activate(&self.guards, context).await? {
            Ok(())
        } else {
            tracing::debug!(
                controller = context.get_class(),
                method = context.get_handler(),
                "Guard denied access"
            );
            Err(PipelineError::Forbidden(FORBIDDEN_MESSAGE.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextType;
    use crate::metadata::{HandlerKey, MetadataStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticGuard {
        allow: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CanActivate for StaticGuard {
        async fn can_activate(&self, _context: &ExecutionContext) -> PipelineResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.allow)
        }
    }

    struct FailingGuard;

    #[async_trait]
    impl CanActivate for FailingGuard {
        async fn can_activate(&self, _context: &ExecutionContext) -> PipelineResult<bool> {
            Err(PipelineError::http(401u16, "Missing token"))
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

    fn guard(allow: bool, calls: &Arc<AtomicUsize>) -> Arc<dyn CanActivate> {
        Arc::new(StaticGuard {
            allow,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn test_denial_stops_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let guards = vec![guard(true, &calls), guard(false, &calls), guard(true, &calls)];
        let allowed = GuardsConsumer.try_activate(&guards, &context()).await.unwrap();
        assert!(!allowed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forbidden_on_denial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let guards = GuardsFn::new(vec![guard(false, &calls)], GuardsConsumer).unwrap();
        let err = guards.check(&context()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Forbidden(ref m) if m == FORBIDDEN_MESSAGE));
    }

    #[tokio::test]
    async fn test_guard_error_is_not_converted() {
        let guards = GuardsFn::new(vec![Arc::new(FailingGuard) as Arc<dyn CanActivate>], GuardsConsumer).unwrap();
        let err = guards.check(&context()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_empty_chain_builds_no_check() {
        assert!(GuardsFn::new(vec![], GuardsConsumer).is_none());
    }
}
