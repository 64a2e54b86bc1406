//! Enhancer chain resolution
//!
//! Guards, pipes and interceptors are resolved the same way: the global
//! chain first, then the controller-level declarations, then the
//! handler-level ones. Declarations are either a DI token, resolved in
//! the module context through [`InstanceResolver`], or a live instance.
//! Nothing is deduplicated.

use crate::guards::CanActivate;
use crate::handler::{Controller, HandlerRef};
use crate::injector::{ContextId, Injectable, InstanceResolver};
use crate::interceptors::Interceptor;
use crate::metadata::{MetadataKind, MetadataReader, MetadataReaderExt, MetadataTarget};
use crate::pipes::PipeTransform;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A declared guard, pipe or interceptor
#[derive(Clone)]
pub enum EnhancerRef {
    /// DI token, resolved per module and context
    Token(String),
    /// Live instance
    Instance(Injectable),
}

impl EnhancerRef {
    pub fn guard<G: CanActivate + 'static>(guard: G) -> Self {
        EnhancerRef::Instance(Injectable::Guard(Arc::new(guard)))
    }

    pub fn pipe<P: PipeTransform + 'static>(pipe: P) -> Self {
        EnhancerRef::Instance(Injectable::Pipe(Arc::new(pipe)))
    }

    pub fn interceptor<I: Interceptor + 'static>(interceptor: I) -> Self {
        EnhancerRef::Instance(Injectable::Interceptor(Arc::new(interceptor)))
    }
}

impl From<&str> for EnhancerRef {
    fn from(token: &str) -> Self {
        EnhancerRef::Token(token.to_string())
    }
}

impl From<String> for EnhancerRef {
    fn from(token: String) -> Self {
        EnhancerRef::Token(token)
    }
}

impl From<Injectable> for EnhancerRef {
    fn from(instance: Injectable) -> Self {
        EnhancerRef::Instance(instance)
    }
}

impl From<Arc<dyn CanActivate>> for EnhancerRef {
    fn from(guard: Arc<dyn CanActivate>) -> Self {
        EnhancerRef::Instance(Injectable::Guard(guard))
    }
}

impl From<Arc<dyn PipeTransform>> for EnhancerRef {
    fn from(pipe: Arc<dyn PipeTransform>) -> Self {
        EnhancerRef::Instance(Injectable::Pipe(pipe))
    }
}

impl From<Arc<dyn Interceptor>> for EnhancerRef {
    fn from(interceptor: Arc<dyn Interceptor>) -> Self {
        EnhancerRef::Instance(Injectable::Interceptor(interceptor))
    }
}

impl fmt::Debug for EnhancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnhancerRef::Token(token) => f.debug_tuple("Token").field(token).finish(),
            EnhancerRef::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
        }
    }
}

/// Module and DI context an enhancer chain is resolved in
#[derive(Debug, Clone, Copy)]
pub struct ResolutionScope<'a> {
    pub module: &'a str,
    pub context_id: ContextId,
    pub inquirer_id: Option<&'a str>,
}

impl<'a> ResolutionScope<'a> {
    pub fn new(module: &'a str, context_id: ContextId, inquirer_id: Option<&'a str>) -> Self {
        Self {
            module,
            context_id,
            inquirer_id,
        }
    }
}

/// One family of enhancers
pub trait EnhancerKind {
    type Target: ?Sized + Send + Sync;

    /// Metadata key the family is declared under
    fn metadata_kind() -> MetadataKind;

    fn select(injectable: &Injectable) -> Option<Arc<Self::Target>>;
}

pub struct GuardKind;

impl EnhancerKind for GuardKind {
    type Target = dyn CanActivate;

    fn metadata_kind() -> MetadataKind {
        MetadataKind::Guards
    }

    fn select(injectable: &Injectable) -> Option<Arc<dyn CanActivate>> {
        injectable.as_guard()
    }
}

pub struct PipeKind;

impl EnhancerKind for PipeKind {
    type Target = dyn PipeTransform;

    fn metadata_kind() -> MetadataKind {
        MetadataKind::Pipes
    }

    fn select(injectable: &Injectable) -> Option<Arc<dyn PipeTransform>> {
        injectable.as_pipe()
    }
}

pub struct InterceptorKind;

impl EnhancerKind for InterceptorKind {
    type Target = dyn Interceptor;

    fn metadata_kind() -> MetadataKind {
        MetadataKind::Interceptors
    }

    fn select(injectable: &Injectable) -> Option<Arc<dyn Interceptor>> {
        injectable.as_interceptor()
    }
}

/// Resolves the enhancer chain of kind `K` for a handler
pub struct ContextCreator<K: EnhancerKind> {
    metadata: Arc<dyn MetadataReader>,
    container: Option<Arc<dyn InstanceResolver>>,
    global: Vec<Arc<K::Target>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EnhancerKind> ContextCreator<K> {
    pub fn new(metadata: Arc<dyn MetadataReader>, container: Option<Arc<dyn InstanceResolver>>) -> Self {
        Self {
            metadata,
            container,
            global: Vec::new(),
            _kind: PhantomData,
        }
    }

    pub fn with_global(mut self, global: Vec<Arc<K::Target>>) -> Self {
        self.global = global;
        self
    }

    pub fn global(&self) -> &[Arc<K::Target>] {
        &self.global
    }

    /// Global, then controller-level, then handler-level enhancers.
    pub fn create(
        &self,
        controller: &Controller,
        handler: &HandlerRef,
        scope: ResolutionScope<'_>,
    ) -> Vec<Arc<K::Target>> {
        let kind = K::metadata_kind();
        let controller_refs = self
            .metadata
            .enhancers(&kind, &MetadataTarget::Controller(controller.name().to_string()));
        let handler_refs = self
            .metadata
            .enhancers(&kind, &MetadataTarget::Handler(handler.key(controller)));

        let mut chain = self.global.clone();
        chain.extend(self.create_concrete_context(&controller_refs, scope));
        chain.extend(self.create_concrete_context(&handler_refs, scope));

        tracing::debug!(
            kind = ?kind,
            controller = controller.name(),
            method = handler.name(),
            count = chain.len(),
            "Resolved enhancer chain"
        );
        chain
    }

    /// Turn declarations into live instances, skipping the unresolvable ones.
    pub fn create_concrete_context(
        &self,
        refs: &[EnhancerRef],
        scope: ResolutionScope<'_>,
    ) -> Vec<Arc<K::Target>> {
        refs.iter()
            .filter_map(|enhancer| {
                let resolved = match enhancer {
                    EnhancerRef::Instance(instance) => K::select(instance),
                    EnhancerRef::Token(token) => self
                        .container
                        .as_ref()
                        .and_then(|c| c.get(token, scope.module, scope.context_id, scope.inquirer_id))
                        .and_then(|wrapper| K::select(&wrapper.instance)),
                };
                if resolved.is_none() {
                    tracing::warn!(
                        enhancer = ?enhancer,
                        kind = ?K::metadata_kind(),
                        module = scope.module,
                        "Skipping unresolvable enhancer"
                    );
                }
                resolved
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::error::PipelineResult;
    use crate::context::ContextType;
    use crate::handler::Argument;
    use crate::injector::{ModulesContainer, STATIC_CONTEXT};
    use crate::metadata::{HandlerKey, MetadataStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    type Seen = Arc<Mutex<Vec<&'static str>>>;

    struct NamedGuard {
        name: &'static str,
        seen: Seen,
    }

    impl NamedGuard {
        fn new(name: &'static str, seen: &Seen) -> Self {
            Self {
                name,
                seen: seen.clone(),
            }
        }
    }

    #[async_trait]
    impl CanActivate for NamedGuard {
        async fn can_activate(&self, _context: &ExecutionContext) -> PipelineResult<bool> {
            self.seen.lock().push(self.name);
            Ok(true)
        }
    }

    fn fixtures() -> (Controller, HandlerRef) {
        let controller = Controller::new("CatsController", Arc::new(()));
        let handler = HandlerRef::new("find", |_: Arc<()>, _: Vec<Argument>| async { Ok(Value::Null.into()) });
        (controller, handler)
    }

    #[tokio::test]
    async fn test_chain_order_global_controller_handler() {
        let seen = Seen::default();
        let store = Arc::new(MetadataStore::new());
        let container = Arc::new(ModulesContainer::new());
        container.add_instance(
            "CatsModule",
            "RolesGuard",
            Injectable::Guard(Arc::new(NamedGuard::new("roles", &seen))),
        );

        store.controller("CatsController").guard("RolesGuard");
        store
            .handler("CatsController", "find")
            .guard(EnhancerRef::guard(NamedGuard::new("handler", &seen)))
            .guard("RolesGuard");

        let creator: ContextCreator<GuardKind> = ContextCreator::new(store.clone(), Some(container))
            .with_global(vec![Arc::new(NamedGuard::new("global", &seen)) as Arc<dyn CanActivate>]);
        assert_eq!(creator.global().len(), 1);
        let (controller, handler) = fixtures();
        let chain = creator.create(&controller, &handler, ResolutionScope::new("CatsModule", STATIC_CONTEXT, None));

        let context = ExecutionContext::new(
            ContextType::Http,
            vec![],
            HandlerKey::new("CatsController", "find"),
            store,
        );
        for guard in &chain {
            guard.can_activate(&context).await.unwrap();
        }
        // same token declared twice resolves twice
        assert_eq!(*seen.lock(), vec!["global", "roles", "handler", "roles"]);
    }

    #[test]
    fn test_unresolvable_and_mismatched_refs_are_skipped() {
        let store = Arc::new(MetadataStore::new());
        let container = Arc::new(ModulesContainer::new());
        container.add_instance("CatsModule", "CatsService", Injectable::Value(Arc::new(1u8)));
        store
            .handler("CatsController", "find")
            .guard("MissingGuard")
            .guard("CatsService");

        let creator: ContextCreator<GuardKind> = ContextCreator::new(store, Some(container));
        let (controller, handler) = fixtures();
        let chain = creator.create(&controller, &handler, ResolutionScope::new("CatsModule", STATIC_CONTEXT, None));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_tokens_without_container_are_skipped() {
        let store = Arc::new(MetadataStore::new());
        store.handler("CatsController", "find").guard("AuthGuard");

        let creator: ContextCreator<GuardKind> = ContextCreator::new(store, None);
        let (controller, handler) = fixtures();
        let chain = creator.create(&controller, &handler, ResolutionScope::new("CatsModule", STATIC_CONTEXT, None));
        assert!(chain.is_empty());
    }
}
