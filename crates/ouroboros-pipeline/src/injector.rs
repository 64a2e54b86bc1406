//! Instance resolution for guards, pipes and interceptors
//!
//! Provides:
//! - The [`InstanceResolver`] lookup the pipeline resolves enhancer tokens with
//! - Context ids for request-scoped resolution
//! - [`ModulesContainer`], an in-memory module/provider registry with
//!   singleton, request and transient scopes

use crate::guards::CanActivate;
use crate::handler::Instance;
use crate::interceptors::Interceptor;
use crate::pipes::PipeTransform;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Dependency-injection context id
///
/// Request-scoped providers get one instance per context id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

/// Context used when no request-specific context exists
pub const STATIC_CONTEXT: ContextId = ContextId(1);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(2);

impl ContextId {
    /// Allocate a fresh context id.
    ///
    /// Request-scoped and transient instances built for this id stay in the
    /// container until [`ModulesContainer::release_context`] is called for
    /// it; [`ModulesContainer::scope`] ties that release to a drop.
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_static(&self) -> bool {
        *self == STATIC_CONTEXT
    }
}

impl Default for ContextId {
    fn default() -> Self {
        STATIC_CONTEXT
    }
}

/// Dependency scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DependencyScope {
    /// One instance for the application lifetime
    #[default]
    Singleton,
    /// One instance per context id
    Request,
    /// One instance per context id and inquirer
    Transient,
}

/// A live injectable
#[derive(Clone)]
pub enum Injectable {
    Guard(Arc<dyn CanActivate>),
    Pipe(Arc<dyn PipeTransform>),
    Interceptor(Arc<dyn Interceptor>),
    /// Anything else (services, repositories, ...)
    Value(Instance),
}

impl Injectable {
    pub fn kind(&self) -> &'static str {
        match self {
            Injectable::Guard(_) => "guard",
            Injectable::Pipe(_) => "pipe",
            Injectable::Interceptor(_) => "interceptor",
            Injectable::Value(_) => "value",
        }
    }

    pub fn as_guard(&self) -> Option<Arc<dyn CanActivate>> {
        match self {
            Injectable::Guard(guard) => Some(guard.clone()),
            _ => None,
        }
    }

    pub fn as_pipe(&self) -> Option<Arc<dyn PipeTransform>> {
        match self {
            Injectable::Pipe(pipe) => Some(pipe.clone()),
            _ => None,
        }
    }

    pub fn as_interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        match self {
            Injectable::Interceptor(interceptor) => Some(interceptor.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Injectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Injectable::{}(..)", self.kind())
    }
}

/// Resolved provider
#[derive(Debug, Clone)]
pub struct InstanceWrapper {
    pub token: String,
    pub scope: DependencyScope,
    pub instance: Injectable,
}

/// Lookup of live instances by token within a module
pub trait InstanceResolver: Send + Sync {
    fn get(
        &self,
        token: &str,
        module: &str,
        context_id: ContextId,
        inquirer_id: Option<&str>,
    ) -> Option<InstanceWrapper>;
}

// ============================================================================
// In-memory container
// ============================================================================

/// Provider factory
pub type InjectableFactory = Arc<dyn Fn() -> Injectable + Send + Sync>;

struct Provider {
    scope: DependencyScope,
    factory: InjectableFactory,
    singleton: RwLock<Option<Injectable>>,
    scoped: RwLock<HashMap<(ContextId, Option<String>), Injectable>>,
}

impl Provider {
    fn instance(&self, context_id: ContextId, inquirer_id: Option<&str>) -> Injectable {
        match self.scope {
            DependencyScope::Singleton => {
                if let Some(instance) = self.singleton.read().as_ref() {
                    return instance.clone();
                }
                self.singleton
                    .write()
                    .get_or_insert_with(|| (self.factory)())
                    .clone()
            }
            DependencyScope::Request => self.scoped_instance((context_id, None)),
            DependencyScope::Transient => {
                self.scoped_instance((context_id, inquirer_id.map(str::to_string)))
            }
        }
    }

    fn scoped_instance(&self, key: (ContextId, Option<String>)) -> Injectable {
        if let Some(instance) = self.scoped.read().get(&key) {
            return instance.clone();
        }
        self.scoped
            .write()
            .entry(key)
            .or_insert_with(|| (self.factory)())
            .clone()
    }
}

/// Modules and their providers
#[derive(Default)]
pub struct ModulesContainer {
    modules: RwLock<HashMap<String, HashMap<String, Arc<Provider>>>>,
}

impl ModulesContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty module. Registering twice is a no-op.
    pub fn add_module(&self, name: impl Into<String>) {
        self.modules.write().entry(name.into()).or_default();
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Register a provider built lazily by `factory`.
    ///
    /// The module is created on demand; an existing provider with the
    /// same token is replaced.
    pub fn add_provider<F>(
        &self,
        module: impl Into<String>,
        token: impl Into<String>,
        scope: DependencyScope,
        factory: F,
    ) where
        F: Fn() -> Injectable + Send + Sync + 'static,
    {
        let module = module.into();
        let token = token.into();
        let provider = Arc::new(Provider {
            scope,
            factory: Arc::new(factory),
            singleton: RwLock::new(None),
            scoped: RwLock::new(HashMap::new()),
        });
        let replaced = self
            .modules
            .write()
            .entry(module.clone())
            .or_default()
            .insert(token.clone(), provider)
            .is_some();
        if replaced {
            tracing::warn!(module = %module, token = %token, "Provider replaced");
        }
    }

    /// Register an already-built singleton.
    pub fn add_instance(&self, module: impl Into<String>, token: impl Into<String>, instance: Injectable) {
        self.add_provider(module, token, DependencyScope::Singleton, move || instance.clone());
    }

    /// Open a request context released when the returned scope is dropped.
    pub fn scope(self: &Arc<Self>) -> ContextScope {
        ContextScope {
            container: self.clone(),
            id: ContextId::next(),
        }
    }

    /// Drop every request-scoped and transient instance created for `context_id`.
    pub fn release_context(&self, context_id: ContextId) {
        for providers in self.modules.read().values() {
            for provider in providers.values() {
                provider.scoped.write().retain(|(id, _), _| *id != context_id);
            }
        }
    }
}

/// A fresh context id whose scoped instances are released on drop
pub struct ContextScope {
    container: Arc<ModulesContainer>,
    id: ContextId,
}

impl ContextScope {
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.container.release_context(self.id);
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextScope").field(&self.id).finish()
    }
}

impl InstanceResolver for ModulesContainer {
    fn get(
        &self,
        token: &str,
        module: &str,
        context_id: ContextId,
        inquirer_id: Option<&str>,
    ) -> Option<InstanceWrapper> {
        let provider = self.modules.read().get(module)?.get(token)?.clone();
        Some(InstanceWrapper {
            token: token.to_string(),
            scope: provider.scope,
            instance: provider.instance(context_id, inquirer_id),
        })
    }
}

impl fmt::Debug for ModulesContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modules = self.modules.read();
        f.debug_struct("ModulesContainer")
            .field("modules", &modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_factory(counter: Arc<AtomicUsize>) -> impl Fn() -> Injectable + Send + Sync {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Injectable::Value(Arc::new(()))
        }
    }

    #[test]
    fn test_singleton_scope() {
        let container = ModulesContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        container.add_provider("AppModule", "Config", DependencyScope::Singleton, counting_factory(built.clone()));

        let a = container.get("Config", "AppModule", ContextId::next(), None).unwrap();
        let b = container.get("Config", "AppModule", ContextId::next(), None).unwrap();
        assert_eq!(a.scope, DependencyScope::Singleton);
        assert_eq!(b.token, "Config");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_scope_per_context() {
        let container = ModulesContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        container.add_provider("AppModule", "Session", DependencyScope::Request, counting_factory(built.clone()));

        let ctx = ContextId::next();
        container.get("Session", "AppModule", ctx, None).unwrap();
        container.get("Session", "AppModule", ctx, Some("CatsController")).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);

        container.get("Session", "AppModule", ContextId::next(), None).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);

        container.release_context(ctx);
        container.get("Session", "AppModule", ctx, None).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_context_scope_releases_on_drop() {
        let container = Arc::new(ModulesContainer::new());
        let built = Arc::new(AtomicUsize::new(0));
        container.add_provider("AppModule", "Session", DependencyScope::Request, counting_factory(built.clone()));
        let held = |container: &ModulesContainer| container.modules.read()["AppModule"]["Session"].scoped.read().len();

        for _ in 0..1000 {
            let scope = container.scope();
            container.get("Session", "AppModule", scope.id(), None).unwrap();
            container.get("Session", "AppModule", scope.id(), Some("CatsController")).unwrap();
            assert_eq!(held(&container), 1);
        }
        assert_eq!(built.load(Ordering::SeqCst), 1000);
        assert_eq!(held(&container), 0);
    }

    #[test]
    fn test_transient_scope_per_inquirer() {
        let container = ModulesContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        container.add_provider("AppModule", "Logger", DependencyScope::Transient, counting_factory(built.clone()));

        container.get("Logger", "AppModule", STATIC_CONTEXT, Some("A")).unwrap();
        container.get("Logger", "AppModule", STATIC_CONTEXT, Some("A")).unwrap();
        container.get("Logger", "AppModule", STATIC_CONTEXT, Some("B")).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_module_or_token() {
        let container = ModulesContainer::new();
        container.add_module("AppModule");
        assert!(container.has_module("AppModule"));
        assert!(container.get("Nope", "AppModule", STATIC_CONTEXT, None).is_none());
        assert!(container.get("Nope", "OtherModule", STATIC_CONTEXT, None).is_none());
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(!a.is_static());
        assert!(ContextId::default().is_static());
    }
}
