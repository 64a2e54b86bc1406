//! Declarative handler metadata
//!
//! Route registration records what each controller and handler declares
//! (parameter sources, status override, redirect, render template,
//! headers, enhancers, custom keys) through an explicit builder API.
//! The pipeline only ever reads it back through [`MetadataReader`].

use crate::enhancers::EnhancerRef;
use crate::params::{RouteParamMetadata, RouteParamtypes};
use crate::router::{CustomHeader, RedirectResponse};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identity of one controller method
///
/// Keyed by name rather than by pointer so a dropped and re-created
/// controller cannot alias a stale cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey {
    pub controller: String,
    pub method: String,
}

impl HandlerKey {
    pub fn new(controller: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.controller, self.method)
    }
}

/// What a piece of metadata is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataTarget {
    Controller(String),
    Handler(HandlerKey),
}

/// Kind of metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    RouteArguments,
    ParamTypes,
    HttpCode,
    Redirect,
    RenderTemplate,
    Headers,
    Guards,
    Pipes,
    Interceptors,
    Custom(String),
}

/// A metadata value
#[derive(Clone)]
pub enum Metadata {
    RouteArguments(BTreeMap<usize, RouteParamMetadata>),
    ParamTypes(Vec<Option<String>>),
    HttpCode(u16),
    Redirect(RedirectResponse),
    RenderTemplate(String),
    Headers(Vec<CustomHeader>),
    Enhancers(Vec<EnhancerRef>),
    Custom(Value),
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metadata::RouteArguments(args) => f.debug_tuple("RouteArguments").field(args).finish(),
            Metadata::ParamTypes(types) => f.debug_tuple("ParamTypes").field(types).finish(),
            Metadata::HttpCode(code) => f.debug_tuple("HttpCode").field(code).finish(),
            Metadata::Redirect(redirect) => f.debug_tuple("Redirect").field(redirect).finish(),
            Metadata::RenderTemplate(t) => f.debug_tuple("RenderTemplate").field(t).finish(),
            Metadata::Headers(headers) => f.debug_tuple("Headers").field(headers).finish(),
            Metadata::Enhancers(refs) => f.debug_tuple("Enhancers").field(refs).finish(),
            Metadata::Custom(value) => f.debug_tuple("Custom").field(value).finish(),
        }
    }
}

/// Read access to declared metadata. Reads are synchronous and
/// side-effect free.
pub trait MetadataReader: Send + Sync {
    fn read(&self, kind: &MetadataKind, target: &MetadataTarget) -> Option<Metadata>;
}

/// Typed accessors over [`MetadataReader::read`]
pub trait MetadataReaderExt: MetadataReader {
    fn route_arguments(&self, key: &HandlerKey) -> BTreeMap<usize, RouteParamMetadata> {
        match self.read(&MetadataKind::RouteArguments, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::RouteArguments(args)) => args,
            _ => BTreeMap::new(),
        }
    }

    fn param_types(&self, key: &HandlerKey) -> Vec<Option<String>> {
        match self.read(&MetadataKind::ParamTypes, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::ParamTypes(types)) => types,
            _ => Vec::new(),
        }
    }

    fn http_code(&self, key: &HandlerKey) -> Option<u16> {
        match self.read(&MetadataKind::HttpCode, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::HttpCode(code)) => Some(code),
            _ => None,
        }
    }

    fn redirect(&self, key: &HandlerKey) -> Option<RedirectResponse> {
        match self.read(&MetadataKind::Redirect, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::Redirect(redirect)) => Some(redirect),
            _ => None,
        }
    }

    fn render_template(&self, key: &HandlerKey) -> Option<String> {
        match self.read(&MetadataKind::RenderTemplate, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::RenderTemplate(template)) => Some(template),
            _ => None,
        }
    }

    fn headers(&self, key: &HandlerKey) -> Vec<CustomHeader> {
        match self.read(&MetadataKind::Headers, &MetadataTarget::Handler(key.clone())) {
            Some(Metadata::Headers(headers)) => headers,
            _ => Vec::new(),
        }
    }

    fn enhancers(&self, kind: &MetadataKind, target: &MetadataTarget) -> Vec<EnhancerRef> {
        match self.read(kind, target) {
            Some(Metadata::Enhancers(refs)) => refs,
            _ => Vec::new(),
        }
    }
}

impl<T: MetadataReader + ?Sized> MetadataReaderExt for T {}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory [`MetadataReader`] filled through the registration builders
#[derive(Default)]
pub struct MetadataStore {
    entries: RwLock<HashMap<(MetadataKind, MetadataTarget), Metadata>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) one metadata entry.
    pub fn define(&self, kind: MetadataKind, target: MetadataTarget, metadata: Metadata) {
        self.entries.write().insert((kind, target), metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Start declaring metadata for a controller.
    pub fn controller(&self, name: impl Into<String>) -> ControllerMetadataBuilder<'_> {
        ControllerMetadataBuilder {
            store: self,
            target: MetadataTarget::Controller(name.into()),
        }
    }

    /// Start declaring metadata for one handler of a controller.
    pub fn handler(
        &self,
        controller: impl Into<String>,
        method: impl Into<String>,
    ) -> HandlerMetadataBuilder<'_> {
        HandlerMetadataBuilder {
            store: self,
            key: HandlerKey::new(controller, method),
        }
    }

    fn append_enhancer(&self, kind: MetadataKind, target: MetadataTarget, enhancer: EnhancerRef) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry((kind, target))
            .or_insert_with(|| Metadata::Enhancers(Vec::new()));
        match entry {
            Metadata::Enhancers(refs) => refs.push(enhancer),
            other => *other = Metadata::Enhancers(vec![enhancer]),
        }
    }

    fn insert_param(&self, key: &HandlerKey, index: usize, param: RouteParamMetadata) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry((MetadataKind::RouteArguments, MetadataTarget::Handler(key.clone())))
            .or_insert_with(|| Metadata::RouteArguments(BTreeMap::new()));
        match entry {
            Metadata::RouteArguments(args) => {
                args.insert(index, param);
            }
            other => *other = Metadata::RouteArguments(BTreeMap::from([(index, param)])),
        }
    }
}

impl MetadataReader for MetadataStore {
    fn read(&self, kind: &MetadataKind, target: &MetadataTarget) -> Option<Metadata> {
        self.entries.read().get(&(kind.clone(), target.clone())).cloned()
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore").field("entries", &self.len()).finish()
    }
}

/// Controller-level declarations (apply to every handler of the controller)
pub struct ControllerMetadataBuilder<'a> {
    store: &'a MetadataStore,
    target: MetadataTarget,
}

impl<'a> ControllerMetadataBuilder<'a> {
    pub fn guard(self, guard: impl Into<EnhancerRef>) -> Self {
        self.store.append_enhancer(MetadataKind::Guards, self.target.clone(), guard.into());
        self
    }

    pub fn pipe(self, pipe: impl Into<EnhancerRef>) -> Self {
        self.store.append_enhancer(MetadataKind::Pipes, self.target.clone(), pipe.into());
        self
    }

    pub fn interceptor(self, interceptor: impl Into<EnhancerRef>) -> Self {
        self.store
            .append_enhancer(MetadataKind::Interceptors, self.target.clone(), interceptor.into());
        self
    }

    pub fn set_metadata(self, key: impl Into<String>, value: Value) -> Self {
        self.store.define(
            MetadataKind::Custom(key.into()),
            self.target.clone(),
            Metadata::Custom(value),
        );
        self
    }
}

/// Handler-level declarations
pub struct HandlerMetadataBuilder<'a> {
    store: &'a MetadataStore,
    key: HandlerKey,
}

impl<'a> HandlerMetadataBuilder<'a> {
    pub fn key(&self) -> &HandlerKey {
        &self.key
    }

    fn target(&self) -> MetadataTarget {
        MetadataTarget::Handler(self.key.clone())
    }

    /// Declare parameter `index` as coming from `kind`, optionally narrowed to `data`.
    pub fn param(self, index: usize, kind: RouteParamtypes, data: Option<&str>) -> Self {
        let mut param = RouteParamMetadata::new(kind);
        if let Some(data) = data {
            param = param.with_data(data);
        }
        self.param_with(index, param)
    }

    /// Declare parameter `index` with a fully built descriptor.
    pub fn param_with(self, index: usize, param: RouteParamMetadata) -> Self {
        self.store.insert_param(&self.key, index, param);
        self
    }

    /// Declared parameter types by position, used as `metatype` for pipes.
    pub fn param_types(self, types: &[Option<&str>]) -> Self {
        let types = types.iter().map(|t| t.map(str::to_string)).collect();
        self.store
            .define(MetadataKind::ParamTypes, self.target(), Metadata::ParamTypes(types));
        self
    }

    pub fn http_code(self, code: u16) -> Self {
        self.store
            .define(MetadataKind::HttpCode, self.target(), Metadata::HttpCode(code));
        self
    }

    pub fn redirect(self, url: impl Into<String>, status_code: Option<u16>) -> Self {
        let redirect = RedirectResponse {
            url: url.into(),
            status_code,
        };
        self.store
            .define(MetadataKind::Redirect, self.target(), Metadata::Redirect(redirect));
        self
    }

    pub fn render(self, template: impl Into<String>) -> Self {
        self.store.define(
            MetadataKind::RenderTemplate,
            self.target(),
            Metadata::RenderTemplate(template.into()),
        );
        self
    }

    /// Append a response header; declaration order is preserved.
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let header = CustomHeader::new(name, value);
        {
            let mut entries = self.store.entries.write();
            let entry = entries
                .entry((MetadataKind::Headers, self.target()))
                .or_insert_with(|| Metadata::Headers(Vec::new()));
            match entry {
                Metadata::Headers(headers) => headers.push(header),
                other => *other = Metadata::Headers(vec![header]),
            }
        }
        self
    }

    pub fn guard(self, guard: impl Into<EnhancerRef>) -> Self {
        self.store.append_enhancer(MetadataKind::Guards, self.target(), guard.into());
        self
    }

    pub fn pipe(self, pipe: impl Into<EnhancerRef>) -> Self {
        self.store.append_enhancer(MetadataKind::Pipes, self.target(), pipe.into());
        self
    }

    pub fn interceptor(self, interceptor: impl Into<EnhancerRef>) -> Self {
        self.store
            .append_enhancer(MetadataKind::Interceptors, self.target(), interceptor.into());
        self
    }

    pub fn set_metadata(self, key: impl Into<String>, value: Value) -> Self {
        self.store.define(
            MetadataKind::Custom(key.into()),
            self.target(),
            Metadata::Custom(value),
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handler_builder_records_params_in_index_order() {
        let store = MetadataStore::new();
        let key = store
            .handler("CatsController", "create")
            .param(1, RouteParamtypes::Body, None)
            .param(0, RouteParamtypes::Query, Some("q"))
            .key()
            .clone();

        let args = store.route_arguments(&key);
        let kinds: Vec<_> = args.iter().map(|(i, p)| (*i, p.kind.clone())).collect();
        assert_eq!(
            kinds,
            vec![(0, RouteParamtypes::Query), (1, RouteParamtypes::Body)]
        );
        assert_eq!(args[&0].data.as_deref(), Some("q"));
    }

    #[test]
    fn test_response_metadata() {
        let store = MetadataStore::new();
        let key = HandlerKey::new("CatsController", "legacy");
        store
            .handler("CatsController", "legacy")
            .http_code(204)
            .redirect("/new", Some(301))
            .header("Cache-Control", "none")
            .header("X-Powered-By", "ouroboros");

        assert_eq!(store.http_code(&key), Some(204));
        assert_eq!(store.redirect(&key).unwrap().status_code, Some(301));
        let names: Vec<_> = store.headers(&key).into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Cache-Control", "X-Powered-By"]);
        assert_eq!(store.render_template(&key), None);
    }

    #[test]
    fn test_enhancers_accumulate_per_target() {
        let store = MetadataStore::new();
        store.controller("CatsController").guard("AuthGuard").guard("RolesGuard");
        store.handler("CatsController", "find").guard("ThrottleGuard");

        let controller = store.enhancers(
            &MetadataKind::Guards,
            &MetadataTarget::Controller("CatsController".into()),
        );
        assert_eq!(controller.len(), 2);

        let handler = store.enhancers(
            &MetadataKind::Guards,
            &MetadataTarget::Handler(HandlerKey::new("CatsController", "find")),
        );
        assert_eq!(handler.len(), 1);
        assert!(store
            .enhancers(&MetadataKind::Pipes, &MetadataTarget::Controller("CatsController".into()))
            .is_empty());
    }

    #[test]
    fn test_custom_metadata() {
        let store = MetadataStore::new();
        store.handler("A", "b").set_metadata("roles", json!(["admin"]));
        let read = store.read(
            &MetadataKind::Custom("roles".into()),
            &MetadataTarget::Handler(HandlerKey::new("A", "b")),
        );
        assert!(matches!(read, Some(Metadata::Custom(v)) if v == json!(["admin"])));
    }
}
