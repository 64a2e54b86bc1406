//! Per-handler descriptor cache

use crate::metadata::HandlerKey;
use crate::params::RouteParamMetadata;
use crate::router::{CustomHeader, RedirectResponse};
use dashmap::DashMap;
use std::sync::Arc;

/// How the outcome of a handler is delivered; fixed when the descriptor is built
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseStrategy {
    Render { template: String },
    Redirect(RedirectResponse),
    /// Plain reply, skipped when the handler writes the response itself
    Reply { response_handled: bool },
}

/// Registration-time metadata of one handler
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerMetadata {
    /// Highest declared parameter index + 1
    pub args_length: usize,
    /// Declared parameters in index order
    pub params: Vec<(usize, RouteParamMetadata)>,
    pub param_types: Vec<Option<String>>,
    /// Declared or method-default status
    pub http_status_code: u16,
    pub response_headers: Vec<CustomHeader>,
    pub strategy: ResponseStrategy,
}

impl HandlerMetadata {
    pub fn has_custom_headers(&self) -> bool {
        !self.response_headers.is_empty()
    }

    pub fn is_response_handled(&self) -> bool {
        matches!(self.strategy, ResponseStrategy::Reply { response_handled: true })
    }

    pub fn metatype(&self, index: usize) -> Option<String> {
        self.param_types.get(index).cloned().flatten()
    }
}

/// Lazily filled, never evicted
#[derive(Debug, Default)]
pub struct HandlerMetadataStorage {
    entries: DashMap<HandlerKey, Arc<HandlerMetadata>>,
}

impl HandlerMetadataStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &HandlerKey) -> Option<Arc<HandlerMetadata>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Racing writers for the same key are harmless: the values are equal.
    pub fn set(&self, key: HandlerKey, metadata: Arc<HandlerMetadata>) {
        self.entries.insert(key, metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RouteParamtypes;

    fn metadata(handled: bool) -> HandlerMetadata {
        HandlerMetadata {
            args_length: 1,
            params: vec![(0, RouteParamMetadata::new(RouteParamtypes::Response))],
            param_types: vec![Some("Response".into())],
            http_status_code: 200,
            response_headers: vec![],
            strategy: ResponseStrategy::Reply { response_handled: handled },
        }
    }

    #[test]
    fn test_get_set() {
        let storage = HandlerMetadataStorage::new();
        let key = HandlerKey::new("CatsController", "find");
        assert!(storage.get(&key).is_none());

        storage.set(key.clone(), Arc::new(metadata(true)));
        let cached = storage.get(&key).unwrap();
        assert!(cached.is_response_handled());
        assert_eq!(cached.metatype(0).as_deref(), Some("Response"));
        assert_eq!(cached.metatype(3), None);
        assert_eq!(storage.len(), 1);

        storage.clear();
        assert!(storage.is_empty());
    }
}
