//! Pipes: per-argument transformation and validation
//!
//! A pipe chain runs strictly in order, each pipe receiving the previous
//! pipe's output. Chains of distinct arguments are independent.

mod builtin;

pub use builtin::{DefaultValuePipe, ParseBoolPipe, ParseIntPipe, ValidationPipe, ValueType};

use crate::enhancers::{ContextCreator, PipeKind};
use crate::error::PipelineResult;
use crate::params::RouteParamtypes;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// What a pipe knows about the argument it transforms
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentMetadata {
    /// Declared parameter type, when known
    pub metatype: Option<String>,
    /// Where the value came from
    pub kind: RouteParamtypes,
    /// Sub-key the value was extracted with
    pub data: Option<String>,
}

impl ArgumentMetadata {
    pub fn new(kind: RouteParamtypes) -> Self {
        Self {
            metatype: None,
            kind,
            data: None,
        }
    }

    pub fn with_metatype(mut self, metatype: Option<String>) -> Self {
        self.metatype = metatype;
        self
    }

    pub fn with_data(mut self, data: Option<String>) -> Self {
        self.data = data;
        self
    }

    /// Location label used in validation errors
    pub fn location(&self) -> &str {
        self.kind.as_str()
    }

    /// Field label used in validation errors
    pub fn field(&self) -> &str {
        self.data.as_deref().unwrap_or("")
    }
}

/// Transforms a single argument value
#[async_trait]
pub trait PipeTransform: Send + Sync {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> PipelineResult<Value>;
}

/// Resolves the route-level pipe chain of a handler
pub type PipesContextCreator = ContextCreator<PipeKind>;

/// Runs pipe chains
#[derive(Debug, Default, Clone, Copy)]
pub struct PipesConsumer;

impl PipesConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Feed `value` through `pipes` in order.
    pub async fn apply(
        &self,
        value: Value,
        metadata: &ArgumentMetadata,
        pipes: &[Arc<dyn PipeTransform>],
    ) -> PipelineResult<Value> {
        let mut value = value;
        for pipe in pipes {
            value = pipe.transform(value, metadata).await?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AddOne {
        calls: Arc<AtomicUsize>,
        deferred: bool,
    }

    #[async_trait]
    impl PipeTransform for AddOne {
        async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> PipelineResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.deferred {
                tokio::task::yield_now().await;
            }
            let n = value.as_i64().ok_or_else(|| PipelineError::Handler("not a number".into()))?;
            Ok(json!(n + 1))
        }
    }

    struct Reject;

    #[async_trait]
    impl PipeTransform for Reject {
        async fn transform(&self, _value: Value, _metadata: &ArgumentMetadata) -> PipelineResult<Value> {
            Err(PipelineError::http(400u16, "rejected"))
        }
    }

    #[tokio::test]
    async fn test_pipes_run_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipes: Vec<Arc<dyn PipeTransform>> = vec![
            Arc::new(AddOne { calls: calls.clone(), deferred: false }),
            Arc::new(AddOne { calls: calls.clone(), deferred: true }),
            Arc::new(AddOne { calls: calls.clone(), deferred: false }),
        ];
        let meta = ArgumentMetadata::new(RouteParamtypes::Query);
        let value = PipesConsumer.apply(json!(0), &meta, &pipes).await.unwrap();
        assert_eq!(value, json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipes: Vec<Arc<dyn PipeTransform>> = vec![
            Arc::new(Reject),
            Arc::new(AddOne { calls: calls.clone(), deferred: false }),
        ];
        let meta = ArgumentMetadata::new(RouteParamtypes::Body);
        let err = PipesConsumer.apply(json!(0), &meta, &pipes).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let meta = ArgumentMetadata::new(RouteParamtypes::Param).with_data(Some("id".into()));
        assert_eq!(meta.field(), "id");
        let value = PipesConsumer.apply(json!({"a": 1}), &meta, &[]).await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }
}
