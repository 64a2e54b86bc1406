//! Shared test doubles for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ouroboros_pipeline::metadata::{Metadata, MetadataKind, MetadataTarget};
use ouroboros_pipeline::{
    ArgumentMetadata, CanActivate, ExecutionContext, MetadataReader, MetadataStore, PipeTransform,
    PipelineResult, ResponseChannel,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Response channel that records every call as a line of text
#[derive(Default)]
pub struct RecordingChannel {
    pub calls: Mutex<Vec<String>>,
    pub render_to_string: bool,
}

impl RecordingChannel {
    pub fn with_string_rendering() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            render_to_string: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Whether any delivery (reply, redirect or render) happened
    pub fn delivered(&self) -> bool {
        self.calls.lock().iter().any(|call| {
            call.starts_with("reply") || call.starts_with("redirect") || call.starts_with("render")
        })
    }
}

#[async_trait]
impl ResponseChannel for RecordingChannel {
    type Response = ();

    fn set_status(&self, _response: &(), status: u16) {
        self.calls.lock().push(format!("status {status}"));
    }

    fn set_header(&self, _response: &(), name: &str, value: &str) {
        self.calls.lock().push(format!("header {name}={value}"));
    }

    async fn reply(&self, _response: &(), body: Value, status: Option<u16>) -> PipelineResult<()> {
        self.calls
            .lock()
            .push(format!("reply {body} {}", status.unwrap_or_default()));
        Ok(())
    }

    async fn redirect(&self, _response: &(), status: u16, url: &str) -> PipelineResult<()> {
        self.calls.lock().push(format!("redirect {status} {url}"));
        Ok(())
    }

    async fn render(&self, _response: &(), template: &str, view: Value) -> PipelineResult<()> {
        self.calls.lock().push(format!("render {template} {view}"));
        Ok(())
    }

    fn can_render_to_string(&self) -> bool {
        self.render_to_string
    }

    async fn render_to_string(&self, template: &str, view: Value, _response: &()) -> PipelineResult<String> {
        Ok(format!("<{template}>{view}</{template}>"))
    }
}

/// Metadata reader that counts how often it is consulted
pub struct CountingReader {
    pub store: MetadataStore,
    reads: AtomicUsize,
}

impl CountingReader {
    pub fn new(store: MetadataStore) -> Self {
        Self {
            store,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MetadataReader for CountingReader {
    fn read(&self, kind: &MetadataKind, target: &MetadataTarget) -> Option<Metadata> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.store.read(kind, target)
    }
}

/// Guard with a fixed answer that counts its evaluations
pub struct StubGuard {
    pub allow: bool,
    pub calls: Arc<AtomicUsize>,
}

impl StubGuard {
    pub fn new(allow: bool) -> Self {
        Self {
            allow,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CanActivate for StubGuard {
    async fn can_activate(&self, _context: &ExecutionContext) -> PipelineResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.allow)
    }
}

/// Pipe replacing every value with a fixed one, counting its runs
pub struct TagPipe {
    pub tag: Value,
    pub calls: Arc<AtomicUsize>,
}

impl TagPipe {
    pub fn new(tag: Value) -> Self {
        Self {
            tag,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PipeTransform for TagPipe {
    async fn transform(&self, _value: Value, _metadata: &ArgumentMetadata) -> PipelineResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tag.clone())
    }
}

/// Shared log of the order in which things ran
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
