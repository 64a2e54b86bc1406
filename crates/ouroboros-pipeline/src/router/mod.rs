//! HTTP routing side of the pipeline

mod execution_context;
mod metadata_storage;
mod response_controller;

pub use execution_context::{ExecutionUnit, RouterExecutionContext};
pub use metadata_storage::{HandlerMetadata, HandlerMetadataStorage, ResponseStrategy};
pub use response_controller::{CustomHeader, RedirectResponse, ResponseChannel, RouterResponseController};
