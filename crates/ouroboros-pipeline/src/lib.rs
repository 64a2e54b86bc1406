//! ouroboros-pipeline: request execution pipeline for controller handlers
//!
//! Turns a controller method plus its declared metadata into a single
//! callable execution unit:
//! - guards decide whether the call may proceed
//! - pipes transform each extracted argument
//! - interceptors wrap the handler call
//! - the result is delivered as a reply, a redirect or a rendered view
//!
//! Descriptors are computed once per handler and cached. The same
//! guard/pipe/interceptor composition drives RPC and WebSocket handlers.

pub mod config;
pub mod context;
pub mod enhancers;
pub mod error;
pub mod exceptions;
pub mod guards;
pub mod handler;
pub mod injector;
pub mod interceptors;
pub mod logging;
pub mod metadata;
pub mod params;
pub mod pipes;
pub mod request;
pub mod router;
pub mod rpc;
pub mod ws;

mod message;

// Re-exports
pub use config::{ApplicationConfig, PipelineSettings};
pub use context::{ContextType, ExecutionContext};
pub use enhancers::{EnhancerRef, ResolutionScope};
pub use error::{PipelineError, PipelineResult, ValidationError, ValidationErrors};
pub use exceptions::{ErrorResponse, ExceptionsHandler};
pub use guards::CanActivate;
pub use handler::{Argument, Controller, HandlerRef, HandlerResult, Instance, NextFn};
pub use injector::{ContextId, ContextScope, DependencyScope, Injectable, InstanceResolver, ModulesContainer, STATIC_CONTEXT};
pub use interceptors::{CallHandler, Interception, Interceptor};
pub use logging::{init_logging, LoggingConfig};
pub use metadata::{HandlerKey, MetadataReader, MetadataReaderExt, MetadataStore};
pub use params::{RouteParamMetadata, RouteParamtypes};
pub use pipes::{ArgumentMetadata, PipeTransform};
pub use request::Request;
pub use router::{ExecutionUnit, ResponseChannel, RouterExecutionContext};
pub use rpc::{MessageHandlers, MicroserviceResponse, RpcContextCreator, RpcHandler};
pub use ws::{ChannelClient, WsClient, WsContextCreator, WsHandler};

// Re-export shared HTTP types from ouroboros-common
pub use ouroboros_common::{HttpStatus, RequestMethod};
