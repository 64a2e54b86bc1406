//! Microservice (RPC) side of the pipeline

mod context_creator;
mod exceptions;
mod server;

pub use context_creator::{RpcContextCreator, RpcHandler};
pub use exceptions::{RpcExceptionsHandler, RpcProxy};
pub use server::{send, MessageHandlers, MicroserviceResponse, NO_PATTERN_MESSAGE};
