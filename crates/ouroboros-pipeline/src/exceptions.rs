//! Mapping propagated errors to what a caller sees
//!
//! The execution units never catch errors; transports hand them to one of
//! these handlers. HTTP gets a status and a JSON body, RPC and gateway
//! transports get a `{status: "error", message}` payload.

use crate::error::{PipelineError, PipelineResult, UNKNOWN_EXCEPTION_MESSAGE};
use crate::router::ResponseChannel;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Status and body delivered for an error
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub body: Value,
}

impl ErrorResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        ErrorResponse::new(err.status_code(), err.to_json())
    }
}

/// Returns `Some` for the errors it handles
pub type ExceptionFilterFn = Arc<dyn Fn(&PipelineError) -> Option<ErrorResponse> + Send + Sync>;

#[derive(Clone)]
struct ExceptionFilter {
    name: String,
    catch: ExceptionFilterFn,
}

/// HTTP exceptions handler with user filters
#[derive(Clone, Default)]
pub struct ExceptionsHandler {
    filters: Vec<ExceptionFilter>,
}

impl ExceptionsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter; filters are consulted in registration order.
    pub fn with_filter<F>(mut self, name: impl Into<String>, catch: F) -> Self
    where
        F: Fn(&PipelineError) -> Option<ErrorResponse> + Send + Sync + 'static,
    {
        self.filters.push(ExceptionFilter {
            name: name.into(),
            catch: Arc::new(catch),
        });
        self
    }

    /// Response for `err`: the first matching filter wins, otherwise the
    /// standard error body.
    pub fn next(&self, err: &PipelineError) -> ErrorResponse {
        for filter in &self.filters {
            if let Some(response) = (filter.catch)(err) {
                tracing::debug!(filter = %filter.name, "Exception filter handled error");
                return response;
            }
        }
        if err.is_expected() {
            tracing::debug!(error = %err, "Request failed");
        } else {
            tracing::error!(error = %err, "Unhandled exception");
        }
        ErrorResponse::from(err)
    }

    /// Deliver the response for `err` through `channel`.
    pub async fn handle<C: ResponseChannel>(
        &self,
        err: &PipelineError,
        channel: &C,
        response: &C::Response,
    ) -> PipelineResult<()> {
        let ErrorResponse { status, body } = self.next(err);
        channel.set_status(response, status);
        channel.reply(response, body, Some(status)).await
    }
}

impl fmt::Debug for ExceptionsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.filters.iter().map(|filter| &filter.name).collect();
        f.debug_struct("ExceptionsHandler").field("filters", &names).finish()
    }
}

/// `{status: "error", message}` payload for message-based transports.
///
/// Object payloads of RPC and gateway exceptions are forwarded as-is;
/// unexpected errors never leak their details.
pub fn error_payload(err: &PipelineError) -> Value {
    match err {
        PipelineError::Rpc(payload) | PipelineError::Ws(payload) => {
            if payload.is_object() {
                payload.clone()
            } else {
                json!({ "status": "error", "message": payload })
            }
        }
        PipelineError::Forbidden(message) | PipelineError::Http { message, .. } => {
            json!({ "status": "error", "message": message })
        }
        PipelineError::Validation(errors) => json!({
            "status": "error",
            "message": errors.to_string(),
            "errors": errors.to_json(),
        }),
        _ => {
            tracing::error!(error = %err, "Unhandled exception");
            json!({ "status": "error", "message": UNKNOWN_EXCEPTION_MESSAGE })
        }
    }
}
