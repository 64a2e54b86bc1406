//! Pipeline error types
//!
//! The pipeline never recovers from a failure locally: every error is
//! returned to the transport adapter that invoked the execution unit.
//! The only error the pipeline synthesizes itself is
//! [`PipelineError::Forbidden`], raised when the guard chain denies access.

use ouroboros_common::HttpStatus;
use serde_json::{json, Value};
use thiserror::Error;

/// Pipeline result type
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Message carried by the failure raised when a guard denies access.
pub const FORBIDDEN_MESSAGE: &str = "Forbidden resource";

/// Raised when an interceptor claims to have rendered a view but did not
/// produce a string.
pub const RENDER_RESULT_NOT_STRING: &str =
    "Interceptor rendered the view but the result is not a string";

/// Generic message used for errors that do not carry a safe description.
pub const UNKNOWN_EXCEPTION_MESSAGE: &str = "Internal server error";

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Guard chain evaluated to false
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Raised by a pipe
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Programmer error detected while composing or delivering a response
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Raised by a handler without a more specific shape
    #[error("Handler error: {0}")]
    Handler(String),

    /// HTTP exception raised with an explicit status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Exception raised by an RPC handler; the payload is forwarded to the caller
    #[error("RPC exception: {0}")]
    Rpc(Value),

    /// Exception raised by a gateway handler; the payload is emitted to the client
    #[error("WebSocket exception: {0}")]
    Ws(Value),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl PipelineError {
    /// Shorthand for an HTTP exception.
    pub fn http(status: impl Into<HttpStatus>, message: impl Into<String>) -> Self {
        PipelineError::Http {
            status: status.into().code(),
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Forbidden(_) => HttpStatus::FORBIDDEN.code(),
            PipelineError::Validation(_) => HttpStatus::UNPROCESSABLE_ENTITY.code(),
            PipelineError::Http { status, .. } => *status,
            PipelineError::Configuration(_)
            | PipelineError::Handler(_)
            | PipelineError::Rpc(_)
            | PipelineError::Ws(_)
            | PipelineError::Internal(_)
            | PipelineError::Unknown(_) => HttpStatus::INTERNAL_SERVER_ERROR.code(),
        }
    }

    /// Whether the error was raised deliberately by user code (as opposed
    /// to a bug or an unexpected failure).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PipelineError::Forbidden(_)
                | PipelineError::Validation(_)
                | PipelineError::Http { .. }
                | PipelineError::Rpc(_)
                | PipelineError::Ws(_)
        )
    }

    /// Standard error body: `{"statusCode": .., "message": ..}`
    pub fn to_json(&self) -> Value {
        let status = self.status_code();
        match self {
            PipelineError::Forbidden(message) | PipelineError::Http { message, .. } => {
                json!({ "statusCode": status, "message": message })
            }
            PipelineError::Validation(errors) => json!({
                "statusCode": status,
                "message": errors.to_string(),
                "errors": errors.to_json(),
            }),
            PipelineError::Rpc(payload) | PipelineError::Ws(payload) => payload.clone(),
            _ => json!({ "statusCode": status, "message": UNKNOWN_EXCEPTION_MESSAGE }),
        }
    }
}

impl From<ValidationErrors> for PipelineError {
    fn from(errors: ValidationErrors) -> Self {
        PipelineError::Validation(errors)
    }
}

/// Collection of validation errors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Convert into `Err` when at least one error was collected.
    pub fn into_result(self) -> PipelineResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(self))
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.errors.iter().map(ValidationError::to_json).collect())
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "{}", single.message),
            errors => write!(f, "{} validation errors", errors.len()),
        }
    }
}

/// Single validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Where the value came from: "body", "query", "param", ...
    pub location: String,
    /// Field name, empty when the whole value was checked
    pub field: String,
    pub message: String,
    /// "type_error", "value_error", "missing"
    pub error_type: String,
}

impl ValidationError {
    pub fn new(
        location: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            field: field.into(),
            message: message.into(),
            error_type: error_type.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "loc": [self.location, self.field],
            "msg": self.message,
            "type": self.error_type,
        })
    }
}
