//! The error taxonomy surfaced by the router, and its mapping onto HTTP status codes.

use std::sync::Arc;

use hyper::StatusCode;
use thiserror::Error;

use crate::task::TaskError;

/// Errors the router translates into an HTTP response.
///
/// Every variant here corresponds to one of the error kinds named in the request-handling
/// design: a route miss, an input-decoding failure, a task/middleware failure, cancellation,
/// or a recovered panic. The router is the single place that turns one of these into a status
/// code; application code and task functions never construct a raw `StatusCode` themselves.
#[derive(Debug, Error, Clone)]
pub enum RouterError {
    /// No registered pattern matched the request path.
    #[error("no route matched {0}")]
    NoMatch(String),

    /// `marshal_input` rejected the request with a validation-class error.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `marshal_input` rejected the request for any other reason.
    #[error("failed to decode input: {0}")]
    DecodeFailed(Arc<anyhow::Error>),

    /// A task handler, task middleware, or loader task returned an error.
    #[error("task failed: {0}")]
    TaskFailed(Arc<dyn std::error::Error + Send + Sync>),

    /// The request's `Ctx` was cancelled before the chain completed.
    #[error("request cancelled")]
    Cancelled,

    /// A handler, middleware constructor, or task panicked.
    #[error("internal panic recovered")]
    PanicRecovered,

    /// A pipeline component (middleware construction, chain compilation) failed for a reason
    /// unrelated to task execution.
    #[error("internal error: {0}")]
    Internal(Arc<anyhow::Error>),
}

impl RouterError {
    /// The HTTP status this error should be reported as, per §7 of the design.
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::NoMatch(_) => StatusCode::NOT_FOUND,
            RouterError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RouterError::DecodeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::PanicRecovered => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TaskError> for RouterError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Cancelled => RouterError::Cancelled,
            TaskError::Failed(e) => RouterError::TaskFailed(e),
        }
    }
}

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, RouterError>;
