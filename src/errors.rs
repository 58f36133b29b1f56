use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::{models::policy::BlockRuleError, services::backend::BackendError};

/// Request-level failure: a status plus the text written as the body.
///
/// Messages are passed through verbatim; an empty message yields an empty body.
#[derive(Debug, PartialEq, Eq)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// A 404 that reveals nothing: used for blocked objects.
    pub fn blocked() -> Self {
        Self::not_found(String::new())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.message.is_empty() {
            self.status.into_response()
        } else {
            (self.status, self.message).into_response()
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(msg) => AppError::not_found(msg),
            BackendError::Other(msg) => AppError::internal(msg),
        }
    }
}

impl From<BlockRuleError> for AppError {
    fn from(err: BlockRuleError) -> Self {
        AppError::internal(err.to_string())
    }
}
