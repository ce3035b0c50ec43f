//! Client-facing error taxonomy for session creation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned to callers when the processor call fails.
pub const SESSION_FAILURE_MESSAGE: &str = "Error creating payment session";

/// Failure of a session creation request.
///
/// Processor failures carry no detail: it is logged where it happens and
/// never handed back to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", SESSION_FAILURE_MESSAGE)]
    Internal,
}

impl SessionError {
    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            SessionError::Validation(_) => 400,
            SessionError::Internal => 500,
        }
    }

    /// Wire body shared by the HTTP and bus entrypoints.
    pub fn body(&self) -> ErrorBody {
        let error = match self {
            SessionError::Validation(_) => "Bad Request",
            SessionError::Internal => "Internal Server Error",
        };

        ErrorBody {
            status_code: self.status_code(),
            error: error.to_string(),
            message: self.to_string(),
        }
    }
}

/// Error body: `{"statusCode": 400, "error": "Bad Request", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: String,
    pub message: String,
}
