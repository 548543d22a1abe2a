//! Error types for the lifecycle HTTP surface.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use berth_common::error::{BerthError, FieldError};
use berth_engine::{EngineError, EngineVerb};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for handler operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed or unknown credential. Never says which.
    #[error("Could not validate credentials")]
    Unauthorized,

    /// The request body or query failed validation.
    #[error("request validation failed")]
    Validation {
        /// Offending fields.
        errors: Vec<FieldError>,
    },

    /// The engine client reported a failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An engine call outlived the service deadline.
    #[error("engine {verb} did not complete within {}s", after.as_secs())]
    Timeout {
        /// Verb that timed out.
        verb: EngineVerb,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// Any other server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-field validation error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Whether the engine could not be reached at all, as opposed to a
    /// refused or failed operation.
    #[must_use]
    pub const fn is_engine_unreachable(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Unavailable { .. }))
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation { .. }
            | Self::Engine(EngineError::DuplicateName { .. } | EngineError::ImageNotFound { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Engine(EngineError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Engine(EngineError::Unavailable { .. } | EngineError::OperationFailed { .. })
            | Self::Timeout { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BerthError> for ApiError {
    fn from(err: BerthError) -> Self {
        match err {
            BerthError::Validation { errors } => Self::Validation { errors },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// JSON error body: `{"detail": ..., "errors": [...]}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable summary.
    pub detail: String,
    /// Per-field detail for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_engine_unreachable() {
            tracing::error!(infrastructure = true, error = %self, "container engine unreachable");
        } else if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let detail = self.to_string();
        let unauthorized = matches!(self, Self::Unauthorized);
        let errors = match self {
            Self::Validation { errors } => Some(errors),
            _ => None,
        };

        let mut response = (status, axum::Json(ErrorResponse { detail, errors })).into_response();
        if unauthorized {
            let _ = response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
