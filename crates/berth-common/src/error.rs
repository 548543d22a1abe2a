//! Unified error types for the Berth workspace.
//!
//! Each higher-level crate defines its own domain-specific error enum that
//! wraps these common variants when appropriate.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// A single rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `ports.80/tcp`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// One or more request fields are malformed or missing.
    #[error("validation failed: {}", join_fields(errors))]
    Validation {
        /// Every field that failed validation, in request order.
        errors: Vec<FieldError>,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;
