//! Standardized error handling module for the exporter
//! Provides the HTTP-facing error type plus the typed errors of the collection pipeline

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use tracing::{error, info};

/// Standard error response structure for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Errors surfaced to HTTP clients and to the binary entry point
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
    },

    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ExporterError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a validation error with field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an internal error with source
    pub fn internal_with_source<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to ErrorResponse for API responses
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            code: self.error_code().to_string(),
            details: match self {
                Self::Validation { field: Some(field), .. } => {
                    Some(serde_json::json!({ "field": field }))
                }
                _ => None,
            },
        }
    }
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = self.to_error_response();

        match &self {
            ExporterError::Internal { .. } | ExporterError::Configuration { .. } => {
                error!("Internal error: {}", self);
            }
            _ => {
                info!("Client error: {}", self);
            }
        }

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for exporter operations
pub type ExporterResult<T> = std::result::Result<T, ExporterError>;

/// Failure of a single dsmadmc invocation
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("dsmadmc timed out after {}s", timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    #[error("dsmadmc exited with {}: {stderr}", status.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    Failed {
        status: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("failed to execute dsmadmc: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw output could not be read as delimited records
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed quoting on line {line}")]
    MalformedQuote { line: usize },

    #[error("csv decode error: {0}")]
    Csv(#[from] csv::Error),
}

/// A field could not be converted to its typed value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid number {value:?} in column {column}")]
    InvalidNumber { column: String, value: String },

    #[error("invalid timestamp {value:?} in column {column}")]
    InvalidTimestamp { column: String, value: String },

    #[error("missing value in column {column}")]
    Missing { column: String },
}

impl ParseError {
    /// Attach the source column to an error produced by a column-less parser
    pub fn in_column(self, column: &str) -> Self {
        match self {
            Self::InvalidNumber { value, .. } => Self::InvalidNumber {
                column: column.to_string(),
                value,
            },
            Self::InvalidTimestamp { value, .. } => Self::InvalidTimestamp {
                column: column.to_string(),
                value,
            },
            Self::Missing { .. } => Self::Missing {
                column: column.to_string(),
            },
        }
    }
}

/// Everything that can abort one collector's run
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("metric registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl CollectError {
    /// Whether the failure was a dsmadmc deadline rather than a fault
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Query(QueryError::Timeout { .. }))
    }
}
