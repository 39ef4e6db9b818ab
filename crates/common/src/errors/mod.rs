//! Error types for CiteGraph
//!
//! Provides a single error enum for every crate in the workspace with:
//! - Distinct variants for each graph-building failure mode
//! - HTTP status code mapping for the gateway
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    NoActiveDocument,

    // Resolution errors (4xxx)
    TitleUnavailable,
    NoConfidentMatch,
    DocumentUnreadable,

    // External service errors (8xxx)
    ServiceUnavailable,

    // Internal errors (9xxx)
    CacheMisuse,
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::NoActiveDocument => 1002,

            ErrorCode::TitleUnavailable => 4001,
            ErrorCode::NoConfidentMatch => 4002,
            ErrorCode::DocumentUnreadable => 4003,

            ErrorCode::ServiceUnavailable => 8001,

            ErrorCode::CacheMisuse => 9001,
            ErrorCode::InternalError => 9002,
            ErrorCode::ConfigurationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("No document has been resolved in this session")]
    NoActiveDocument,

    /// The document declares no title, so the paper cannot be identified
    #[error("Document metadata has no title")]
    TitleUnavailable,

    /// The search hit (if any) is not the same paper as the document
    #[error("No confident bibliographic match for '{title}'")]
    NoConfidentMatch {
        title: String,
        candidate: Option<String>,
    },

    #[error("Unreadable document {path}: {message}")]
    Document { path: String, message: String },

    /// Network, status or parse failure talking to the bibliographic API
    #[error("Bibliographic service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Depth cache has no entry for paper {paper_id} at depth {depth}")]
    CacheMisuse { paper_id: String, depth: u32 },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NoActiveDocument => ErrorCode::NoActiveDocument,
            AppError::TitleUnavailable => ErrorCode::TitleUnavailable,
            AppError::NoConfidentMatch { .. } => ErrorCode::NoConfidentMatch,
            AppError::Document { .. } => ErrorCode::DocumentUnreadable,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::CacheMisuse { .. } => ErrorCode::CacheMisuse,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NoConfidentMatch { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::NoActiveDocument => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::TitleUnavailable | AppError::Document { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            // 500 Internal Server Error
            AppError::CacheMisuse { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// True for the kinds that mean "no graph for this document" rather than a failure
    pub fn is_no_graph(&self) -> bool {
        matches!(
            self,
            AppError::TitleUnavailable | AppError::NoConfidentMatch { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::NoConfidentMatch {
                candidate: Some(candidate),
                ..
            } => Some(serde_json::json!({ "candidate": candidate })),
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
