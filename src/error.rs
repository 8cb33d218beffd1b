//! Global error handling module for the episode stream API
//!
//! This module provides a unified error type that handles all application errors
//! and converts them to appropriate HTTP responses with consistent JSON structure.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiError;

/// Application-wide error type for request handling
///
/// Resolution failures are not errors at this level: the scraper reports them
/// inside the `StreamingResult` body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ApiError::new(self.user_message());

        HttpResponse::build(status).json(error_response)
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
