//! Error types for the `soilhealth` backend.
//!
//! `MeasurementError` covers everything that can be wrong with a submitted
//! record. `ApiError` is what handlers return; it owns the mapping to HTTP
//! status codes so route modules never build error responses by hand.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

// ---

/// Validation failures for a submitted measurement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("visualScore is required for a vess measurement")]
    MissingVisualScore,

    #[error("visualScore must be between 1 and 5, got {0}")]
    VisualScoreOutOfRange(i64),

    #[error("{0} is required for a composition measurement")]
    MissingDepth(&'static str),

    #[error("{field} must be a non-negative number, got {value}")]
    InvalidDepth { field: &'static str, value: f64 },

    #[error("at least one of sandDepth, clayDepth, siltDepth must be greater than zero")]
    ZeroTotalDepth,

    #[error("coordinates out of range: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("location label must not be empty")]
    EmptyLocationLabel,

    #[error("invalid location key: {0}")]
    InvalidLocationKey(String),
}

/// A stored row that can no longer be rebuilt into a record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("unknown {column} '{value}'")]
    UnknownValue { column: &'static str, value: String },

    #[error("{location_type} location without {column}")]
    MissingColumn {
        location_type: &'static str,
        column: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] MeasurementError),
}

/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] MeasurementError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = match &self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ApiError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                "Failed to access measurement storage".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
