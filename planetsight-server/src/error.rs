use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use planetsight_ml::MlError;
use serde::Serialize;
use thiserror::Error;

use crate::analyzer::AnalyzerError;
use crate::source::SourceError;

/// Failures surfaced to HTTP callers as a single JSON error object.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Model not trained")]
    NotTrained,
    #[error("{0}")]
    Resource(String),
    #[error("{error}")]
    Collaborator { error: String, details: String },
    // Echoes internal messages back to the caller.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::NotTrained => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Resource(_) | ApiError::Collaborator { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Collaborator { error, details } => ErrorBody {
                error,
                details: Some(details),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<MlError> for ApiError {
    fn from(value: MlError) -> Self {
        match value {
            MlError::Io { .. }
            | MlError::Csv(_)
            | MlError::MissingColumn(_)
            | MlError::EmptyDataset
            | MlError::NonFiniteStatistic { .. } => ApiError::Resource(value.to_string()),
            MlError::DimensionMismatch { .. }
            | MlError::NonFiniteFeature { .. }
            | MlError::NonFiniteScore
            | MlError::InvalidParameters(_) => ApiError::Validation(value.to_string()),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(value: SourceError) -> Self {
        match value {
            SourceError::Dataset(err) => ApiError::Resource(format!("Dataset unavailable: {err}")),
            other => ApiError::Resource(format!("Dataset unavailable: {other}")),
        }
    }
}

impl From<AnalyzerError> for ApiError {
    fn from(value: AnalyzerError) -> Self {
        ApiError::Collaborator {
            error: value.to_string(),
            details: value.details(),
        }
    }
}
