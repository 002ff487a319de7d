//! Mapping from core errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use site_analysis::{AnalysisError, StoreError};

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or query parameter
    BadRequest(String),
    /// Route parameter names nothing we know
    NotFound(String),
    Analysis(AnalysisError),
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self::Analysis(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Analysis(err) => match err {
                AnalysisError::Validation { .. } => StatusCode::BAD_REQUEST,
                AnalysisError::SubjectNotFound { .. } | AnalysisError::TaskNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                AnalysisError::TaskNotTerminal { .. }
                | AnalysisError::Storage(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
                AnalysisError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
                AnalysisError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(message) | Self::NotFound(message) => message,
            Self::Analysis(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                err.to_string()
            }
        };

        (
            status,
            Json(ErrorBody {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}
