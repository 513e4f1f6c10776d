//! Error types for the docfield API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docfield_core::pipeline::failure_report;
use docfield_core::{CollaboratorError, DocFieldError, ExtractionReport, ImageSize, TemplateError};
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Collaborator(_) => "COLLABORATOR_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = ErrorResponse {
            success: false,
            code: self.code().to_string(),
            error: match &self {
                ApiError::TemplateNotFound(vendor) => format!("Template '{}' not found", vendor),
                other => other.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(vendor) => ApiError::TemplateNotFound(vendor),
            TemplateError::InvalidName(_) => ApiError::InvalidRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Worker task failed: {}", err))
    }
}

impl From<DocFieldError> for ApiError {
    fn from(err: DocFieldError) -> Self {
        match err {
            DocFieldError::InvalidInput(msg) => ApiError::InvalidRequest(msg),
            DocFieldError::Template(e) => e.into(),
            DocFieldError::Collaborator(e @ CollaboratorError::Unavailable { .. }) => {
                ApiError::Unavailable(e.to_string())
            }
            DocFieldError::Collaborator(e) => ApiError::Collaborator(e.to_string()),
        }
    }
}

/// Failure of an extraction endpoint.
///
/// Bad input and missing templates are rejected like any other request;
/// everything else is reported as an error-status [`ExtractionReport`].
#[derive(Debug)]
pub enum ReportError {
    Rejected(ApiError),
    Failed {
        status: StatusCode,
        report: ExtractionReport,
    },
}

impl From<DocFieldError> for ReportError {
    fn from(err: DocFieldError) -> Self {
        let report = failure_report(&err);
        match ApiError::from(err) {
            e @ (ApiError::InvalidRequest(_) | ApiError::TemplateNotFound(_)) => {
                ReportError::Rejected(e)
            }
            e => {
                tracing::error!("Extraction failed: {}", e);
                ReportError::Failed {
                    status: e.status(),
                    report,
                }
            }
        }
    }
}

impl From<ApiError> for ReportError {
    fn from(err: ApiError) -> Self {
        ReportError::Rejected(err)
    }
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Extraction worker failed: {}", err);
        ReportError::Failed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            report: ExtractionReport::failure(
                format!("Worker task failed: {}", err),
                ImageSize::new(0, 0),
            ),
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        match self {
            ReportError::Rejected(e) => e.into_response(),
            ReportError::Failed { status, report } => (status, Json(report)).into_response(),
        }
    }
}
