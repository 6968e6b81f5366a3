use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::catalog::CatalogServiceError;
use crate::ledger::StockLedgerError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error body.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    pub fn invalid_argument<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", detail)
    }

    /// Logs the underlying cause and hides it from the caller.
    pub fn internal(stage: &'static str, err: &dyn std::error::Error) -> Self {
        error!(stage, error = %err, "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "an unexpected error occurred",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn problem_type(&self) -> &'static str {
        self.body.problem_type
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<StockLedgerError> for ProblemResponse {
    fn from(err: StockLedgerError) -> Self {
        match err {
            StockLedgerError::NotFound(_) => Self::not_found(err.to_string()),
            StockLedgerError::InvalidArgument(detail) => Self::invalid_argument(detail),
            StockLedgerError::InsufficientStock { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "insufficient_stock", err.to_string())
            }
            other => Self::internal("ledger", &other),
        }
    }
}

impl From<CatalogServiceError> for ProblemResponse {
    fn from(err: CatalogServiceError) -> Self {
        match err {
            CatalogServiceError::NotFound => Self::not_found(err.to_string()),
            CatalogServiceError::InvalidArgument(detail) => Self::invalid_argument(detail),
            CatalogServiceError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            other => Self::internal("inventory", &other),
        }
    }
}
