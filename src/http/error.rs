//! Error → HTTP response mapping.

use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::CommerceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub messages: Vec<String>,
}

impl CommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Spreadsheet(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::Conflict(_) | Self::ReferenceTaken => StatusCode::CONFLICT,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation(messages) => messages.clone(),
            Self::Config(_) | Self::Database(_) | Self::Internal(_) => vec!["Internal server error".to_string()],
            other => vec![other.to_string()],
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody { error: status.canonical_reason().unwrap_or("Error").to_string(), messages: self.messages() };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for CommerceError {
    fn from(rejection: JsonRejection) -> Self { Self::validation(rejection.body_text()) }
}

impl From<QueryRejection> for CommerceError {
    fn from(rejection: QueryRejection) -> Self { Self::validation(rejection.body_text()) }
}

impl From<PathRejection> for CommerceError {
    fn from(rejection: PathRejection) -> Self { Self::validation(rejection.body_text()) }
}

impl From<FormRejection> for CommerceError {
    fn from(rejection: FormRejection) -> Self { Self::validation(rejection.body_text()) }
}
