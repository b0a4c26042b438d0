use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::ImportError;

/// Envelope for successful API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ImportError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ImportError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ImportError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ImportError::Extract(_) => (StatusCode::INTERNAL_SERVER_ERROR, "extract_error"),
            ImportError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ImportError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ImportError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ImportError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
