//! Maps `RegistryError` to HTTP status codes and JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use annexreg_core::RegistryError;

/// Wrapper converting `RegistryError` into an axum response.
pub struct AppError(pub RegistryError);

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        Self(e)
    }
}

impl AppError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self(RegistryError::Internal(anyhow::anyhow!("{e}")))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        // Schema failures carry structured details for the caller.
        let body = match &self.0 {
            RegistryError::SchemaValidation(details) => json!({
                "error": "schema validation failed",
                "detail": details,
                "code": status.as_u16(),
            }),
            other => json!({
                "error": other.to_string(),
                "code": status.as_u16(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let resp = AppError(RegistryError::Conflict("dup".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn schema_validation_maps_to_400() {
        let resp = AppError(RegistryError::SchemaValidation(json!({"errors": []})))
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let resp = AppError(RegistryError::RateLimited("slow down".into())).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
