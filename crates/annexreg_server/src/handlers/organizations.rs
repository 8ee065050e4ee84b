//! Organization bootstrap — guarded by the bootstrap token header, not a
//! bearer token.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    Json,
};

use annexreg_core::RegistryError;
use annexreg_postgres::organizations::{self, BootstrapOrgRequest, BootstrapOrgResponse};

use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

pub const BOOTSTRAP_TOKEN_HEADER: &str = "x-bootstrap-token";

pub async fn bootstrap(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<BootstrapOrgResponse>)> {
    let presented = req
        .headers()
        .get(BOOTSTRAP_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.bootstrap_token.is_empty() || presented != state.bootstrap_token {
        return Err(AppError(RegistryError::Unauthenticated(
            "invalid bootstrap token".to_string(),
        )));
    }

    let body = axum::body::to_bytes(req.into_body(), 1024 * 1024)
        .await
        .map_err(AppError::internal)?;
    let request: BootstrapOrgRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError(RegistryError::Validation(format!("invalid body: {e}"))))?;

    let mut tx = state.begin().await?;
    let response = organizations::bootstrap(&mut tx, &request).await?;
    commit(tx).await?;

    Ok((StatusCode::CREATED, Json(response)))
}
