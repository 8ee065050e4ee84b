//! Decision-event ingestion — authenticated by `X-API-Key`, not a bearer
//! token.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use annexreg_core::RegistryError;
use annexreg_postgres::logging;

use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: Uuid,
    pub event_id: String,
    pub version_id: Uuid,
}

pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw_event): Json<Value>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError(RegistryError::Unauthenticated(
                "missing X-API-Key header".to_string(),
            ))
        })?;

    let mut tx = state.begin().await?;
    let key = logging::authenticate(&mut tx, presented).await?;
    let entry = logging::ingest(&mut tx, &key, &raw_event).await?;
    commit(tx).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: entry.id,
            event_id: entry.event_id,
            version_id: entry.version_id,
        }),
    ))
}
