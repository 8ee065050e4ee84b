//! Decision-log administration: key lifecycle, listing, export.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use annexreg_core::decision_event::{export_rows_csv, export_rows_json};
use annexreg_core::types::{DecisionLogEntry, UserRole};
use annexreg_core::{CurrentUser, RegistryError};
use annexreg_postgres::logging::{self, EnableLoggingRequest};

use super::{Page, Pagination};
use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub key_id: Uuid,
    /// Plaintext key, shown exactly once.
    pub api_key: String,
    pub endpoint: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListLogsQuery {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogListItem {
    pub id: Uuid,
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor: String,
    pub decision: String,
    pub ingested_at: DateTime<Utc>,
}

impl From<&DecisionLogEntry> for LogListItem {
    fn from(entry: &DecisionLogEntry) -> Self {
        let str_at = |path: [&str; 2]| {
            entry
                .event_json
                .get(path[0])
                .and_then(|v| v.get(path[1]))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: entry.id,
            event_id: entry.event_id.clone(),
            event_time: entry.event_time,
            actor: entry
                .event_json
                .get("actor")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            decision: str_at(["output", "decision"]),
            ingested_at: entry.ingested_at,
        }
    }
}

pub async fn enable(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<EnableLoggingRequest>,
) -> ApiResult<(StatusCode, Json<ApiKeyResponse>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let (key, api_key) = logging::enable(&mut tx, system_id, version_id, &request, &current).await?;
    commit(tx).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            key_id: key.id,
            api_key,
            endpoint: "/api/v1/logs",
        }),
    ))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(key_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    current.require_admin()?;
    let mut tx = state.begin().await?;
    logging::revoke(&mut tx, key_id, &current).await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListLogsQuery>,
) -> ApiResult<Json<Page<LogListItem>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(100),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(1000);
    let mut tx = state.begin().await?;
    let (entries, total) = logging::list(
        &mut tx,
        system_id,
        version_id,
        current.org_id,
        query.start_time,
        query.end_time,
        page.limit,
        page.offset,
    )
    .await?;
    commit(tx).await?;
    Ok(Json(Page {
        items: entries.iter().map(LogListItem::from).collect(),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id, log_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<DecisionLogEntry>> {
    let mut tx = state.begin().await?;
    let entry = logging::get(&mut tx, system_id, version_id, log_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ExportLogsQuery {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

fn default_format() -> String {
    "json".to_string()
}

/// Export the filtered event set as canonical JSON or CSV with attachment
/// headers.
pub async fn export(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ExportLogsQuery>,
) -> ApiResult<Response> {
    let mut tx = state.begin().await?;
    let rows = logging::export_rows(
        &mut tx,
        system_id,
        version_id,
        current.org_id,
        query.start_time,
        query.end_time,
    )
    .await?;
    commit(tx).await?;

    match query.format.as_str() {
        "json" => Ok((
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"decision-logs-{version_id}.json\""),
                ),
            ],
            export_rows_json(&rows),
        )
            .into_response()),
        "csv" => Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"decision-logs-{version_id}.csv\""),
                ),
            ],
            export_rows_csv(&rows)?,
        )
            .into_response()),
        other => Err(AppError(RegistryError::Validation(format!(
            "unsupported export format '{other}', use json or csv"
        )))),
    }
}
