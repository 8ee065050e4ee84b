//! Export routes: list, generate, download redirect.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use annexreg_core::types::{Export, UserRole};
use annexreg_core::CurrentUser;
use annexreg_postgres::exports::{self, GenerateExportRequest};

use super::{Page, Pagination};
use crate::error::ApiResult;
use crate::state::{commit, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListExportsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListExportsQuery>,
) -> ApiResult<Json<Page<Export>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(100),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(500);
    let mut tx = state.begin().await?;
    let (items, total) = exports::list(
        &mut tx,
        system_id,
        version_id,
        current.org_id,
        page.limit,
        page.offset,
    )
    .await?;
    commit(tx).await?;
    Ok(Json(Page {
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Generate a new export package. Each call creates a new Export row —
/// generation is deliberately not idempotent.
pub async fn generate(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<GenerateExportRequest>,
) -> ApiResult<(StatusCode, Json<Export>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let export = exports::generate(
        &mut tx,
        system_id,
        version_id,
        &request,
        state.storage.as_ref(),
        &current,
    )
    .await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(export)))
}

/// 302 redirect to a presigned package URL (1 hour).
pub async fn download(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(export_id): Path<Uuid>,
) -> ApiResult<Response> {
    let mut tx = state.begin().await?;
    let url = exports::download_url(
        &mut tx,
        export_id,
        current.org_id,
        state.storage.as_ref(),
    )
    .await?;
    commit(tx).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}
