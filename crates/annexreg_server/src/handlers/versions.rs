//! Version lifecycle routes: CRUD, status transitions, clone, compare,
//! canonical manifest, completeness report.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use annexreg_core::canonical::canonical_string;
use annexreg_core::diff::VersionDiff;
use annexreg_core::scoring::CompletenessReport;
use annexreg_core::types::{SystemVersion, UserRole, VersionStatus};
use annexreg_core::CurrentUser;
use annexreg_postgres::versions::{
    self, CloneVersionRequest, CreateVersionRequest, StatusChangeRequest, UpdateVersionRequest,
};
use annexreg_postgres::{exports, sections};

use super::{Page, Pagination};
use crate::error::ApiResult;
use crate::state::{commit, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListVersionsQuery {
    #[serde(default)]
    pub status: Option<VersionStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub from_version: Uuid,
    pub to_version: Uuid,
}

#[derive(Debug, Serialize)]
pub struct VersionRef {
    pub id: Uuid,
    pub label: String,
    pub status: VersionStatus,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub from_version: VersionRef,
    pub to_version: VersionRef,
    #[serde(flatten)]
    pub diff: VersionDiff,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
    Json(request): Json<CreateVersionRequest>,
) -> ApiResult<(StatusCode, Json<SystemVersion>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let version = versions::create(&mut tx, system_id, &request, &current).await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
    Query(query): Query<ListVersionsQuery>,
) -> ApiResult<Json<Page<SystemVersion>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(200);
    let mut tx = state.begin().await?;
    let (items, total) = versions::list(
        &mut tx,
        system_id,
        current.org_id,
        query.status,
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

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SystemVersion>> {
    let mut tx = state.begin().await?;
    let version = versions::get(&mut tx, system_id, version_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(version))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateVersionRequest>,
) -> ApiResult<Json<SystemVersion>> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let version = versions::update(&mut tx, system_id, version_id, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(version))
}

pub async fn change_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Json<SystemVersion>> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let version =
        versions::change_status(&mut tx, system_id, version_id, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(version))
}

pub async fn clone(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CloneVersionRequest>,
) -> ApiResult<(StatusCode, Json<SystemVersion>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let version = versions::clone(&mut tx, system_id, version_id, &request, &current).await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let mut tx = state.begin().await?;
    versions::delete(&mut tx, system_id, version_id, &current).await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn compare(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<Json<CompareResponse>> {
    let mut tx = state.begin().await?;
    let (from, to, diff) = versions::compare(
        &mut tx,
        system_id,
        query.from_version,
        query.to_version,
        current.org_id,
    )
    .await?;
    commit(tx).await?;
    Ok(Json(CompareResponse {
        from_version: VersionRef {
            id: from.id,
            label: from.label,
            status: from.status,
        },
        to_version: VersionRef {
            id: to.id,
            label: to.label,
            status: to.status,
        },
        diff,
    }))
}

/// Canonical manifest for a version, emitted in canonical textual form.
pub async fn manifest(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Response> {
    let mut tx = state.begin().await?;
    let (manifest, _hash) = exports::manifest(&mut tx, system_id, version_id, current.org_id).await?;
    commit(tx).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        canonical_string(&manifest),
    )
        .into_response())
}

pub async fn completeness(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<CompletenessReport>> {
    let mut tx = state.begin().await?;
    let report = sections::completeness(&mut tx, system_id, version_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(report))
}
