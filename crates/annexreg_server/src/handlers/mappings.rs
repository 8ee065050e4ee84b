//! Evidence-mapping routes under a version.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use annexreg_core::types::{EvidenceMapping, MappingTargetType, UserRole};
use annexreg_core::CurrentUser;
use annexreg_postgres::mappings::{self, CreateMappingRequest, MappingWithEvidence};

use super::Pagination;
use crate::error::ApiResult;
use crate::state::{commit, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListMappingsQuery {
    #[serde(default)]
    pub target_type: Option<MappingTargetType>,
    /// Exact key, or a prefix search with a trailing `*`.
    #[serde(default)]
    pub target_key: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((_system_id, version_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CreateMappingRequest>,
) -> ApiResult<(StatusCode, Json<EvidenceMapping>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let mapping = mappings::create(&mut tx, version_id, &request, &current).await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(mapping)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((_system_id, version_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListMappingsQuery>,
) -> ApiResult<Json<Vec<MappingWithEvidence>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(100),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(500);
    let mut tx = state.begin().await?;
    let items = mappings::list(
        &mut tx,
        version_id,
        current.org_id,
        query.target_type,
        query.target_key.as_deref(),
        page.limit,
        page.offset,
    )
    .await?;
    commit(tx).await?;
    Ok(Json(items))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((_system_id, version_id, mapping_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    mappings::delete(&mut tx, mapping_id, version_id, &current).await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}
