//! AI-system CRUD routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use annexreg_core::types::{AiSystem, HrUseCaseType, UserRole};
use annexreg_core::CurrentUser;
use annexreg_postgres::systems::{self, CreateSystemRequest, UpdateSystemRequest};

use super::{Page, Pagination};
use crate::error::ApiResult;
use crate::state::{commit, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListSystemsQuery {
    #[serde(default)]
    pub use_case_type: Option<HrUseCaseType>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateSystemRequest>,
) -> ApiResult<(StatusCode, Json<AiSystem>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let system = systems::create(&mut tx, &request, &current).await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(system)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ListSystemsQuery>,
) -> ApiResult<Json<Page<AiSystem>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(200);
    let mut tx = state.begin().await?;
    let (items, total) = systems::list(
        &mut tx,
        current.org_id,
        query.use_case_type,
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
    Path(system_id): Path<Uuid>,
) -> ApiResult<Json<AiSystem>> {
    let mut tx = state.begin().await?;
    let system = systems::get(&mut tx, system_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(system))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
    Json(request): Json<UpdateSystemRequest>,
) -> ApiResult<Json<AiSystem>> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let system = systems::update(&mut tx, system_id, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(system))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    current.require_admin()?;
    let mut tx = state.begin().await?;
    systems::delete(&mut tx, system_id, &current).await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}
