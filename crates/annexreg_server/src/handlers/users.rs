//! User administration routes (admin only for mutations).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use annexreg_core::types::{User, UserRole};
use annexreg_core::CurrentUser;
use annexreg_postgres::users::{self, UpdateUserRequest};

use crate::error::ApiResult;
use crate::state::{commit, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub role: Option<UserRole>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let mut tx = state.begin().await?;
    let items = users::list(&mut tx, current.org_id, query.role).await?;
    commit(tx).await?;
    Ok(Json(items))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let mut tx = state.begin().await?;
    let user = users::get(&mut tx, user_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(user))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    current.require_admin()?;
    let mut tx = state.begin().await?;
    let user = users::update(&mut tx, user_id, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(user))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    current.require_admin()?;
    let mut tx = state.begin().await?;
    users::delete(&mut tx, user_id, &current).await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}
