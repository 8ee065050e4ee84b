//! Annex IV section routes.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::str::FromStr;
use uuid::Uuid;

use annexreg_core::sections::SectionKey;
use annexreg_core::types::{AnnexSection, UserRole};
use annexreg_core::{CurrentUser, RegistryError};
use annexreg_postgres::sections::{self, UpdateSectionRequest};

use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

fn parse_key(raw: &str) -> Result<SectionKey, AppError> {
    SectionKey::from_str(raw).map_err(|_| {
        AppError(RegistryError::NotFound(format!(
            "unknown section key '{raw}'"
        )))
    })
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<AnnexSection>>> {
    let mut tx = state.begin().await?;
    let items = sections::list(&mut tx, system_id, version_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(items))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id, key)): Path<(Uuid, Uuid, String)>,
) -> ApiResult<Json<AnnexSection>> {
    let key = parse_key(&key)?;
    let mut tx = state.begin().await?;
    let section = sections::get(&mut tx, system_id, version_id, key, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(section))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((system_id, version_id, key)): Path<(Uuid, Uuid, String)>,
    Json(request): Json<UpdateSectionRequest>,
) -> ApiResult<Json<AnnexSection>> {
    current.require_role(UserRole::Editor)?;
    let key = parse_key(&key)?;
    let mut tx = state.begin().await?;
    let section =
        sections::update(&mut tx, system_id, version_id, key, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(section))
}
