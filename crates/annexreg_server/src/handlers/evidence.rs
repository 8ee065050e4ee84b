//! Evidence routes: CRUD, presigned upload/download URLs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use annexreg_core::types::{Classification, EvidenceItem, EvidenceType, UserRole};
use annexreg_core::{CurrentUser, RegistryError};
use annexreg_postgres::evidence::{
    self, CreateEvidenceRequest, EvidenceFilter, EvidenceWithUsage, MappedVersionSummary,
    UpdateEvidenceRequest,
};

use super::{Page, Pagination};
use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

const UPLOAD_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    #[serde(flatten)]
    pub item: EvidenceItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceDetailResponse {
    #[serde(flatten)]
    pub item: EvidenceItem,
    pub usage_count: i64,
    pub mapped_versions: Vec<MappedVersionSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEvidenceQuery {
    #[serde(rename = "type", default)]
    pub evidence_type: Option<EvidenceType>,
    #[serde(default)]
    pub classification: Option<Classification>,
    /// Comma-separated tag filter with AND semantics.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub orphaned: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub filename: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub storage_uri: String,
    pub expires_in: u64,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateEvidenceRequest>,
) -> ApiResult<(StatusCode, Json<EvidenceResponse>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let (item, duplicate_of) = evidence::create(&mut tx, &request, &current).await?;
    commit(tx).await?;
    Ok((
        StatusCode::CREATED,
        Json(EvidenceResponse { item, duplicate_of }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<ListEvidenceQuery>,
) -> ApiResult<Json<Page<EvidenceWithUsage>>> {
    let page = Pagination {
        limit: query.limit.unwrap_or(100),
        offset: query.offset.unwrap_or(0),
    }
    .clamped(evidence::MAX_LIST_LIMIT);
    let filter = EvidenceFilter {
        evidence_type: query.evidence_type,
        classification: query.classification,
        tags: query
            .tags
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        search: query.search,
        orphaned: query.orphaned,
    };

    let mut tx = state.begin().await?;
    let (items, total) =
        evidence::list(&mut tx, current.org_id, &filter, page.limit, page.offset).await?;
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
    Path(evidence_id): Path<Uuid>,
) -> ApiResult<Json<EvidenceDetailResponse>> {
    let mut tx = state.begin().await?;
    let (item, usage_count, mapped_versions) =
        evidence::get_with_details(&mut tx, evidence_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(EvidenceDetailResponse {
        item,
        usage_count,
        mapped_versions,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(evidence_id): Path<Uuid>,
    Json(request): Json<UpdateEvidenceRequest>,
) -> ApiResult<Json<EvidenceItem>> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let item = evidence::update(&mut tx, evidence_id, &request, &current).await?;
    commit(tx).await?;
    Ok(Json(item))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(evidence_id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    evidence::delete(
        &mut tx,
        evidence_id,
        query.force,
        state.storage.as_ref(),
        &current,
    )
    .await?;
    commit(tx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Presigned upload URL with a server-generated org-scoped storage URI.
pub async fn upload_url(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<UploadUrlRequest>,
) -> ApiResult<Json<UploadUrlResponse>> {
    current.require_role(UserRole::Editor)?;
    if request.filename.is_empty() || request.filename.len() > 255 {
        return Err(AppError(RegistryError::Validation(
            "filename must be 1-255 characters".to_string(),
        )));
    }

    let extension = request
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or("bin");

    let now = Utc::now();
    let storage_uri = format!(
        "evidence/{}/{:04}/{:02}/{}.{}",
        current.org_id,
        now.year(),
        now.month(),
        Uuid::new_v4(),
        extension.to_lowercase()
    );

    let upload_url = state
        .storage
        .presign_upload(&storage_uri, UPLOAD_URL_TTL)
        .await?;
    Ok(Json(UploadUrlResponse {
        upload_url,
        storage_uri,
        expires_in: UPLOAD_URL_TTL.as_secs(),
    }))
}

#[derive(Debug, Serialize)]
pub struct DownloadUrlResponse {
    pub download_url: String,
    pub expires_in: u64,
}

/// 302 redirect straight to the presigned object URL.
pub async fn download(
    state: State<AppState>,
    current: Extension<CurrentUser>,
    evidence_id: Path<Uuid>,
) -> ApiResult<axum::response::Response> {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    let Json(response) = download_url(state, current, evidence_id).await?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, response.download_url)],
    )
        .into_response())
}

/// Presigned download URL for upload-type evidence.
pub async fn download_url(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(evidence_id): Path<Uuid>,
) -> ApiResult<Json<DownloadUrlResponse>> {
    let mut tx = state.begin().await?;
    let item = evidence::get(&mut tx, evidence_id, current.org_id).await?;
    commit(tx).await?;

    if item.evidence_type != EvidenceType::Upload {
        return Err(AppError(RegistryError::Validation(
            "only upload evidence has downloadable content".to_string(),
        )));
    }
    let storage_uri = item
        .type_metadata
        .get("storage_uri")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError(RegistryError::not_found("stored object")))?;

    let download_url = state
        .storage
        .presign_download(storage_uri, UPLOAD_URL_TTL)
        .await?;
    Ok(Json(DownloadUrlResponse {
        download_url,
        expires_in: UPLOAD_URL_TTL.as_secs(),
    }))
}
