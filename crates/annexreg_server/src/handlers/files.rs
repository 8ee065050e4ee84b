//! Signed-URL file routes backing the filesystem object store.
//!
//! `GET /files/{uri}` serves stored bytes, `PUT /files/{uri}` accepts an
//! upload; both require a valid, unexpired signature issued by
//! `FsObjectStore`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use annexreg_core::RegistryError;

use crate::error::{ApiResult, AppError};
use crate::storage::FsObjectStore;

#[derive(Clone)]
pub struct FilesState {
    pub store: Arc<FsObjectStore>,
}

#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub exp: i64,
    pub sig: String,
}

fn check_signature(
    store: &FsObjectStore,
    method: &str,
    uri: &str,
    query: &SignatureQuery,
) -> Result<(), AppError> {
    if store.verify(method, uri, query.exp, &query.sig) {
        Ok(())
    } else {
        Err(AppError(RegistryError::Unauthenticated(
            "invalid or expired signature".to_string(),
        )))
    }
}

pub async fn download(
    State(state): State<FilesState>,
    Path(uri): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> ApiResult<Response> {
    check_signature(&state.store, "GET", &uri, &query)?;
    let path = state.store.path_for(&uri)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError(RegistryError::not_found("object")))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

pub async fn upload(
    State(state): State<FilesState>,
    Path(uri): Path<String>,
    Query(query): Query<SignatureQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    use annexreg_core::ports::ObjectStorage;
    check_signature(&state.store, "PUT", &uri, &query)?;
    state
        .store
        .put(&uri, &body, "application/octet-stream")
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
