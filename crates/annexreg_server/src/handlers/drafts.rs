//! LLM draft generation with the strict-mode guardrail.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use annexreg_core::draft::{generate_draft, DraftOutcome};
use annexreg_core::sections::SectionKey;
use annexreg_core::types::UserRole;
use annexreg_core::{CurrentUser, RegistryError};
use annexreg_postgres::{evidence, versions};

use crate::error::{ApiResult, AppError};
use crate::state::{commit, AppState};

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub version_id: Uuid,
    pub section_key: String,
    #[serde(default)]
    pub selected_evidence_ids: Vec<Uuid>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub draft_text: String,
    pub cited_evidence_ids: Vec<Uuid>,
    pub warnings: Vec<String>,
    pub strict_mode: bool,
    pub model_info: Option<String>,
}

impl From<DraftOutcome> for DraftResponse {
    fn from(outcome: DraftOutcome) -> Self {
        Self {
            draft_text: outcome.draft_text,
            cited_evidence_ids: outcome.cited_evidence_ids,
            warnings: outcome.warnings,
            strict_mode: outcome.strict_mode,
            model_info: outcome.model_info,
        }
    }
}

pub async fn generate(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<DraftRequest>,
) -> ApiResult<Json<DraftResponse>> {
    current.require_role(UserRole::Editor)?;
    SectionKey::from_str(&request.section_key).map_err(|_| {
        AppError(RegistryError::Validation(format!(
            "unknown section key '{}'",
            request.section_key
        )))
    })?;

    let mut tx = state.begin().await?;
    versions::get_unscoped(&mut tx, request.version_id, current.org_id).await?;

    // Resolve the selected evidence inside the caller's org; a missing id
    // is a 404 rather than a silently smaller evidence set.
    let mut items = Vec::with_capacity(request.selected_evidence_ids.len());
    for evidence_id in &request.selected_evidence_ids {
        items.push(evidence::get(&mut tx, *evidence_id, current.org_id).await?);
    }
    commit(tx).await?;

    let outcome = generate_draft(
        state.llm.as_ref(),
        &request.section_key,
        &items,
        request.instructions.as_deref(),
    )
    .await?;

    Ok(Json(outcome.into()))
}
