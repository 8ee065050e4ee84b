//! High-risk screening wizard routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use annexreg_core::types::{HighRiskAssessment, UserRole};
use annexreg_core::CurrentUser;
use annexreg_postgres::assessments::{
    self, AssessmentSubmission, ASSESSMENT_DISCLAIMER, WIZARD_QUESTIONS, WIZARD_VERSION,
};

use crate::error::ApiResult;
use crate::state::{commit, AppState};

pub async fn questions() -> Json<Value> {
    Json(json!({
        "version": WIZARD_VERSION,
        "disclaimer": ASSESSMENT_DISCLAIMER,
        "questions": WIZARD_QUESTIONS,
    }))
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
    Json(submission): Json<AssessmentSubmission>,
) -> ApiResult<(StatusCode, Json<HighRiskAssessment>)> {
    current.require_role(UserRole::Editor)?;
    let mut tx = state.begin().await?;
    let assessment = assessments::submit(&mut tx, system_id, &submission, &current).await?;
    commit(tx).await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(system_id): Path<Uuid>,
) -> ApiResult<Json<Vec<HighRiskAssessment>>> {
    let mut tx = state.begin().await?;
    let items = assessments::list(&mut tx, system_id, current.org_id).await?;
    commit(tx).await?;
    Ok(Json(items))
}
