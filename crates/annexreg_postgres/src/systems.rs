//! AI-system CRUD.
//!
//! Updates carry an optional `expected_version` checked against the row
//! revision counter; a mismatch conflicts and the caller re-reads.

use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::{
    AiSystem, AuditAction, DecisionInfluence, DeploymentType, HrUseCaseType,
};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, is_unique_violation, AiSystemRow};

const SYSTEM_COLUMNS: &str = "id, org_id, name, description, hr_use_case_type, \
     intended_purpose, deployment_type, decision_influence, owner_user_id, \
     contact_name, contact_email, revision, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateSystemRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub hr_use_case_type: HrUseCaseType,
    pub intended_purpose: String,
    pub deployment_type: DeploymentType,
    pub decision_influence: DecisionInfluence,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSystemRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hr_use_case_type: Option<HrUseCaseType>,
    #[serde(default)]
    pub intended_purpose: Option<String>,
    #[serde(default)]
    pub deployment_type: Option<DeploymentType>,
    #[serde(default)]
    pub decision_influence: Option<DecisionInfluence>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Optimistic-concurrency guard against the row revision counter.
    #[serde(default)]
    pub expected_version: Option<i32>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(RegistryError::Validation(
            "system name must be 1-255 characters".to_string(),
        ));
    }
    Ok(())
}

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    request: &CreateSystemRequest,
    current: &CurrentUser,
) -> Result<AiSystem> {
    validate_name(&request.name)?;
    if request.intended_purpose.is_empty() {
        return Err(RegistryError::Validation(
            "intended_purpose must not be empty".to_string(),
        ));
    }

    let row: AiSystemRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO ai_systems
            (org_id, name, description, hr_use_case_type, intended_purpose,
             deployment_type, decision_influence, owner_user_id, contact_name, contact_email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {SYSTEM_COLUMNS}
        "#
    ))
    .bind(current.org_id)
    .bind(&request.name)
    .bind(&request.description)
    .bind(request.hr_use_case_type.to_string())
    .bind(&request.intended_purpose)
    .bind(request.deployment_type.to_string())
    .bind(request.decision_influence.to_string())
    .bind(current.user_id)
    .bind(&request.contact_name)
    .bind(&request.contact_email)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_ai_systems_org_name") {
            RegistryError::Conflict(format!(
                "system '{}' already exists in this organization",
                request.name
            ))
        } else {
            db_err(e)
        }
    })?;
    let system = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::AiSystemCreate,
        "ai_system",
        system.id,
        Some(json!({"name": system.name})),
    )
    .await?;

    Ok(system)
}

pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    use_case_filter: Option<HrUseCaseType>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<AiSystem>, i64)> {
    let rows: Vec<AiSystemRow> = sqlx::query_as(&format!(
        r#"
        SELECT {SYSTEM_COLUMNS} FROM ai_systems
        WHERE org_id = $1 AND ($2::text IS NULL OR hr_use_case_type = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(org_id)
    .bind(use_case_filter.map(|u| u.to_string()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM ai_systems
        WHERE org_id = $1 AND ($2::text IS NULL OR hr_use_case_type = $2)
        "#,
    )
    .bind(org_id)
    .bind(use_case_filter.map(|u| u.to_string()))
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    let systems = rows
        .into_iter()
        .map(AiSystemRow::into_domain)
        .collect::<Result<Vec<_>>>()?;
    Ok((systems, total))
}

pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    org_id: Uuid,
) -> Result<AiSystem> {
    let row: Option<AiSystemRow> = sqlx::query_as(&format!(
        r#"SELECT {SYSTEM_COLUMNS} FROM ai_systems WHERE id = $1 AND org_id = $2"#
    ))
    .bind(system_id)
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("AI system"))?
        .into_domain()
}

/// Update with optimistic concurrency: the revision counter increments on
/// every successful write, and `expected_version` mismatches conflict.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    request: &UpdateSystemRequest,
    current: &CurrentUser,
) -> Result<AiSystem> {
    let system = get(tx, system_id, current.org_id).await?;

    if let Some(expected) = request.expected_version {
        if system.revision != expected {
            return Err(RegistryError::Conflict(format!(
                "system was modified by another user: expected version {expected}, current version {}",
                system.revision
            )));
        }
    }
    if let Some(name) = &request.name {
        validate_name(name)?;
    }

    let mut changes = serde_json::Map::new();
    let mut track = |field: &str, old: serde_json::Value, new: serde_json::Value| {
        if old != new {
            changes.insert(field.to_string(), json!({"old": old, "new": new}));
        }
    };

    let name = request.name.clone().unwrap_or_else(|| system.name.clone());
    track("name", json!(system.name), json!(name));
    let description = request
        .description
        .clone()
        .or_else(|| system.description.clone());
    track("description", json!(system.description), json!(description));
    let hr_use_case_type = request.hr_use_case_type.unwrap_or(system.hr_use_case_type);
    track(
        "hr_use_case_type",
        json!(system.hr_use_case_type),
        json!(hr_use_case_type),
    );
    let intended_purpose = request
        .intended_purpose
        .clone()
        .unwrap_or_else(|| system.intended_purpose.clone());
    track(
        "intended_purpose",
        json!(system.intended_purpose),
        json!(intended_purpose),
    );
    let deployment_type = request.deployment_type.unwrap_or(system.deployment_type);
    track(
        "deployment_type",
        json!(system.deployment_type),
        json!(deployment_type),
    );
    let decision_influence = request
        .decision_influence
        .unwrap_or(system.decision_influence);
    track(
        "decision_influence",
        json!(system.decision_influence),
        json!(decision_influence),
    );
    let contact_name = request
        .contact_name
        .clone()
        .or_else(|| system.contact_name.clone());
    track("contact_name", json!(system.contact_name), json!(contact_name));
    let contact_email = request
        .contact_email
        .clone()
        .or_else(|| system.contact_email.clone());
    track(
        "contact_email",
        json!(system.contact_email),
        json!(contact_email),
    );

    let row: AiSystemRow = sqlx::query_as(&format!(
        r#"
        UPDATE ai_systems
        SET name = $3, description = $4, hr_use_case_type = $5, intended_purpose = $6,
            deployment_type = $7, decision_influence = $8, contact_name = $9,
            contact_email = $10, revision = revision + 1, updated_at = now()
        WHERE id = $1 AND org_id = $2
        RETURNING {SYSTEM_COLUMNS}
        "#
    ))
    .bind(system_id)
    .bind(current.org_id)
    .bind(&name)
    .bind(&description)
    .bind(hr_use_case_type.to_string())
    .bind(&intended_purpose)
    .bind(deployment_type.to_string())
    .bind(decision_influence.to_string())
    .bind(&contact_name)
    .bind(&contact_email)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_ai_systems_org_name") {
            RegistryError::Conflict(format!(
                "system '{name}' already exists in this organization"
            ))
        } else {
            db_err(e)
        }
    })?;
    let updated = row.into_domain()?;

    if !changes.is_empty() {
        let ctx = AuditContext::for_user(current.org_id, current.user_id);
        audit::record(
            tx,
            &ctx,
            AuditAction::AiSystemUpdate,
            "ai_system",
            system_id,
            Some(json!(changes)),
        )
        .await?;
    }

    Ok(updated)
}

/// Delete a system; dependent versions, sections, mappings, exports and
/// logs cascade at the database level.
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    current: &CurrentUser,
) -> Result<()> {
    let system = get(tx, system_id, current.org_id).await?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::AiSystemDelete,
        "ai_system",
        system_id,
        Some(json!({"name": system.name})),
    )
    .await?;

    sqlx::query(r#"DELETE FROM ai_systems WHERE id = $1 AND org_id = $2"#)
        .bind(system_id)
        .bind(current.org_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}
