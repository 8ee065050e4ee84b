//! System version lifecycle: create, update, status transitions, clone,
//! delete, diff.
//!
//! Immutability rule: once a version is approved and has at least one
//! export, the version and its sections refuse every mutation with a
//! conflict.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::diff::{version_diff, VersionDiff};
use annexreg_core::lifecycle::{is_valid_transition, required_role, validate_label};
use annexreg_core::types::{AuditAction, SystemVersion, VersionStatus};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, is_unique_violation, SystemVersionRow};
use crate::systems;

const VERSION_COLUMNS: &str = "id, ai_system_id, label, status, notes, release_date, \
     approved_by, approved_at, created_by, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    pub label: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVersionRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub release_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: VersionStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloneVersionRequest {
    pub label: String,
}

/// Fetch a version scoped through its system and organization.
pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<SystemVersion> {
    systems::get(tx, system_id, org_id).await?;
    let row: Option<SystemVersionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {VERSION_COLUMNS} FROM system_versions
        WHERE id = $1 AND ai_system_id = $2
        "#
    ))
    .bind(version_id)
    .bind(system_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("version"))?
        .into_domain()
}

/// Fetch a version by id with only the org scope (no system id in the
/// path — used by export download and log-key revocation).
pub async fn get_unscoped(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<SystemVersion> {
    let row: Option<SystemVersionRow> = sqlx::query_as(&format!(
        r#"
        SELECT v.{} FROM system_versions v
        JOIN ai_systems s ON v.ai_system_id = s.id
        WHERE v.id = $1 AND s.org_id = $2
        "#,
        VERSION_COLUMNS.replace(", ", ", v.")
    ))
    .bind(version_id)
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("version"))?
        .into_domain()
}

pub async fn export_count(tx: &mut Transaction<'_, Postgres>, version_id: Uuid) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM exports WHERE version_id = $1"#)
            .bind(version_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
    Ok(count)
}

/// A version is immutable once approved with at least one export.
pub async fn is_immutable(
    tx: &mut Transaction<'_, Postgres>,
    version: &SystemVersion,
) -> Result<bool> {
    if version.status != VersionStatus::Approved {
        return Ok(false);
    }
    Ok(export_count(tx, version.id).await? > 0)
}

pub(crate) async fn ensure_mutable(
    tx: &mut Transaction<'_, Postgres>,
    version: &SystemVersion,
) -> Result<()> {
    if is_immutable(tx, version).await? {
        Err(RegistryError::Conflict(
            "version is approved and has exports (immutable)".to_string(),
        ))
    } else {
        Ok(())
    }
}

async fn check_duplicate_label(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    label: &str,
) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM system_versions WHERE ai_system_id = $1 AND label = $2"#,
    )
    .bind(system_id)
    .bind(label)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    if count > 0 {
        Err(RegistryError::Conflict(format!(
            "version with label '{label}' already exists for this AI system"
        )))
    } else {
        Ok(())
    }
}

async fn insert_version(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    label: &str,
    notes: Option<&str>,
    created_by: Uuid,
) -> Result<SystemVersion> {
    let row: SystemVersionRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO system_versions (ai_system_id, label, status, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {VERSION_COLUMNS}
        "#
    ))
    .bind(system_id)
    .bind(label)
    .bind(VersionStatus::Draft.to_string())
    .bind(notes)
    .bind(created_by)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        // The unique index backstops the explicit duplicate check under
        // concurrent creates.
        if is_unique_violation(&e, "uq_system_versions_system_label") {
            RegistryError::Conflict(format!(
                "version with label '{label}' already exists for this AI system"
            ))
        } else {
            db_err(e)
        }
    })?;
    row.into_domain()
}

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    request: &CreateVersionRequest,
    current: &CurrentUser,
) -> Result<SystemVersion> {
    systems::get(tx, system_id, current.org_id).await?;
    validate_label(&request.label)?;
    check_duplicate_label(tx, system_id, &request.label).await?;

    let version =
        insert_version(tx, system_id, &request.label, request.notes.as_deref(), current.user_id)
            .await?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::VersionCreate,
        "system_version",
        version.id,
        Some(json!({
            "ai_system_id": system_id,
            "label": version.label,
            "status": version.status,
        })),
    )
    .await?;

    Ok(version)
}

pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    org_id: Uuid,
    status_filter: Option<VersionStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<SystemVersion>, i64)> {
    systems::get(tx, system_id, org_id).await?;

    let rows: Vec<SystemVersionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {VERSION_COLUMNS} FROM system_versions
        WHERE ai_system_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(system_id)
    .bind(status_filter.map(|s| s.to_string()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM system_versions
        WHERE ai_system_id = $1 AND ($2::text IS NULL OR status = $2)
        "#,
    )
    .bind(system_id)
    .bind(status_filter.map(|s| s.to_string()))
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    let versions = rows
        .into_iter()
        .map(SystemVersionRow::into_domain)
        .collect::<Result<Vec<_>>>()?;
    Ok((versions, total))
}

/// Status transition with workflow validation and role gates. Approval
/// stamps `approved_by`/`approved_at` atomically with the status write.
pub async fn change_status(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    request: &StatusChangeRequest,
    current: &CurrentUser,
) -> Result<SystemVersion> {
    let version = get(tx, system_id, version_id, current.org_id).await?;

    if !is_valid_transition(version.status, request.status) {
        return Err(RegistryError::Conflict(format!(
            "invalid status transition from {} to {}",
            version.status, request.status
        )));
    }
    current.require_role(required_role(request.status))?;

    let approving = request.status == VersionStatus::Approved;
    let row: SystemVersionRow = sqlx::query_as(&format!(
        r#"
        UPDATE system_versions
        SET status = $2,
            approved_by = CASE WHEN $3 THEN $4 ELSE approved_by END,
            approved_at = CASE WHEN $3 THEN $5 ELSE approved_at END,
            updated_at = now()
        WHERE id = $1
        RETURNING {VERSION_COLUMNS}
        "#
    ))
    .bind(version_id)
    .bind(request.status.to_string())
    .bind(approving)
    .bind(current.user_id)
    .bind(Utc::now().date_naive())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let updated = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::VersionStatusChange,
        "system_version",
        version_id,
        Some(json!({
            "from_status": version.status,
            "to_status": request.status,
            "comment": request.comment,
        })),
    )
    .await?;

    Ok(updated)
}

/// Only `notes` and `release_date` are mutable; both past and future
/// release dates are accepted.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    request: &UpdateVersionRequest,
    current: &CurrentUser,
) -> Result<SystemVersion> {
    let version = get(tx, system_id, version_id, current.org_id).await?;
    ensure_mutable(tx, &version).await?;

    let mut changes = serde_json::Map::new();
    if let Some(notes) = &request.notes {
        if version.notes.as_deref() != Some(notes) {
            changes.insert(
                "notes".into(),
                json!({"from": version.notes, "to": notes}),
            );
        }
    }
    if let Some(release_date) = request.release_date {
        if version.release_date != Some(release_date) {
            changes.insert(
                "release_date".into(),
                json!({"from": version.release_date, "to": release_date}),
            );
        }
    }

    if changes.is_empty() {
        return Ok(version);
    }

    let row: SystemVersionRow = sqlx::query_as(&format!(
        r#"
        UPDATE system_versions
        SET notes = COALESCE($2, notes),
            release_date = COALESCE($3, release_date),
            updated_at = now()
        WHERE id = $1
        RETURNING {VERSION_COLUMNS}
        "#
    ))
    .bind(version_id)
    .bind(&request.notes)
    .bind(request.release_date)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let updated = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::VersionUpdate,
        "system_version",
        version_id,
        Some(json!(changes)),
    )
    .await?;

    Ok(updated)
}

/// Clone into a new draft under the same system. Copies notes only;
/// approval metadata and release date are reset, and sections/mappings
/// are not carried over.
pub async fn clone(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    request: &CloneVersionRequest,
    current: &CurrentUser,
) -> Result<SystemVersion> {
    let source = get(tx, system_id, version_id, current.org_id).await?;
    validate_label(&request.label)?;
    check_duplicate_label(tx, system_id, &request.label).await?;

    let cloned =
        insert_version(tx, system_id, &request.label, source.notes.as_deref(), current.user_id)
            .await?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::VersionCreate,
        "system_version",
        cloned.id,
        Some(json!({
            "ai_system_id": system_id,
            "label": cloned.label,
            "status": cloned.status,
            "cloned_from": version_id,
        })),
    )
    .await?;

    Ok(cloned)
}

/// Admin-only delete; dependent sections, mappings, exports, decision
/// logs and API keys cascade.
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    current: &CurrentUser,
) -> Result<()> {
    current.require_admin()?;
    let version = get(tx, system_id, version_id, current.org_id).await?;
    ensure_mutable(tx, &version).await?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::VersionDelete,
        "system_version",
        version_id,
        Some(json!({
            "ai_system_id": system_id,
            "label": version.label,
            "status": version.status,
        })),
    )
    .await?;

    sqlx::query(r#"DELETE FROM system_versions WHERE id = $1"#)
        .bind(version_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Field diff between two versions of the same AI system; cross-system
/// comparisons are a bad request.
pub async fn compare(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    from_version_id: Uuid,
    to_version_id: Uuid,
    org_id: Uuid,
) -> Result<(SystemVersion, SystemVersion, VersionDiff)> {
    systems::get(tx, system_id, org_id).await?;
    let from = get_unscoped(tx, from_version_id, org_id).await?;
    let to = get_unscoped(tx, to_version_id, org_id).await?;
    if from.ai_system_id != system_id || to.ai_system_id != system_id {
        return Err(RegistryError::Validation(
            "versions must belong to the same AI system".to_string(),
        ));
    }
    let diff = version_diff(&from, &to);
    Ok((from, to, diff))
}
