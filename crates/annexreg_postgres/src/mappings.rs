//! Evidence-to-version mapping graph.
//!
//! Both endpoints of a mapping must belong to the caller's organization;
//! uniqueness on `(evidence_id, version_id, target_type, target_key)` is
//! enforced by the database and surfaces as a conflict.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::{
    AuditAction, EvidenceItem, EvidenceMapping, MappingStrength, MappingTargetType,
};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::evidence;
use crate::rows::{db_err, is_unique_violation, EvidenceItemRow, EvidenceMappingRow};
use crate::versions;

const MAPPING_COLUMNS: &str =
    "id, evidence_id, version_id, target_type, target_key, strength, notes, created_by, created_at";

#[derive(Debug, Deserialize)]
pub struct CreateMappingRequest {
    pub evidence_id: Uuid,
    pub target_type: MappingTargetType,
    pub target_key: String,
    #[serde(default)]
    pub strength: Option<MappingStrength>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MappingWithEvidence {
    #[serde(flatten)]
    pub mapping: EvidenceMapping,
    pub evidence: EvidenceItem,
}

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
    request: &CreateMappingRequest,
    current: &CurrentUser,
) -> Result<EvidenceMapping> {
    if request.target_key.is_empty() || request.target_key.len() > 100 {
        return Err(RegistryError::Validation(
            "target_key must be 1-100 characters".to_string(),
        ));
    }
    versions::get_unscoped(tx, version_id, current.org_id).await?;
    evidence::get(tx, request.evidence_id, current.org_id).await?;

    let row: EvidenceMappingRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO evidence_mappings
            (evidence_id, version_id, target_type, target_key, strength, notes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {MAPPING_COLUMNS}
        "#
    ))
    .bind(request.evidence_id)
    .bind(version_id)
    .bind(request.target_type.to_string())
    .bind(&request.target_key)
    .bind(request.strength.map(|s| s.to_string()))
    .bind(&request.notes)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_evidence_version_target") {
            RegistryError::Conflict(format!(
                "evidence already mapped to {}:{}",
                request.target_type, request.target_key
            ))
        } else {
            db_err(e)
        }
    })?;
    let mapping = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::MappingCreate,
        "evidence_mapping",
        mapping.id,
        Some(json!({
            "evidence_id": request.evidence_id,
            "version_id": version_id,
            "target_type": request.target_type,
            "target_key": request.target_key,
        })),
    )
    .await?;

    Ok(mapping)
}

/// List mappings for a version, joined with their evidence. `target_key`
/// supports exact match or prefix search with a trailing `*`.
pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
    org_id: Uuid,
    target_type: Option<MappingTargetType>,
    target_key: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<MappingWithEvidence>> {
    versions::get_unscoped(tx, version_id, org_id).await?;

    let (key_exact, key_prefix) = match target_key {
        Some(pattern) => match pattern.strip_suffix('*') {
            Some(prefix) => (None, Some(format!("{prefix}%"))),
            None => (Some(pattern.to_string()), None),
        },
        None => (None, None),
    };

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM evidence_mappings
        WHERE version_id = $1
          AND ($2::text IS NULL OR target_type = $2)
          AND ($3::text IS NULL OR target_key = $3)
          AND ($4::text IS NULL OR target_key LIKE $4)
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(version_id)
    .bind(target_type.map(|t| t.to_string()))
    .bind(key_exact)
    .bind(key_prefix)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    let ids: Vec<Uuid> = rows.into_iter().map(|(id,)| id).collect();

    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(joined) = fetch_with_evidence(tx, id).await? {
            result.push(joined);
        }
    }
    Ok(result)
}

async fn fetch_with_evidence(
    tx: &mut Transaction<'_, Postgres>,
    mapping_id: Uuid,
) -> Result<Option<MappingWithEvidence>> {
    let mapping_row: Option<EvidenceMappingRow> = sqlx::query_as(&format!(
        r#"SELECT {MAPPING_COLUMNS} FROM evidence_mappings WHERE id = $1"#
    ))
    .bind(mapping_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    let Some(mapping_row) = mapping_row else {
        return Ok(None);
    };
    let mapping = mapping_row.into_domain()?;

    let evidence_row: Option<EvidenceItemRow> = sqlx::query_as(
        r#"
        SELECT id, org_id, evidence_type, title, description, tags,
               classification, type_metadata, created_by, created_at, updated_at
        FROM evidence_items WHERE id = $1
        "#,
    )
    .bind(mapping.evidence_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    let Some(evidence_row) = evidence_row else {
        return Ok(None);
    };

    Ok(Some(MappingWithEvidence {
        mapping,
        evidence: evidence_row.into_domain()?,
    }))
}

pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    mapping_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<EvidenceMapping> {
    versions::get_unscoped(tx, version_id, org_id).await?;
    let row: Option<EvidenceMappingRow> = sqlx::query_as(&format!(
        r#"
        SELECT {MAPPING_COLUMNS} FROM evidence_mappings
        WHERE id = $1 AND version_id = $2
        "#
    ))
    .bind(mapping_id)
    .bind(version_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("mapping"))?
        .into_domain()
}

pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    mapping_id: Uuid,
    version_id: Uuid,
    current: &CurrentUser,
) -> Result<()> {
    let mapping = get(tx, mapping_id, version_id, current.org_id).await?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::MappingDelete,
        "evidence_mapping",
        mapping.id,
        Some(json!({
            "evidence_id": mapping.evidence_id,
            "version_id": mapping.version_id,
            "target_type": mapping.target_type,
            "target_key": mapping.target_key,
        })),
    )
    .await?;

    sqlx::query(r#"DELETE FROM evidence_mappings WHERE id = $1"#)
        .bind(mapping_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// All mappings for a version — export pipeline input.
pub async fn list_for_export(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
) -> Result<Vec<EvidenceMapping>> {
    let rows: Vec<EvidenceMappingRow> = sqlx::query_as(&format!(
        r#"SELECT {MAPPING_COLUMNS} FROM evidence_mappings WHERE version_id = $1"#
    ))
    .bind(version_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    rows.into_iter()
        .map(EvidenceMappingRow::into_domain)
        .collect()
}

#[cfg(test)]
mod tests {
    #[test]
    fn prefix_pattern_translates_to_like() {
        let pattern = "ANNEX4*";
        let like = pattern.strip_suffix('*').map(|p| format!("{p}%"));
        assert_eq!(like.as_deref(), Some("ANNEX4%"));
        assert_eq!("ANNEX4.GENERAL".strip_suffix('*'), None);
    }
}
