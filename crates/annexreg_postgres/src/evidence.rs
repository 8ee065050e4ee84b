//! Evidence item service: typed metadata validation, advisory duplicate
//! detection, filtered listing with full-text search, guarded updates and
//! force-delete cascade.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use annexreg_core::evidence_meta::{
    changed_immutable_upload_field, validate_metadata, validate_tags, validate_title,
};
use annexreg_core::ports::ObjectStorage;
use annexreg_core::types::{AuditAction, Classification, EvidenceItem, EvidenceType};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, EvidenceItemRow};

const EVIDENCE_COLUMNS: &str = "id, org_id, evidence_type, title, description, tags, \
     classification, type_metadata, created_by, created_at, updated_at";

pub const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateEvidenceRequest {
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_classification")]
    pub classification: Classification,
    pub type_metadata: Value,
}

fn default_classification() -> Classification {
    Classification::Internal
}

/// Distinguishes "field absent" (keep) from "field null" (reject for
/// non-nullable fields) in PATCH bodies.
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Partial update; explicit nulls for non-nullable fields are rejected at
/// the service layer, so every field is double-optional.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEvidenceRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tags: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub classification: Option<Option<Classification>>,
    #[serde(default, deserialize_with = "double_option")]
    pub type_metadata: Option<Option<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceFilter {
    #[serde(rename = "type", default)]
    pub evidence_type: Option<EvidenceType>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub orphaned: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceWithUsage {
    #[serde(flatten)]
    pub item: EvidenceItem,
    pub usage_count: i64,
}

/// Create an evidence item. For uploads, an advisory duplicate probe by
/// checksum fills `duplicate_of` without blocking the create.
pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    request: &CreateEvidenceRequest,
    current: &CurrentUser,
) -> Result<(EvidenceItem, Option<Uuid>)> {
    validate_title(&request.title)?;
    validate_tags(&request.tags)?;
    let metadata = validate_metadata(request.evidence_type, &request.type_metadata, current.org_id)?;
    let stored_metadata = metadata.to_value();

    let duplicate_of = if request.evidence_type == EvidenceType::Upload {
        let checksum = stored_metadata
            .get("checksum_sha256")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM evidence_items
            WHERE org_id = $1
              AND evidence_type = 'upload'
              AND type_metadata ->> 'checksum_sha256' = $2
            LIMIT 1
            "#,
        )
        .bind(current.org_id)
        .bind(&checksum)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        row.map(|(id,)| id)
    } else {
        None
    };

    let row: EvidenceItemRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO evidence_items
            (org_id, evidence_type, title, description, tags, classification, type_metadata, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {EVIDENCE_COLUMNS}
        "#
    ))
    .bind(current.org_id)
    .bind(request.evidence_type.to_string())
    .bind(&request.title)
    .bind(&request.description)
    .bind(&request.tags)
    .bind(request.classification.to_string())
    .bind(&stored_metadata)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let item = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::EvidenceCreate,
        "evidence_item",
        item.id,
        Some(json!({
            "type": item.evidence_type,
            "title": item.title,
            "classification": item.classification,
            "duplicate_of": duplicate_of,
        })),
    )
    .await?;

    Ok((item, duplicate_of))
}

pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: Uuid,
    org_id: Uuid,
) -> Result<EvidenceItem> {
    let row: Option<EvidenceItemRow> = sqlx::query_as(&format!(
        r#"SELECT {EVIDENCE_COLUMNS} FROM evidence_items WHERE id = $1 AND org_id = $2"#
    ))
    .bind(evidence_id)
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("evidence"))?
        .into_domain()
}

pub async fn mapping_count(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: Uuid,
) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM evidence_mappings WHERE evidence_id = $1"#)
            .bind(evidence_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;
    Ok(count)
}

#[derive(Debug, Serialize)]
pub struct MappedVersionSummary {
    pub id: Uuid,
    pub label: String,
    pub system_id: Uuid,
    pub system_name: String,
}

/// Detail view: the item plus its usage count and the versions it maps to.
pub async fn get_with_details(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: Uuid,
    org_id: Uuid,
) -> Result<(EvidenceItem, i64, Vec<MappedVersionSummary>)> {
    let item = get(tx, evidence_id, org_id).await?;
    let usage = mapping_count(tx, evidence_id).await?;

    let rows: Vec<(Uuid, String, Uuid, String)> = sqlx::query_as(
        r#"
        SELECT DISTINCT v.id, v.label, s.id AS system_id, s.name AS system_name
        FROM evidence_mappings m
        JOIN system_versions v ON m.version_id = v.id
        JOIN ai_systems s ON v.ai_system_id = s.id
        WHERE m.evidence_id = $1
        ORDER BY s.name, v.label
        "#,
    )
    .bind(evidence_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let mapped = rows
        .into_iter()
        .map(|(id, label, system_id, system_name)| MappedVersionSummary {
            id,
            label,
            system_id,
            system_name,
        })
        .collect();
    Ok((item, usage, mapped))
}

/// Filtered, paginated listing. Tags use AND semantics; `orphaned=true`
/// keeps items with no mappings, `false` keeps mapped items; full-text
/// search runs over title and description.
pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    filter: &EvidenceFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<EvidenceWithUsage>, i64)> {
    validate_tags(&filter.tags)?;
    let limit = limit.clamp(1, MAX_LIST_LIMIT);

    let where_clause = r#"
        org_id = $1
        AND ($2::text IS NULL OR evidence_type = $2)
        AND ($3::text IS NULL OR classification = $3)
        AND (cardinality($4::text[]) = 0 OR tags @> $4::text[])
        AND ($5::text IS NULL OR
             to_tsvector('english', title || ' ' || COALESCE(description, ''))
             @@ plainto_tsquery('english', $5))
        AND ($6::boolean IS NULL OR
             ($6 AND NOT EXISTS (SELECT 1 FROM evidence_mappings m WHERE m.evidence_id = evidence_items.id)) OR
             (NOT $6 AND EXISTS (SELECT 1 FROM evidence_mappings m WHERE m.evidence_id = evidence_items.id)))
    "#;

    let rows: Vec<EvidenceItemRow> = sqlx::query_as(&format!(
        r#"
        SELECT {EVIDENCE_COLUMNS} FROM evidence_items
        WHERE {where_clause}
        ORDER BY created_at DESC
        LIMIT $7 OFFSET $8
        "#
    ))
    .bind(org_id)
    .bind(filter.evidence_type.map(|t| t.to_string()))
    .bind(filter.classification.map(|c| c.to_string()))
    .bind(&filter.tags)
    .bind(&filter.search)
    .bind(filter.orphaned)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let (total,): (i64,) = sqlx::query_as(&format!(
        r#"SELECT COUNT(*) FROM evidence_items WHERE {where_clause}"#
    ))
    .bind(org_id)
    .bind(filter.evidence_type.map(|t| t.to_string()))
    .bind(filter.classification.map(|c| c.to_string()))
    .bind(&filter.tags)
    .bind(&filter.search)
    .bind(filter.orphaned)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    let items = rows
        .into_iter()
        .map(EvidenceItemRow::into_domain)
        .collect::<Result<Vec<EvidenceItem>>>()?;

    // One grouped query for usage counts instead of a count per item.
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let usage_rows: Vec<(Uuid, i64)> = sqlx::query_as(
        r#"
        SELECT evidence_id, COUNT(*) FROM evidence_mappings
        WHERE evidence_id = ANY($1)
        GROUP BY evidence_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    let usage: HashMap<Uuid, i64> = usage_rows.into_iter().collect();

    let with_usage = items
        .into_iter()
        .map(|item| {
            let usage_count = usage.get(&item.id).copied().unwrap_or(0);
            EvidenceWithUsage { item, usage_count }
        })
        .collect();
    Ok((with_usage, total))
}

/// Update an evidence item. `type` is immutable; upload storage fields
/// are frozen; nullifying title/tags/classification/type_metadata is
/// rejected.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: Uuid,
    request: &UpdateEvidenceRequest,
    current: &CurrentUser,
) -> Result<EvidenceItem> {
    let item = get(tx, evidence_id, current.org_id).await?;

    for (field, is_null) in [
        ("title", matches!(request.title, Some(None))),
        ("tags", matches!(request.tags, Some(None))),
        ("classification", matches!(request.classification, Some(None))),
        ("type_metadata", matches!(request.type_metadata, Some(None))),
    ] {
        if is_null {
            return Err(RegistryError::Validation(format!("{field} cannot be null")));
        }
    }

    let new_title = match &request.title {
        Some(Some(title)) => {
            validate_title(title)?;
            title.clone()
        }
        _ => item.title.clone(),
    };
    let new_description = match &request.description {
        Some(value) => value.clone(),
        None => item.description.clone(),
    };
    let new_tags = match &request.tags {
        Some(Some(tags)) => {
            validate_tags(tags)?;
            tags.clone()
        }
        _ => item.tags.clone(),
    };
    let new_classification = match &request.classification {
        Some(Some(c)) => *c,
        _ => item.classification,
    };
    let new_metadata = match &request.type_metadata {
        Some(Some(incoming)) => {
            if item.evidence_type == EvidenceType::Upload {
                if let Some(field) = changed_immutable_upload_field(&item.type_metadata, incoming)
                {
                    return Err(RegistryError::Validation(format!(
                        "{field} cannot be changed"
                    )));
                }
            }
            validate_metadata(item.evidence_type, incoming, current.org_id)?.to_value()
        }
        _ => item.type_metadata.clone(),
    };

    let row: EvidenceItemRow = sqlx::query_as(&format!(
        r#"
        UPDATE evidence_items
        SET title = $3, description = $4, tags = $5, classification = $6,
            type_metadata = $7, updated_at = now()
        WHERE id = $1 AND org_id = $2
        RETURNING {EVIDENCE_COLUMNS}
        "#
    ))
    .bind(evidence_id)
    .bind(current.org_id)
    .bind(&new_title)
    .bind(&new_description)
    .bind(&new_tags)
    .bind(new_classification.to_string())
    .bind(&new_metadata)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let updated = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::EvidenceUpdate,
        "evidence_item",
        evidence_id,
        Some(json!({
            "title": new_title,
            "classification": new_classification,
        })),
    )
    .await?;

    Ok(updated)
}

/// Delete an evidence item.
///
/// With mappings and `force=false` the call conflicts, reporting the
/// mapping count. With `force=true` the mappings are removed first (and
/// audited with a force_delete_evidence reason). Upload objects are
/// deleted from storage best-effort — a storage failure is logged, never
/// propagated.
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: Uuid,
    force: bool,
    storage: &dyn ObjectStorage,
    current: &CurrentUser,
) -> Result<()> {
    let item = get(tx, evidence_id, current.org_id).await?;
    let mappings = mapping_count(tx, evidence_id).await?;

    if mappings > 0 && !force {
        return Err(RegistryError::Conflict(format!(
            "cannot delete evidence with {mappings} existing mapping(s); use force=true to delete mappings and evidence"
        )));
    }

    let ctx = AuditContext::for_user(current.org_id, current.user_id);

    if force && mappings > 0 {
        sqlx::query(r#"DELETE FROM evidence_mappings WHERE evidence_id = $1"#)
            .bind(evidence_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        audit::record(
            tx,
            &ctx,
            AuditAction::MappingDelete,
            "evidence_mapping",
            evidence_id,
            Some(json!({
                "reason": "force_delete_evidence",
                "mappings_deleted": mappings,
            })),
        )
        .await?;
    }

    if item.evidence_type == EvidenceType::Upload {
        if let Some(uri) = item.type_metadata.get("storage_uri").and_then(Value::as_str) {
            if let Err(e) = storage.delete(uri).await {
                warn!(storage_uri = uri, error = %e, "storage delete failed during evidence removal");
            }
        }
    }

    audit::record(
        tx,
        &ctx,
        AuditAction::EvidenceDelete,
        "evidence_item",
        evidence_id,
        Some(json!({
            "type": item.evidence_type,
            "title": item.title,
            "force": force,
        })),
    )
    .await?;

    sqlx::query(r#"DELETE FROM evidence_items WHERE id = $1 AND org_id = $2"#)
        .bind(evidence_id)
        .bind(current.org_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}
