//! Annex IV section store with lazy materialization.
//!
//! The first read of any section creates all twelve rows for the version
//! with empty content and zero score. `ON CONFLICT DO NOTHING` tolerates
//! concurrent first-reads.

use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::scoring::{completeness_report, section_score, CompletenessReport};
use annexreg_core::sections::SectionKey;
use annexreg_core::types::{AnnexSection, AuditAction};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, AnnexSectionRow};
use crate::versions;

const SECTION_COLUMNS: &str = "id, version_id, section_key, content, evidence_refs, \
     completeness_score, llm_assisted, last_edited_by, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct UpdateSectionRequest {
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub evidence_refs: Option<Vec<Uuid>>,
    #[serde(default)]
    pub llm_assisted: Option<bool>,
}

async fn materialize(tx: &mut Transaction<'_, Postgres>, version_id: Uuid) -> Result<()> {
    for key in SectionKey::all() {
        sqlx::query(
            r#"
            INSERT INTO annex_sections (version_id, section_key, content, evidence_refs)
            VALUES ($1, $2, '{}'::jsonb, '{}')
            ON CONFLICT (version_id, section_key) DO NOTHING
            "#,
        )
        .bind(version_id)
        .bind(key.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

/// All twelve sections for a version, creating them on first read.
pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<Vec<AnnexSection>> {
    versions::get(tx, system_id, version_id, org_id).await?;
    materialize(tx, version_id).await?;

    let rows: Vec<AnnexSectionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {SECTION_COLUMNS} FROM annex_sections
        WHERE version_id = $1
        ORDER BY section_key
        "#
    ))
    .bind(version_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    rows.into_iter().map(AnnexSectionRow::into_domain).collect()
}

/// Single section by key, lazily creating the version's rows.
pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    section_key: SectionKey,
    org_id: Uuid,
) -> Result<AnnexSection> {
    versions::get(tx, system_id, version_id, org_id).await?;
    materialize(tx, version_id).await?;

    let row: Option<AnnexSectionRow> = sqlx::query_as(&format!(
        r#"
        SELECT {SECTION_COLUMNS} FROM annex_sections
        WHERE version_id = $1 AND section_key = $2
        "#
    ))
    .bind(version_id)
    .bind(section_key.to_string())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("section"))?
        .into_domain()
}

/// Update content and/or evidence refs; recomputes the cached score and
/// records a before/after diff. Immutable versions refuse the edit.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    section_key: SectionKey,
    request: &UpdateSectionRequest,
    current: &CurrentUser,
) -> Result<AnnexSection> {
    let version = versions::get(tx, system_id, version_id, current.org_id).await?;
    versions::ensure_mutable(tx, &version).await?;

    let section = get(tx, system_id, version_id, section_key, current.org_id).await?;

    if let Some(content) = &request.content {
        if !content.is_object() {
            return Err(RegistryError::Validation(
                "section content must be a JSON object".to_string(),
            ));
        }
    }

    let new_content = request.content.clone().unwrap_or_else(|| section.content.clone());
    let new_refs = request
        .evidence_refs
        .clone()
        .unwrap_or_else(|| section.evidence_refs.clone());
    let new_llm_assisted = request.llm_assisted.unwrap_or(section.llm_assisted);
    let new_score = section_score(section_key, &new_content, new_refs.len());

    let mut changes = serde_json::Map::new();
    if request.content.is_some() && new_content != section.content {
        changes.insert(
            "content".into(),
            json!({"old": section.content, "new": new_content}),
        );
    }
    if request.evidence_refs.is_some() && new_refs != section.evidence_refs {
        changes.insert(
            "evidence_refs".into(),
            json!({"old": section.evidence_refs, "new": new_refs}),
        );
    }

    let row: AnnexSectionRow = sqlx::query_as(&format!(
        r#"
        UPDATE annex_sections
        SET content = $3, evidence_refs = $4, completeness_score = $5,
            llm_assisted = $6, last_edited_by = $7, updated_at = now()
        WHERE version_id = $1 AND section_key = $2
        RETURNING {SECTION_COLUMNS}
        "#
    ))
    .bind(version_id)
    .bind(section_key.to_string())
    .bind(&new_content)
    .bind(&new_refs)
    .bind(new_score)
    .bind(new_llm_assisted)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let updated = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::SectionUpdate,
        "annex_section",
        updated.id,
        Some(json!({
            "section_key": section_key,
            "version_id": version_id,
            "changes": changes,
        })),
    )
    .await?;

    Ok(updated)
}

/// Materialized completeness report for a version.
pub async fn completeness(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<CompletenessReport> {
    let sections = list(tx, system_id, version_id, org_id).await?;
    let inputs: Vec<(SectionKey, Value, usize)> = sections
        .into_iter()
        .map(|s| (s.section_key, s.content, s.evidence_refs.len()))
        .collect();
    Ok(completeness_report(version_id, &inputs))
}

/// Section state used by the export pipeline: key → (content, refs).
pub async fn snapshot_for_export(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<Vec<(SectionKey, Value, Vec<Uuid>)>> {
    let sections = list(tx, system_id, version_id, org_id).await?;
    Ok(sections
        .into_iter()
        .map(|s| (s.section_key, s.content, s.evidence_refs))
        .collect())
}
