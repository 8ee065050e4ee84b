//! Export pipeline: load version state, build the canonical manifest and
//! deterministic package, upload, insert the Export row.
//!
//! The row insert is what makes an approved version immutable, so it
//! happens in the same transaction as everything else in the request.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::docx::{generate_annex_docx, DocxInputs};
use annexreg_core::manifest::{
    build_manifest_core, finalize_manifest, ManifestInputs, ManifestMapping,
};
use annexreg_core::package::{
    build_zip, diff_report, evidence_index_csv, evidence_index_json, PackageEntry,
    ENTRY_ANNEX_DOCX, ENTRY_COMPLETENESS, ENTRY_DIFF, ENTRY_EVIDENCE_CSV, ENTRY_EVIDENCE_JSON,
    ENTRY_MANIFEST,
};
use annexreg_core::ports::ObjectStorage;
use annexreg_core::types::{AuditAction, EvidenceItem, Export, ExportType};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, EvidenceItemRow, ExportRow};
use crate::{assessments, mappings, organizations, sections, systems, versions};

const EXPORT_COLUMNS: &str = "id, version_id, export_type, snapshot_hash, storage_uri, \
     file_size, include_diff, compare_version_id, completeness_score, created_by, created_at";

pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Default, Deserialize)]
pub struct GenerateExportRequest {
    #[serde(default)]
    pub include_diff: bool,
    #[serde(default)]
    pub compare_version_id: Option<Uuid>,
}

pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Export>, i64)> {
    versions::get(tx, system_id, version_id, org_id).await?;

    let rows: Vec<ExportRow> = sqlx::query_as(&format!(
        r#"
        SELECT {EXPORT_COLUMNS} FROM exports
        WHERE version_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(version_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let (total,): (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM exports WHERE version_id = $1"#)
            .bind(version_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?;

    let exports = rows
        .into_iter()
        .map(ExportRow::into_domain)
        .collect::<Result<Vec<_>>>()?;
    Ok((exports, total))
}

pub async fn get_unscoped(
    tx: &mut Transaction<'_, Postgres>,
    export_id: Uuid,
    org_id: Uuid,
) -> Result<Export> {
    let row: Option<ExportRow> = sqlx::query_as(
        r#"
        SELECT e.id, e.version_id, e.export_type, e.snapshot_hash, e.storage_uri,
               e.file_size, e.include_diff, e.compare_version_id, e.completeness_score,
               e.created_by, e.created_at
        FROM exports e
        JOIN system_versions v ON e.version_id = v.id
        JOIN ai_systems s ON v.ai_system_id = s.id
        WHERE e.id = $1 AND s.org_id = $2
        "#,
    )
    .bind(export_id)
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("export"))?
        .into_domain()
}

/// Presigned download URL for an export package (1 hour default).
pub async fn download_url(
    tx: &mut Transaction<'_, Postgres>,
    export_id: Uuid,
    org_id: Uuid,
    storage: &dyn ObjectStorage,
) -> Result<String> {
    let export = get_unscoped(tx, export_id, org_id).await?;
    storage
        .presign_download(&export.storage_uri, DOWNLOAD_URL_TTL)
        .await
}

/// Evidence reachable from a version through its mappings, deduplicated.
async fn mapped_evidence(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
) -> Result<Vec<EvidenceItem>> {
    let rows: Vec<EvidenceItemRow> = sqlx::query_as(
        r#"
        SELECT DISTINCT e.id, e.org_id, e.evidence_type, e.title, e.description, e.tags,
               e.classification, e.type_metadata, e.created_by, e.created_at, e.updated_at
        FROM evidence_items e
        JOIN evidence_mappings m ON m.evidence_id = e.id
        WHERE m.version_id = $1
        "#,
    )
    .bind(version_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    rows.into_iter().map(EvidenceItemRow::into_domain).collect()
}

async fn sections_content_map(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
) -> Result<BTreeMap<String, Value>> {
    let rows: Vec<(String, Value)> = sqlx::query_as(
        r#"SELECT section_key, content FROM annex_sections WHERE version_id = $1"#,
    )
    .bind(version_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().collect())
}

async fn evidence_id_set(
    tx: &mut Transaction<'_, Postgres>,
    version_id: Uuid,
) -> Result<BTreeSet<String>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"SELECT DISTINCT evidence_id FROM evidence_mappings WHERE version_id = $1"#,
    )
    .bind(version_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(id,)| id.to_string()).collect())
}

/// Build the canonical manifest for a version without creating an export.
pub async fn manifest(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<(Value, String)> {
    let inputs = load_manifest_inputs(tx, system_id, version_id, org_id).await?;
    let core = build_manifest_core(&inputs);
    Ok(finalize_manifest(core, Utc::now()))
}

async fn load_manifest_inputs(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
) -> Result<ManifestInputs> {
    let system = systems::get(tx, system_id, org_id).await?;
    let version = versions::get(tx, system_id, version_id, org_id).await?;
    let org = organizations::get(tx, org_id).await?;
    let section_state = sections::snapshot_for_export(tx, system_id, version_id, org_id).await?;
    let evidence = mapped_evidence(tx, version_id).await?;
    let mapping_rows = mappings::list_for_export(tx, version_id).await?;
    let assessment = assessments::latest_for_manifest(tx, system_id).await?;

    Ok(ManifestInputs {
        org_id,
        org_name: org.name,
        system,
        version,
        assessment,
        sections: section_state,
        evidence,
        mappings: mapping_rows
            .into_iter()
            .map(|m| ManifestMapping {
                evidence_id: m.evidence_id,
                target_type: m.target_type,
                target_key: m.target_key,
                strength: m.strength,
            })
            .collect(),
    })
}

/// Generate a full export package and persist the Export row.
pub async fn generate(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    request: &GenerateExportRequest,
    storage: &dyn ObjectStorage,
    current: &CurrentUser,
) -> Result<Export> {
    if request.include_diff && request.compare_version_id.is_none() {
        return Err(RegistryError::Validation(
            "compare_version_id is required when include_diff is true".to_string(),
        ));
    }

    let inputs = load_manifest_inputs(tx, system_id, version_id, current.org_id).await?;
    let completeness = sections::completeness(tx, system_id, version_id, current.org_id).await?;

    let manifest_core = build_manifest_core(&inputs);
    let (manifest, snapshot_hash) = finalize_manifest(manifest_core, Utc::now());

    let evidence_by_id: HashMap<Uuid, &EvidenceItem> =
        inputs.evidence.iter().map(|e| (e.id, e)).collect();
    let docx = generate_annex_docx(&DocxInputs {
        org_name: &inputs.org_name,
        system_name: &inputs.system.name,
        hr_use_case_type: inputs.system.hr_use_case_type.to_string(),
        version_label: &inputs.version.label,
        version_status: inputs.version.status.to_string(),
        sections: inputs.sections.clone(),
        evidence: evidence_by_id.values().copied().collect(),
    })?;

    let mut entries = vec![
        PackageEntry::new(ENTRY_ANNEX_DOCX, docx),
        PackageEntry::canonical_json(ENTRY_MANIFEST, &manifest),
        PackageEntry::canonical_json(
            ENTRY_EVIDENCE_JSON,
            &evidence_index_json(&inputs.evidence),
        ),
        PackageEntry::new(ENTRY_EVIDENCE_CSV, evidence_index_csv(&inputs.evidence)?),
        PackageEntry::canonical_json(ENTRY_COMPLETENESS, &completeness.to_export_json()),
    ];

    if let Some(compare_version_id) = request.compare_version_id.filter(|_| request.include_diff) {
        // Compare target must live in the caller's org too.
        versions::get_unscoped(tx, compare_version_id, current.org_id).await?;
        let report = diff_report(
            version_id,
            compare_version_id,
            &sections_content_map(tx, version_id).await?,
            &sections_content_map(tx, compare_version_id).await?,
            &evidence_id_set(tx, version_id).await?,
            &evidence_id_set(tx, compare_version_id).await?,
        );
        entries.push(PackageEntry::canonical_json(ENTRY_DIFF, &report));
    }

    let package = build_zip(entries)?;
    let file_size = package.len() as i64;

    let export_id = Uuid::new_v4();
    let storage_uri = format!(
        "exports/{}/{}/{}/{}.zip",
        current.org_id, system_id, version_id, export_id
    );
    storage
        .put(&storage_uri, &package, "application/zip")
        .await?;

    let export_type = if request.include_diff {
        ExportType::Diff
    } else {
        ExportType::Full
    };
    let row: ExportRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO exports
            (id, version_id, export_type, snapshot_hash, storage_uri, file_size,
             include_diff, compare_version_id, completeness_score, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {EXPORT_COLUMNS}
        "#
    ))
    .bind(export_id)
    .bind(version_id)
    .bind(export_type.to_string())
    .bind(&snapshot_hash)
    .bind(&storage_uri)
    .bind(file_size)
    .bind(request.include_diff)
    .bind(request.compare_version_id)
    .bind(completeness.overall_score)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let export = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::ExportCreate,
        "export",
        export.id,
        Some(json!({
            "version_id": version_id,
            "export_type": export.export_type,
            "snapshot_hash": export.snapshot_hash,
            "file_size": export.file_size,
            "include_diff": export.include_diff,
            "compare_version_id": export.compare_version_id,
        })),
    )
    .await?;

    Ok(export)
}
