//! Row types bridging SQL results to domain entities.
//!
//! Enum columns are TEXT with CHECK constraints; parsing back into the
//! closed Rust enums goes through their `FromStr` impls, and a value the
//! database let through but the code no longer knows is an internal
//! error, not a 4xx.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use annexreg_core::sections::SectionKey;
use annexreg_core::types::*;
use annexreg_core::RegistryError;

pub(crate) fn parse_enum<T>(raw: &str, column: &str) -> Result<T, RegistryError>
where
    T: FromStr,
    T::Err: Display,
{
    T::from_str(raw).map_err(|e| {
        RegistryError::Internal(anyhow::anyhow!(
            "unexpected {column} value '{raw}' in database: {e}"
        ))
    })
}

/// Wrap any sqlx failure that is not handled specially.
pub(crate) fn db_err(e: sqlx::Error) -> RegistryError {
    RegistryError::Internal(anyhow::Error::new(e))
}

/// True when `e` is a violation of the named unique constraint.
pub(crate) fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

#[derive(Debug, FromRow)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationRow {
    pub fn into_domain(self) -> Organization {
        Organization {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_domain(self) -> Result<User, RegistryError> {
        Ok(User {
            id: self.id,
            org_id: self.org_id,
            email: self.email,
            role: parse_enum(&self.role, "role")?,
            is_active: self.is_active,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AiSystemRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub hr_use_case_type: String,
    pub intended_purpose: String,
    pub deployment_type: String,
    pub decision_influence: String,
    pub owner_user_id: Option<Uuid>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiSystemRow {
    pub fn into_domain(self) -> Result<AiSystem, RegistryError> {
        Ok(AiSystem {
            id: self.id,
            org_id: self.org_id,
            name: self.name,
            description: self.description,
            hr_use_case_type: parse_enum(&self.hr_use_case_type, "hr_use_case_type")?,
            intended_purpose: self.intended_purpose,
            deployment_type: parse_enum(&self.deployment_type, "deployment_type")?,
            decision_influence: parse_enum(&self.decision_influence, "decision_influence")?,
            owner_user_id: self.owner_user_id,
            contact_name: self.contact_name,
            contact_email: self.contact_email,
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SystemVersionRow {
    pub id: Uuid,
    pub ai_system_id: Uuid,
    pub label: String,
    pub status: String,
    pub notes: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemVersionRow {
    pub fn into_domain(self) -> Result<SystemVersion, RegistryError> {
        Ok(SystemVersion {
            id: self.id,
            ai_system_id: self.ai_system_id,
            label: self.label,
            status: parse_enum(&self.status, "status")?,
            notes: self.notes,
            release_date: self.release_date,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AnnexSectionRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub section_key: String,
    pub content: Value,
    pub evidence_refs: Vec<Uuid>,
    pub completeness_score: f64,
    pub llm_assisted: bool,
    pub last_edited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnnexSectionRow {
    pub fn into_domain(self) -> Result<AnnexSection, RegistryError> {
        Ok(AnnexSection {
            id: self.id,
            version_id: self.version_id,
            section_key: parse_enum::<SectionKey>(&self.section_key, "section_key")?,
            content: self.content,
            evidence_refs: self.evidence_refs,
            completeness_score: self.completeness_score,
            llm_assisted: self.llm_assisted,
            last_edited_by: self.last_edited_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EvidenceItemRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub evidence_type: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub classification: String,
    pub type_metadata: Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvidenceItemRow {
    pub fn into_domain(self) -> Result<EvidenceItem, RegistryError> {
        Ok(EvidenceItem {
            id: self.id,
            org_id: self.org_id,
            evidence_type: parse_enum(&self.evidence_type, "evidence_type")?,
            title: self.title,
            description: self.description,
            tags: self.tags,
            classification: parse_enum(&self.classification, "classification")?,
            type_metadata: self.type_metadata,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EvidenceMappingRow {
    pub id: Uuid,
    pub evidence_id: Uuid,
    pub version_id: Uuid,
    pub target_type: String,
    pub target_key: String,
    pub strength: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EvidenceMappingRow {
    pub fn into_domain(self) -> Result<EvidenceMapping, RegistryError> {
        Ok(EvidenceMapping {
            id: self.id,
            evidence_id: self.evidence_id,
            version_id: self.version_id,
            target_type: parse_enum(&self.target_type, "target_type")?,
            target_key: self.target_key,
            strength: self
                .strength
                .as_deref()
                .map(|s| parse_enum(s, "strength"))
                .transpose()?,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ExportRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub export_type: String,
    pub snapshot_hash: String,
    pub storage_uri: String,
    pub file_size: i64,
    pub include_diff: bool,
    pub compare_version_id: Option<Uuid>,
    pub completeness_score: f64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ExportRow {
    pub fn into_domain(self) -> Result<Export, RegistryError> {
        Ok(Export {
            id: self.id,
            version_id: self.version_id,
            export_type: parse_enum(&self.export_type, "export_type")?,
            snapshot_hash: self.snapshot_hash,
            storage_uri: self.storage_uri,
            file_size: self.file_size,
            include_diff: self.include_diff,
            compare_version_id: self.compare_version_id,
            completeness_score: self.completeness_score,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct LogApiKeyRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub key_hash: String,
    pub name: String,
    pub allow_raw_pii: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LogApiKeyRow {
    pub fn into_domain(self) -> LogApiKey {
        LogApiKey {
            id: self.id,
            version_id: self.version_id,
            key_hash: self.key_hash,
            name: self.name,
            allow_raw_pii: self.allow_raw_pii,
            revoked_at: self.revoked_at,
            last_used_at: self.last_used_at,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DecisionLogRow {
    pub id: Uuid,
    pub version_id: Uuid,
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub event_json: Value,
    pub ingested_at: DateTime<Utc>,
}

impl DecisionLogRow {
    pub fn into_domain(self) -> DecisionLogEntry {
        DecisionLogEntry {
            id: self.id,
            version_id: self.version_id,
            event_id: self.event_id,
            event_time: self.event_time,
            event_json: self.event_json,
            ingested_at: self.ingested_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AssessmentRow {
    pub id: Uuid,
    pub ai_system_id: Uuid,
    pub version_label: Option<String>,
    pub answers_json: Value,
    pub result_label: String,
    pub score: i32,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AssessmentRow {
    pub fn into_domain(self) -> Result<HighRiskAssessment, RegistryError> {
        Ok(HighRiskAssessment {
            id: self.id,
            ai_system_id: self.ai_system_id,
            version_label: self.version_label,
            answers_json: self.answers_json,
            result_label: parse_enum(&self.result_label, "result_label")?,
            score: self.score,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_parse_failures_are_internal() {
        let err = parse_enum::<VersionStatus>("published", "status").unwrap_err();
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn version_row_round_trips() {
        let row = SystemVersionRow {
            id: Uuid::new_v4(),
            ai_system_id: Uuid::new_v4(),
            label: "v1".into(),
            status: "review".into(),
            notes: None,
            release_date: None,
            approved_by: None,
            approved_at: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let version = row.into_domain().unwrap();
        assert_eq!(version.status, VersionStatus::Review);
    }

    #[test]
    fn optional_strength_parses() {
        let row = EvidenceMappingRow {
            id: Uuid::new_v4(),
            evidence_id: Uuid::new_v4(),
            version_id: Uuid::new_v4(),
            target_type: "section".into(),
            target_key: "ANNEX4.GENERAL".into(),
            strength: Some("strong".into()),
            notes: None,
            created_by: None,
            created_at: Utc::now(),
        };
        let mapping = row.into_domain().unwrap();
        assert_eq!(mapping.strength, Some(MappingStrength::Strong));
    }
}
