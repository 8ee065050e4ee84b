//! Domain entities and closed enums.
//!
//! Every entity is reachable from exactly one [`Organization`]; adapters
//! must scope every query with an explicit `org_id` predicate. Enum values
//! are stored as their snake_case strings (TEXT + CHECK in the database)
//! and round-trip through `strum`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::sections::SectionKey;

// ── Roles ─────────────────────────────────────────────────────

/// Totally ordered for RBAC checks: viewer < reviewer < editor < admin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Viewer,
    Reviewer,
    Editor,
    Admin,
}

// ── Tenancy ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Authentication counters (`failed_login_attempts`, `locked_until`) are
/// consumed by the external auth collaborator; this core only reads
/// `is_active` and `role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── AI systems ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HrUseCaseType {
    RecruitmentScreening,
    ApplicationFiltering,
    CandidateMatching,
    PerformanceEvaluation,
    EmployeeMonitoring,
    TaskAllocation,
    PromotionTermination,
    OtherHr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeploymentType {
    Saas,
    Onprem,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionInfluence {
    Assistive,
    SemiAutomated,
    Automated,
}

/// `revision` is the row revision counter for optimistic concurrency —
/// distinct from [`SystemVersion`], which models documentation versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSystem {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub hr_use_case_type: HrUseCaseType,
    pub intended_purpose: String,
    pub deployment_type: DeploymentType,
    pub decision_influence: DecisionInfluence,
    pub owner_user_id: Option<Uuid>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Versions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Review,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemVersion {
    pub id: Uuid,
    pub ai_system_id: Uuid,
    pub label: String,
    pub status: VersionStatus,
    pub notes: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Annex sections ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnexSection {
    pub id: Uuid,
    pub version_id: Uuid,
    pub section_key: SectionKey,
    /// Free-form object keyed by field name.
    pub content: Value,
    /// Ordered evidence item ids; order is caller-controlled.
    pub evidence_refs: Vec<Uuid>,
    /// Cached output of the scoring formula over `content` + `evidence_refs`.
    pub completeness_score: f64,
    pub llm_assisted: bool,
    pub last_edited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Evidence ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvidenceType {
    Upload,
    Url,
    Git,
    Ticket,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: Uuid,
    pub org_id: Uuid,
    /// Immutable after creation; determines the shape of `type_metadata`.
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub classification: Classification,
    /// Validated against the [`crate::evidence_meta::EvidenceMetadata`]
    /// variant for `evidence_type`; persisted as JSON for forward
    /// compatibility.
    pub type_metadata: Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingTargetType {
    Section,
    Field,
    Requirement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappingStrength {
    Weak,
    Medium,
    Strong,
}

/// Link from an evidence item to a sub-target of a version. Unique on
/// `(evidence_id, version_id, target_type, target_key)`. `target_key` is
/// opaque here; validation belongs to higher-level workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMapping {
    pub id: Uuid,
    pub evidence_id: Uuid,
    pub version_id: Uuid,
    pub target_type: MappingTargetType,
    pub target_key: String,
    pub strength: Option<MappingStrength>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ── Exports ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportType {
    Full,
    Diff,
}

/// Immutable after insert. The first export of an approved version freezes
/// that version and all its sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub id: Uuid,
    pub version_id: Uuid,
    pub export_type: ExportType,
    pub snapshot_hash: String,
    pub storage_uri: String,
    pub file_size: i64,
    pub include_diff: bool,
    pub compare_version_id: Option<Uuid>,
    pub completeness_score: f64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ── Decision logging ──────────────────────────────────────────

/// Only the SHA-256 of the plaintext key is stored; the plaintext is shown
/// once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogApiKey {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: Uuid,
    pub version_id: Uuid,
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub event_json: Value,
    pub ingested_at: DateTime<Utc>,
}

// ── High-risk assessments ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssessmentResult {
    LikelyHighRisk,
    Unclear,
    LikelyNot,
}

/// Heuristic screening outcome, not legal advice. Append-only per system;
/// the newest entry feeds the export manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskAssessment {
    pub id: Uuid,
    pub ai_system_id: Uuid,
    pub version_label: Option<String>,
    pub answers_json: Value,
    pub result_label: AssessmentResult,
    pub score: i32,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ── Audit trail ───────────────────────────────────────────────

/// Closed set of audited mutation kinds. Rendered as dotted action names
/// in the audit table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AuditAction {
    #[serde(rename = "org.create")]
    #[strum(serialize = "org.create")]
    OrgCreate,
    #[serde(rename = "user.update")]
    #[strum(serialize = "user.update")]
    UserUpdate,
    #[serde(rename = "user.role_change")]
    #[strum(serialize = "user.role_change")]
    UserRoleChange,
    #[serde(rename = "user.delete")]
    #[strum(serialize = "user.delete")]
    UserDelete,
    #[serde(rename = "ai_system.create")]
    #[strum(serialize = "ai_system.create")]
    AiSystemCreate,
    #[serde(rename = "ai_system.update")]
    #[strum(serialize = "ai_system.update")]
    AiSystemUpdate,
    #[serde(rename = "ai_system.delete")]
    #[strum(serialize = "ai_system.delete")]
    AiSystemDelete,
    #[serde(rename = "assessment.create")]
    #[strum(serialize = "assessment.create")]
    AssessmentCreate,
    #[serde(rename = "version.create")]
    #[strum(serialize = "version.create")]
    VersionCreate,
    #[serde(rename = "version.update")]
    #[strum(serialize = "version.update")]
    VersionUpdate,
    #[serde(rename = "version.status_change")]
    #[strum(serialize = "version.status_change")]
    VersionStatusChange,
    #[serde(rename = "version.delete")]
    #[strum(serialize = "version.delete")]
    VersionDelete,
    #[serde(rename = "section.update")]
    #[strum(serialize = "section.update")]
    SectionUpdate,
    #[serde(rename = "evidence.create")]
    #[strum(serialize = "evidence.create")]
    EvidenceCreate,
    #[serde(rename = "evidence.update")]
    #[strum(serialize = "evidence.update")]
    EvidenceUpdate,
    #[serde(rename = "evidence.delete")]
    #[strum(serialize = "evidence.delete")]
    EvidenceDelete,
    #[serde(rename = "mapping.create")]
    #[strum(serialize = "mapping.create")]
    MappingCreate,
    #[serde(rename = "mapping.delete")]
    #[strum(serialize = "mapping.delete")]
    MappingDelete,
    #[serde(rename = "export.create")]
    #[strum(serialize = "export.create")]
    ExportCreate,
    #[serde(rename = "logging.enable")]
    #[strum(serialize = "logging.enable")]
    LoggingEnable,
    #[serde(rename = "logging.revoke")]
    #[strum(serialize = "logging.revoke")]
    LoggingRevoke,
}

/// Append-only; the database rejects UPDATE and DELETE via triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub diff_json: Option<Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn enums_round_trip_as_snake_case() {
        assert_eq!(VersionStatus::Draft.to_string(), "draft");
        assert_eq!(
            VersionStatus::from_str("approved").unwrap(),
            VersionStatus::Approved
        );
        assert_eq!(
            DecisionInfluence::SemiAutomated.to_string(),
            "semi_automated"
        );
        assert_eq!(
            HrUseCaseType::from_str("recruitment_screening").unwrap(),
            HrUseCaseType::RecruitmentScreening
        );
        assert!(VersionStatus::from_str("published").is_err());
    }

    #[test]
    fn audit_actions_render_dotted() {
        assert_eq!(AuditAction::VersionCreate.to_string(), "version.create");
        assert_eq!(
            AuditAction::from_str("mapping.delete").unwrap(),
            AuditAction::MappingDelete
        );
        assert_eq!(
            AuditAction::UserRoleChange.to_string(),
            "user.role_change"
        );
    }

    #[test]
    fn serde_uses_wire_names() {
        let v = serde_json::to_value(ExportType::Full).unwrap();
        assert_eq!(v, serde_json::json!("full"));
        let a = serde_json::to_value(AuditAction::SectionUpdate).unwrap();
        assert_eq!(a, serde_json::json!("section.update"));
    }
}
