//! Field-level diff between two system versions.
//!
//! The comparable set is fixed: label, status, notes, release_date.
//! Values are canonicalized to string-or-null before comparison so enum
//! and date fields diff uniformly.

use serde::{Deserialize, Serialize};

use crate::types::SystemVersion;

pub const COMPARABLE_FIELDS: [&str; 4] = ["label", "status", "notes", "release_date"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: u32,
    pub removed: u32,
    pub modified: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub changes: Vec<FieldChange>,
    pub summary: DiffSummary,
}

fn comparable(version: &SystemVersion) -> [(&'static str, Option<String>); 4] {
    [
        ("label", Some(version.label.clone())),
        ("status", Some(version.status.to_string())),
        ("notes", version.notes.clone()),
        (
            "release_date",
            version.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
        ),
    ]
}

/// Ordered list of per-field changes plus added/removed/modified counts.
/// Unchanged fields are omitted.
pub fn version_diff(from: &SystemVersion, to: &SystemVersion) -> VersionDiff {
    let from_fields = comparable(from);
    let to_fields = comparable(to);

    let mut changes = Vec::new();
    let mut summary = DiffSummary::default();

    for ((field, old_value), (_, new_value)) in from_fields.into_iter().zip(to_fields) {
        if old_value == new_value {
            continue;
        }
        match (&old_value, &new_value) {
            (None, Some(_)) => summary.added += 1,
            (Some(_), None) => summary.removed += 1,
            _ => summary.modified += 1,
        }
        changes.push(FieldChange {
            field: field.to_string(),
            old_value,
            new_value,
        });
    }

    VersionDiff { changes, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionStatus;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn version(label: &str, status: VersionStatus, notes: Option<&str>) -> SystemVersion {
        SystemVersion {
            id: Uuid::new_v4(),
            ai_system_id: Uuid::new_v4(),
            label: label.to_string(),
            status,
            notes: notes.map(str::to_string),
            release_date: None,
            approved_by: None,
            approved_at: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn identical_versions_have_empty_diff() {
        let a = version("v1", VersionStatus::Draft, Some("n"));
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        let diff = version_diff(&a, &b);
        assert!(diff.changes.is_empty());
        assert_eq!(diff.summary, DiffSummary::default());
    }

    #[test]
    fn added_removed_modified_counts() {
        let a = version("v1", VersionStatus::Draft, Some("old notes"));
        let mut b = version("v2", VersionStatus::Review, None);
        b.release_date = NaiveDate::from_ymd_opt(2025, 3, 1);

        let diff = version_diff(&a, &b);
        assert_eq!(diff.summary.modified, 2); // label, status
        assert_eq!(diff.summary.removed, 1); // notes
        assert_eq!(diff.summary.added, 1); // release_date

        let release = diff
            .changes
            .iter()
            .find(|c| c.field == "release_date")
            .unwrap();
        assert_eq!(release.new_value.as_deref(), Some("2025-03-01"));
        assert_eq!(release.old_value, None);
    }

    #[test]
    fn status_diffs_as_snake_case_string() {
        let a = version("v1", VersionStatus::Draft, None);
        let b = version("v1", VersionStatus::Approved, None);
        let diff = version_diff(&a, &b);
        let status = diff.changes.iter().find(|c| c.field == "status").unwrap();
        assert_eq!(status.old_value.as_deref(), Some("draft"));
        assert_eq!(status.new_value.as_deref(), Some("approved"));
    }
}
