//! Canonical export manifest (schema version 1.0) and snapshot hashing.
//!
//! The snapshot hash is the SHA-256 of the canonical manifest with
//! `generated_at` and `snapshot_hash` absent, so regenerating the manifest
//! for identical state always yields the same hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::canonical::canonical_sha256;
use crate::sections::SectionKey;
use crate::types::{
    AiSystem, EvidenceItem, EvidenceType, MappingStrength, MappingTargetType, SystemVersion,
};

pub const MANIFEST_VERSION: &str = "1.0";

/// Everything the manifest builder needs, already scoped and loaded.
#[derive(Debug, Clone)]
pub struct ManifestInputs {
    pub org_id: Uuid,
    pub org_name: String,
    pub system: AiSystem,
    pub version: SystemVersion,
    /// Latest high-risk assessment rendered as a JSON object, if any.
    pub assessment: Option<Value>,
    /// Section key → (content, evidence refs).
    pub sections: Vec<(SectionKey, Value, Vec<Uuid>)>,
    pub evidence: Vec<EvidenceItem>,
    pub mappings: Vec<ManifestMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMapping {
    pub evidence_id: Uuid,
    pub target_type: MappingTargetType,
    pub target_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<MappingStrength>,
}

/// Build the hash-relevant core of the manifest — every key except
/// `generated_at` and `snapshot_hash`.
pub fn build_manifest_core(inputs: &ManifestInputs) -> Value {
    let mut annex_sections = Map::new();
    for (key, content, refs) in &inputs.sections {
        let mut refs: Vec<String> = refs.iter().map(Uuid::to_string).collect();
        refs.sort();
        annex_sections.insert(
            key.to_string(),
            json!({
                "content": content,
                "evidence_refs": refs,
            }),
        );
    }

    let mut evidence_index = Map::new();
    for item in &inputs.evidence {
        let mut entry = Map::new();
        entry.insert("title".into(), json!(item.title));
        entry.insert("type".into(), json!(item.evidence_type));
        entry.insert("classification".into(), json!(item.classification));
        if item.evidence_type == EvidenceType::Upload {
            if let Some(checksum) = item.type_metadata.get("checksum_sha256") {
                entry.insert("checksum".into(), checksum.clone());
            }
        }
        evidence_index.insert(item.id.to_string(), Value::Object(entry));
    }

    let mut mappings = inputs.mappings.clone();
    mappings.sort_by(|a, b| {
        (a.evidence_id, a.target_type.to_string(), &a.target_key).cmp(&(
            b.evidence_id,
            b.target_type.to_string(),
            &b.target_key,
        ))
    });

    json!({
        "manifest_version": MANIFEST_VERSION,
        "org": {
            "id": inputs.org_id,
            "name": inputs.org_name,
        },
        "ai_system": {
            "id": inputs.system.id,
            "name": inputs.system.name,
            "hr_use_case_type": inputs.system.hr_use_case_type,
            "intended_purpose": inputs.system.intended_purpose,
            "deployment_type": inputs.system.deployment_type,
            "decision_influence": inputs.system.decision_influence,
        },
        "system_version": {
            "id": inputs.version.id,
            "label": inputs.version.label,
            "status": inputs.version.status,
            "release_date": inputs.version.release_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
        },
        "high_risk_assessment": inputs.assessment.clone(),
        "annex_sections": annex_sections,
        "evidence_index": evidence_index,
        "mappings": mappings,
    })
}

/// Snapshot hash over the manifest core.
pub fn snapshot_hash(manifest_core: &Value) -> String {
    canonical_sha256(manifest_core)
}

/// Complete the manifest after hashing: stamp `generated_at` and
/// `snapshot_hash`.
pub fn finalize_manifest(
    mut manifest_core: Value,
    generated_at: DateTime<Utc>,
) -> (Value, String) {
    let hash = snapshot_hash(&manifest_core);
    let obj = manifest_core
        .as_object_mut()
        .expect("manifest core is an object");
    obj.insert(
        "generated_at".into(),
        json!(generated_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
    );
    obj.insert("snapshot_hash".into(), json!(hash));
    (manifest_core, hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, DecisionInfluence, DeploymentType, HrUseCaseType, VersionStatus};
    use chrono::TimeZone;

    fn system(org_id: Uuid, purpose: &str) -> AiSystem {
        AiSystem {
            id: Uuid::parse_str("aaaaaaaa-0000-0000-0000-000000000001").unwrap(),
            org_id,
            name: "Screening Assistant".into(),
            description: None,
            hr_use_case_type: HrUseCaseType::RecruitmentScreening,
            intended_purpose: purpose.into(),
            deployment_type: DeploymentType::Saas,
            decision_influence: DecisionInfluence::Assistive,
            owner_user_id: None,
            contact_name: None,
            contact_email: None,
            revision: 1,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn version() -> SystemVersion {
        SystemVersion {
            id: Uuid::parse_str("bbbbbbbb-0000-0000-0000-000000000001").unwrap(),
            ai_system_id: Uuid::parse_str("aaaaaaaa-0000-0000-0000-000000000001").unwrap(),
            label: "v1.0".into(),
            status: VersionStatus::Approved,
            notes: None,
            release_date: None,
            approved_by: None,
            approved_at: None,
            created_by: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    fn evidence(id: &str) -> EvidenceItem {
        EvidenceItem {
            id: Uuid::parse_str(id).unwrap(),
            org_id: Uuid::new_v4(),
            evidence_type: EvidenceType::Note,
            title: "Design note".into(),
            description: None,
            tags: vec![],
            classification: Classification::Internal,
            type_metadata: json!({"content": "text"}),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn inputs(purpose: &str) -> ManifestInputs {
        let org_id = Uuid::parse_str("cccccccc-0000-0000-0000-000000000001").unwrap();
        let e1 = "dddddddd-0000-0000-0000-000000000002";
        let e2 = "dddddddd-0000-0000-0000-000000000001";
        ManifestInputs {
            org_id,
            org_name: "Acme".into(),
            system: system(org_id, purpose),
            version: version(),
            assessment: None,
            sections: vec![(
                SectionKey::General,
                json!({"provider_name": "Acme"}),
                vec![
                    Uuid::parse_str(e1).unwrap(),
                    Uuid::parse_str(e2).unwrap(),
                ],
            )],
            evidence: vec![evidence(e1), evidence(e2)],
            mappings: vec![
                ManifestMapping {
                    evidence_id: Uuid::parse_str(e1).unwrap(),
                    target_type: MappingTargetType::Section,
                    target_key: "ANNEX4.GENERAL".into(),
                    strength: None,
                },
                ManifestMapping {
                    evidence_id: Uuid::parse_str(e2).unwrap(),
                    target_type: MappingTargetType::Section,
                    target_key: "ANNEX4.GENERAL".into(),
                    strength: Some(MappingStrength::Strong),
                },
            ],
        }
    }

    #[test]
    fn identical_state_hashes_identically() {
        let a = build_manifest_core(&inputs("screening"));
        let b = build_manifest_core(&inputs("screening"));
        let ha = snapshot_hash(&a);
        assert_eq!(ha, snapshot_hash(&b));
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn purpose_change_changes_hash() {
        let a = build_manifest_core(&inputs("screening"));
        let b = build_manifest_core(&inputs("ranking"));
        assert_ne!(snapshot_hash(&a), snapshot_hash(&b));
    }

    #[test]
    fn evidence_refs_are_sorted() {
        let core = build_manifest_core(&inputs("screening"));
        let refs = core["annex_sections"]["ANNEX4.GENERAL"]["evidence_refs"]
            .as_array()
            .unwrap();
        let as_strings: Vec<&str> = refs.iter().map(|v| v.as_str().unwrap()).collect();
        let mut sorted = as_strings.clone();
        sorted.sort();
        assert_eq!(as_strings, sorted);
    }

    #[test]
    fn generated_at_does_not_affect_hash() {
        let core = build_manifest_core(&inputs("screening"));
        let expected = snapshot_hash(&core);
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let (m1, h1) = finalize_manifest(core.clone(), t1);
        let (m2, h2) = finalize_manifest(core, t2);
        assert_eq!(h1, expected);
        assert_eq!(h2, expected);
        assert_ne!(m1["generated_at"], m2["generated_at"]);
        assert_eq!(m1["snapshot_hash"], m2["snapshot_hash"]);
    }

    #[test]
    fn manifest_has_stable_key_set() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (manifest, _) = finalize_manifest(build_manifest_core(&inputs("screening")), t);
        let obj = manifest.as_object().unwrap();
        for key in [
            "manifest_version",
            "generated_at",
            "org",
            "ai_system",
            "system_version",
            "high_risk_assessment",
            "annex_sections",
            "evidence_index",
            "mappings",
            "snapshot_hash",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 10);
        assert_eq!(manifest["manifest_version"], json!(MANIFEST_VERSION));
    }

    #[test]
    fn upload_checksum_lands_in_evidence_index() {
        let mut i = inputs("screening");
        i.evidence[0].evidence_type = EvidenceType::Upload;
        i.evidence[0].type_metadata = json!({"checksum_sha256": "ab".repeat(32)});
        let core = build_manifest_core(&i);
        let entry = &core["evidence_index"]["dddddddd-0000-0000-0000-000000000002"];
        assert_eq!(entry["checksum"], json!("ab".repeat(32)));
    }
}
