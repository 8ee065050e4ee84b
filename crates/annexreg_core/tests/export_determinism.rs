//! End-to-end determinism checks for the export pipeline: the same
//! logical state must always produce the same snapshot hash and the same
//! package bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use annexreg_core::canonical::{canonical_sha256, canonical_string};
use annexreg_core::manifest::{build_manifest_core, finalize_manifest, ManifestInputs, ManifestMapping};
use annexreg_core::package::{
    build_zip, diff_report, evidence_index_csv, evidence_index_json, PackageEntry,
    ENTRY_COMPLETENESS, ENTRY_EVIDENCE_CSV, ENTRY_EVIDENCE_JSON, ENTRY_MANIFEST,
};
use annexreg_core::scoring::completeness_report;
use annexreg_core::sections::SectionKey;
use annexreg_core::types::{
    AiSystem, Classification, DecisionInfluence, DeploymentType, EvidenceItem, EvidenceType,
    HrUseCaseType, MappingTargetType, SystemVersion, VersionStatus,
};

fn fixed_uuid(n: u8) -> Uuid {
    Uuid::from_bytes([n; 16])
}

fn sample_system(org_id: Uuid) -> AiSystem {
    let t = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
    AiSystem {
        id: fixed_uuid(1),
        org_id,
        name: "Candidate Ranker".into(),
        description: Some("Ranks applications for recruiters".into()),
        hr_use_case_type: HrUseCaseType::CandidateMatching,
        intended_purpose: "Rank candidates for recruiter review".into(),
        deployment_type: DeploymentType::Saas,
        decision_influence: DecisionInfluence::Assistive,
        owner_user_id: None,
        contact_name: None,
        contact_email: None,
        revision: 3,
        created_at: t,
        updated_at: t,
    }
}

fn sample_version() -> SystemVersion {
    let t = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
    SystemVersion {
        id: fixed_uuid(2),
        ai_system_id: fixed_uuid(1),
        label: "v1.0".into(),
        status: VersionStatus::Approved,
        notes: Some("release candidate".into()),
        release_date: None,
        approved_by: Some(fixed_uuid(9)),
        approved_at: None,
        created_by: None,
        created_at: t,
        updated_at: t,
    }
}

fn sample_evidence(id: Uuid, title: &str) -> EvidenceItem {
    let t = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
    EvidenceItem {
        id,
        org_id: fixed_uuid(0),
        evidence_type: EvidenceType::Note,
        title: title.into(),
        description: None,
        tags: vec!["validation".into()],
        classification: Classification::Internal,
        type_metadata: json!({"content": "validated against holdout set"}),
        created_by: None,
        created_at: t,
        updated_at: t,
    }
}

fn sample_inputs() -> ManifestInputs {
    let org_id = fixed_uuid(0);
    let e1 = fixed_uuid(3);
    let e2 = fixed_uuid(4);
    ManifestInputs {
        org_id,
        org_name: "Acme Hiring".into(),
        system: sample_system(org_id),
        version: sample_version(),
        assessment: Some(json!({
            "id": fixed_uuid(7),
            "result": "likely_high_risk",
            "score": 4,
        })),
        sections: vec![
            (
                SectionKey::General,
                json!({"provider_name": "Acme Hiring", "system_name": "Candidate Ranker"}),
                vec![e2, e1],
            ),
            (SectionKey::RiskManagement, json!({}), vec![e1]),
        ],
        evidence: vec![sample_evidence(e2, "Holdout eval"), sample_evidence(e1, "Model card")],
        mappings: vec![
            ManifestMapping {
                evidence_id: e2,
                target_type: MappingTargetType::Section,
                target_key: "ANNEX4.GENERAL".into(),
                strength: None,
            },
            ManifestMapping {
                evidence_id: e1,
                target_type: MappingTargetType::Section,
                target_key: "ANNEX4.RISK_MANAGEMENT".into(),
                strength: None,
            },
        ],
    }
}

fn build_package(inputs: &ManifestInputs) -> Vec<u8> {
    let core = build_manifest_core(inputs);
    let (manifest, _hash) =
        finalize_manifest(core, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());

    let report = completeness_report(
        inputs.version.id,
        &inputs
            .sections
            .iter()
            .map(|(k, c, r)| (*k, c.clone(), r.len()))
            .collect::<Vec<_>>(),
    );

    build_zip(vec![
        PackageEntry::canonical_json(ENTRY_MANIFEST, &manifest),
        PackageEntry::canonical_json(ENTRY_EVIDENCE_JSON, &evidence_index_json(&inputs.evidence)),
        PackageEntry::new(
            ENTRY_EVIDENCE_CSV,
            evidence_index_csv(&inputs.evidence).unwrap(),
        ),
        PackageEntry::canonical_json(ENTRY_COMPLETENESS, &report.to_export_json()),
    ])
    .unwrap()
}

#[test]
fn same_state_same_snapshot_hash() {
    let a = build_manifest_core(&sample_inputs());
    let b = build_manifest_core(&sample_inputs());
    assert_eq!(canonical_sha256(&a), canonical_sha256(&b));
}

#[test]
fn package_bytes_are_reproducible() {
    let z1 = build_package(&sample_inputs());
    let z2 = build_package(&sample_inputs());
    assert_eq!(z1, z2);
}

#[test]
fn package_contains_expected_entries_in_order() {
    let bytes = build_package(&sample_inputs());
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "CompletenessReport.json",
            "EvidenceIndex.csv",
            "EvidenceIndex.json",
            "SystemManifest.json",
        ]
    );
}

#[test]
fn manifest_hash_survives_regeneration_with_other_timestamp() {
    let core = build_manifest_core(&sample_inputs());
    let reference = canonical_sha256(&core);
    let (manifest, hash) =
        finalize_manifest(core, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(hash, reference);
    assert_eq!(manifest["snapshot_hash"], json!(reference));
}

#[test]
fn content_edit_changes_hash_and_manifest_text() {
    let mut edited = sample_inputs();
    edited.system.intended_purpose = "Rank candidates for automated rejection".into();

    let base = build_manifest_core(&sample_inputs());
    let changed = build_manifest_core(&edited);
    assert_ne!(canonical_sha256(&base), canonical_sha256(&changed));
    assert_ne!(canonical_string(&base), canonical_string(&changed));
}

#[test]
fn diff_report_sets_are_sorted_and_minimal() {
    let current: BTreeMap<String, serde_json::Value> = [(
        "ANNEX4.GENERAL".to_string(),
        json!({"provider_name": "Acme"}),
    )]
    .into();
    let compare: BTreeMap<String, serde_json::Value> = [(
        "ANNEX4.GENERAL".to_string(),
        json!({"provider_name": "Acme"}),
    )]
    .into();
    let cur_ev: BTreeSet<String> = ["b".to_string(), "a".to_string()].into();
    let cmp_ev: BTreeSet<String> = BTreeSet::new();

    let report = diff_report(fixed_uuid(2), fixed_uuid(5), &current, &compare, &cur_ev, &cmp_ev);
    assert!(report["section_changes"].as_array().unwrap().is_empty());
    assert_eq!(report["evidence_changes"]["added"], json!(["a", "b"]));
    assert_eq!(report["evidence_changes"]["removed"], json!([]));
}
