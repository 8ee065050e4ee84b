//! Deterministic export packaging.
//!
//! ZIP entries are written in lexicographic filename order with a fixed
//! modification time so the archive bytes never vary for the same inputs.
//! All JSON blobs go through the canonical serializer.

use std::io::{Cursor, Write};

use anyhow::Context;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::canonical::canonical_string;
use crate::error::RegistryError;
use crate::types::EvidenceItem;

pub const ENTRY_ANNEX_DOCX: &str = "AnnexIV.docx";
pub const ENTRY_MANIFEST: &str = "SystemManifest.json";
pub const ENTRY_EVIDENCE_JSON: &str = "EvidenceIndex.json";
pub const ENTRY_EVIDENCE_CSV: &str = "EvidenceIndex.csv";
pub const ENTRY_COMPLETENESS: &str = "CompletenessReport.json";
pub const ENTRY_DIFF: &str = "DiffReport.json";

#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PackageEntry {
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            bytes,
        }
    }

    pub fn canonical_json(name: &str, value: &Value) -> Self {
        Self::new(name, canonical_string(value).into_bytes())
    }
}

/// Build a deterministic ZIP: entries sorted by name, deflate compression,
/// fixed DOS-epoch timestamps.
pub fn build_zip(mut entries: Vec<PackageEntry>) -> Result<Vec<u8>, RegistryError> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for entry in &entries {
        writer
            .start_file(&entry.name, options)
            .with_context(|| format!("starting zip entry {}", entry.name))?;
        writer
            .write_all(&entry.bytes)
            .with_context(|| format!("writing zip entry {}", entry.name))?;
    }

    let cursor = writer.finish().context("finishing zip archive")?;
    Ok(cursor.into_inner())
}

/// `EvidenceIndex.json` — evidence sorted by id.
pub fn evidence_index_json(evidence: &[EvidenceItem]) -> Value {
    let mut sorted: Vec<&EvidenceItem> = evidence.iter().collect();
    sorted.sort_by_key(|e| e.id.to_string());
    Value::Array(
        sorted
            .into_iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "title": e.title,
                    "type": e.evidence_type,
                    "description": e.description,
                    "classification": e.classification,
                    "tags": e.tags,
                })
            })
            .collect(),
    )
}

/// `EvidenceIndex.csv` with a stable header and row order (by id).
pub fn evidence_index_csv(evidence: &[EvidenceItem]) -> Result<Vec<u8>, RegistryError> {
    let mut sorted: Vec<&EvidenceItem> = evidence.iter().collect();
    sorted.sort_by_key(|e| e.id.to_string());

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["id", "title", "type", "description", "classification", "tags"])
        .context("writing csv header")?;
    for e in sorted {
        writer
            .write_record([
                e.id.to_string(),
                e.title.clone(),
                e.evidence_type.to_string(),
                e.description.clone().unwrap_or_default(),
                e.classification.to_string(),
                e.tags.join(","),
            ])
            .context("writing csv row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing csv: {e}"))?;
    Ok(bytes)
}

/// `DiffReport.json` — per-section content differences plus evidence-set
/// additions/removals, both sorted.
pub fn diff_report(
    version_id: Uuid,
    compare_version_id: Uuid,
    current_sections: &BTreeMap<String, Value>,
    compare_sections: &BTreeMap<String, Value>,
    current_evidence: &BTreeSet<String>,
    compare_evidence: &BTreeSet<String>,
) -> Value {
    let mut section_changes = Vec::new();
    let all_keys: BTreeSet<&String> = current_sections
        .keys()
        .chain(compare_sections.keys())
        .collect();

    for key in all_keys {
        let current = current_sections.get(key);
        let compare = compare_sections.get(key);
        if current == compare {
            continue;
        }
        let change_type = match (current, compare) {
            (Some(_), Some(_)) => "modified",
            (Some(_), None) => "added",
            (None, Some(_)) => "removed",
            (None, None) => unreachable!("key drawn from one of the maps"),
        };
        section_changes.push(json!({
            "section_key": key,
            "change_type": change_type,
            "current_content": current.cloned().unwrap_or(json!({})),
            "previous_content": compare.cloned().unwrap_or(json!({})),
        }));
    }

    let added: Vec<&String> = current_evidence.difference(compare_evidence).collect();
    let removed: Vec<&String> = compare_evidence.difference(current_evidence).collect();

    json!({
        "version_id": version_id,
        "compare_version_id": compare_version_id,
        "section_changes": section_changes,
        "evidence_changes": {
            "added": added,
            "removed": removed,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, EvidenceType};
    use chrono::Utc;

    fn entries() -> Vec<PackageEntry> {
        vec![
            PackageEntry::new("b.json", b"{}".to_vec()),
            PackageEntry::new("a.json", b"{\"k\":1}".to_vec()),
            PackageEntry::new("c.txt", b"hello".to_vec()),
        ]
    }

    #[test]
    fn zip_bytes_are_deterministic() {
        let z1 = build_zip(entries()).unwrap();
        let z2 = build_zip(entries()).unwrap();
        assert_eq!(z1, z2);
        assert_eq!(&z1[..2], b"PK");
    }

    #[test]
    fn zip_entries_are_sorted() {
        let bytes = build_zip(entries()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.txt"]);
    }

    fn note(id: &str, title: &str) -> EvidenceItem {
        EvidenceItem {
            id: Uuid::parse_str(id).unwrap(),
            org_id: Uuid::new_v4(),
            evidence_type: EvidenceType::Note,
            title: title.into(),
            description: None,
            tags: vec!["model".into(), "risk".into()],
            classification: Classification::Internal,
            type_metadata: json!({"content": "x"}),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn evidence_index_sorted_by_id() {
        let items = vec![
            note("ffffffff-0000-0000-0000-000000000001", "Second"),
            note("00000000-0000-0000-0000-000000000001", "First"),
        ];
        let index = evidence_index_json(&items);
        let arr = index.as_array().unwrap();
        assert_eq!(arr[0]["title"], json!("First"));
        assert_eq!(arr[1]["title"], json!("Second"));
    }

    #[test]
    fn csv_has_stable_columns() {
        let items = vec![note("00000000-0000-0000-0000-000000000001", "Doc")];
        let bytes = evidence_index_csv(&items).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,title,type,description,classification,tags"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("note"));
        assert!(row.contains("\"model,risk\""));
    }

    #[test]
    fn diff_report_classifies_changes() {
        let v = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut current = BTreeMap::new();
        current.insert("ANNEX4.GENERAL".to_string(), json!({"a": 1}));
        current.insert("ANNEX4.LOGGING".to_string(), json!({"n": 1}));
        let mut compare = BTreeMap::new();
        compare.insert("ANNEX4.GENERAL".to_string(), json!({"a": 2}));
        compare.insert("ANNEX4.PERFORMANCE".to_string(), json!({"p": 1}));

        let cur_ev: BTreeSet<String> = ["e1".to_string(), "e2".to_string()].into();
        let cmp_ev: BTreeSet<String> = ["e2".to_string(), "e3".to_string()].into();

        let report = diff_report(v, c, &current, &compare, &cur_ev, &cmp_ev);
        let changes = report["section_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0]["change_type"], json!("modified"));
        assert_eq!(changes[1]["change_type"], json!("added"));
        assert_eq!(changes[2]["change_type"], json!("removed"));
        assert_eq!(report["evidence_changes"]["added"], json!(["e1"]));
        assert_eq!(report["evidence_changes"]["removed"], json!(["e3"]));
    }
}
