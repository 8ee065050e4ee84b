//! Completeness scoring for Annex IV sections.
//!
//! Per section: half the score comes from required-field coverage, half
//! from evidence count (three refs saturate the evidence half). Sections
//! without required fields take the full score from evidence. The version
//! score is a weighted mean where absent sections contribute zero to the
//! numerator but their full weight stays in the denominator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::sections::SectionKey;

/// A required field counts as filled unless it is missing, null, an empty
/// string, or an empty array.
pub fn field_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Score a single section from its content object and evidence ref count.
pub fn section_score(key: SectionKey, content: &Value, evidence_count: usize) -> f64 {
    let required = key.required_fields();
    let evidence_part = (evidence_count.min(3) as f64) / 3.0;

    if required.is_empty() {
        return round2(evidence_part * 100.0);
    }

    let filled = required
        .iter()
        .filter(|f| field_filled(content.get(**f)))
        .count();
    let field_score = (filled as f64 / required.len() as f64) * 50.0;
    let evidence_score = evidence_part * 50.0;
    round2(field_score + evidence_score)
}

/// Weighted mean over the fixed per-section weights table.
pub fn version_score(section_scores: &BTreeMap<SectionKey, f64>) -> f64 {
    let total_weight: f64 = SectionKey::all().map(|k| k.weight()).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    let total: f64 = SectionKey::all()
        .filter_map(|k| section_scores.get(&k).map(|s| s * k.weight()))
        .sum();
    round2(total / total_weight)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    RequiredField,
    NoEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub section_key: SectionKey,
    pub gap_type: GapKind,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionCompleteness {
    pub section_key: SectionKey,
    pub title: String,
    pub score: f64,
    pub field_completion: BTreeMap<String, bool>,
    pub evidence_count: usize,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub version_id: Uuid,
    pub overall_score: f64,
    pub sections: Vec<SectionCompleteness>,
    pub gaps: Vec<Gap>,
}

/// Per-section gap detection: one `required_field` gap per unfilled field
/// and a single `no_evidence` gap when no refs are mapped.
pub fn detect_gaps(
    key: SectionKey,
    content: &Value,
    evidence_count: usize,
) -> (BTreeMap<String, bool>, Vec<Gap>) {
    let mut field_completion = BTreeMap::new();
    let mut gaps = Vec::new();

    for field in key.required_fields() {
        let filled = field_filled(content.get(*field));
        field_completion.insert((*field).to_string(), filled);
        if !filled {
            gaps.push(Gap {
                section_key: key,
                gap_type: GapKind::RequiredField,
                description: format!("Missing required field: {field}"),
            });
        }
    }

    if evidence_count == 0 {
        gaps.push(Gap {
            section_key: key,
            gap_type: GapKind::NoEvidence,
            description: "No evidence items mapped to this section".to_string(),
        });
    }

    (field_completion, gaps)
}

/// Materialize the full report from section state. Input order does not
/// matter; output sections are sorted by key.
pub fn completeness_report(
    version_id: Uuid,
    sections: &[(SectionKey, Value, usize)],
) -> CompletenessReport {
    let mut rows: Vec<&(SectionKey, Value, usize)> = sections.iter().collect();
    rows.sort_by_key(|(k, _, _)| *k);

    let mut scores = BTreeMap::new();
    let mut items = Vec::with_capacity(rows.len());
    let mut all_gaps = Vec::new();

    for (key, content, evidence_count) in rows {
        let score = section_score(*key, content, *evidence_count);
        scores.insert(*key, score);
        let (field_completion, gaps) = detect_gaps(*key, content, *evidence_count);
        items.push(SectionCompleteness {
            section_key: *key,
            title: key.title().to_string(),
            score,
            field_completion,
            evidence_count: *evidence_count,
            gaps: gaps.iter().map(|g| g.description.clone()).collect(),
        });
        all_gaps.extend(gaps);
    }

    CompletenessReport {
        version_id,
        overall_score: version_score(&scores),
        sections: items,
        gaps: all_gaps,
    }
}

impl CompletenessReport {
    /// JSON shape used for `CompletenessReport.json` inside export
    /// packages. Deterministic: no timestamps, sections sorted by key.
    pub fn to_export_json(&self) -> Value {
        json!({
            "version_id": self.version_id,
            "overall_score": self.overall_score,
            "sections": self.sections.iter().map(|s| json!({
                "section_key": s.section_key,
                "title": s.title,
                "score": s.score,
                "evidence_count": s.evidence_count,
                "field_completion": s.field_completion,
                "gaps": s.gaps,
            })).collect::<Vec<_>>(),
            "gaps": self.gaps.iter().map(|g| json!({
                "section_key": g.section_key,
                "gap_type": g.gap_type,
                "description": g.description,
            })).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn three_of_five_fields_one_ref_scores_46_67() {
        let content = json!({
            "provider_name": "Acme",
            "system_name": "Screener",
            "system_version": "1.0.0",
        });
        let score = section_score(SectionKey::General, &content, 1);
        assert_eq!(score, 46.67);
    }

    #[test]
    fn all_fields_three_refs_is_complete() {
        let content = json!({
            "provider_name": "Acme",
            "provider_address": "1 Main St",
            "system_name": "Screener",
            "system_version": "1.0.0",
            "conformity_declaration_date": "2024-01-01",
        });
        assert_eq!(section_score(SectionKey::General, &content, 4), 100.0);
    }

    #[test]
    fn empty_values_do_not_count_as_filled() {
        let content = json!({
            "provider_name": "",
            "provider_address": null,
            "system_name": "Screener",
            "system_version": "1.0.0",
            "conformity_declaration_date": [],
        });
        assert_eq!(section_score(SectionKey::General, &content, 0), 20.0);
    }

    #[test]
    fn no_required_fields_uses_full_evidence_scale() {
        let empty = json!({});
        assert_eq!(section_score(SectionKey::ChangeManagement, &empty, 0), 0.0);
        assert_eq!(
            section_score(SectionKey::ChangeManagement, &empty, 1),
            33.33
        );
        assert_eq!(
            section_score(SectionKey::ChangeManagement, &empty, 3),
            100.0
        );
    }

    #[test]
    fn version_score_is_weighted_mean() {
        let mut scores = BTreeMap::new();
        scores.insert(SectionKey::General, 100.0);
        scores.insert(SectionKey::IntendedPurpose, 80.0);
        scores.insert(SectionKey::SystemDescription, 60.0);
        scores.insert(SectionKey::RiskManagement, 50.0);
        scores.insert(SectionKey::DataGovernance, 70.0);
        scores.insert(SectionKey::ModelTechnical, 90.0);
        scores.insert(SectionKey::Performance, 40.0);
        scores.insert(SectionKey::HumanOversight, 75.0);
        scores.insert(SectionKey::Logging, 85.0);
        scores.insert(SectionKey::AccuracyRobustnessCybersec, 55.0);
        scores.insert(SectionKey::PostMarketMonitoring, 95.0);
        scores.insert(SectionKey::ChangeManagement, 100.0); // weight 0
        assert_eq!(version_score(&scores), 68.50);
    }

    #[test]
    fn missing_sections_still_weigh_in_denominator() {
        let mut scores = BTreeMap::new();
        scores.insert(SectionKey::General, 100.0);
        scores.insert(SectionKey::RiskManagement, 80.0);
        scores.insert(SectionKey::DataGovernance, 60.0);
        assert_eq!(version_score(&scores), 24.20);
    }

    #[test]
    fn gaps_cover_unfilled_fields_and_missing_evidence() {
        let content = json!({"provider_name": "Acme"});
        let (completion, gaps) = detect_gaps(SectionKey::General, &content, 0);
        assert_eq!(completion["provider_name"], true);
        assert_eq!(completion["system_name"], false);
        let required: Vec<_> = gaps
            .iter()
            .filter(|g| g.gap_type == GapKind::RequiredField)
            .collect();
        assert_eq!(required.len(), 4);
        assert!(gaps.iter().any(|g| g.gap_type == GapKind::NoEvidence));
    }

    #[test]
    fn report_sorts_sections_and_aggregates() {
        let version_id = Uuid::new_v4();
        let sections = vec![
            (SectionKey::RiskManagement, json!({}), 0),
            (SectionKey::General, json!({}), 2),
        ];
        let report = completeness_report(version_id, &sections);
        assert_eq!(report.sections[0].section_key, SectionKey::General);
        assert_eq!(report.sections[0].evidence_count, 2);
        assert!(report.overall_score > 0.0);
    }
}
