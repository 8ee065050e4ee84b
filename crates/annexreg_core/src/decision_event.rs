//! Decision-event schema, validation and PII minimization.
//!
//! Events arrive as raw JSON on the ingestion endpoint, are validated
//! against the closed schema, minimized, and stored verbatim. Unknown
//! extra keys are rejected so the stored shape stays predictable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::canonical::canonical_string;
use crate::error::RegistryError;

pub const MAX_EVENT_ID_LEN: usize = 128;

/// Stable CSV column order for decision-log exports.
pub const CSV_COLUMNS: [&str; 8] = [
    "event_id",
    "event_time",
    "actor",
    "decision",
    "score",
    "reviewer_id",
    "override",
    "ingested_at",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionEvent {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor: String,
    pub subject: Subject,
    pub model: ModelRef,
    pub input: InputRef,
    pub output: OutputRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human: Option<HumanReview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subject {
    pub subject_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRef {
    pub model_id: String,
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRef {
    pub input_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRef {
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub output_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HumanReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(
        rename = "override",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub override_applied: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate a raw event payload. Failures carry structured details and map
/// to 400 on the ingestion endpoint.
pub fn validate_event(raw: &Value) -> Result<DecisionEvent, RegistryError> {
    let event: DecisionEvent = serde_json::from_value(raw.clone()).map_err(|e| {
        RegistryError::SchemaValidation(json!({
            "message": "schema validation failed",
            "errors": [e.to_string()],
        }))
    })?;

    let mut errors = Vec::new();
    if event.event_id.is_empty() {
        errors.push("event_id must not be empty".to_string());
    }
    if event.event_id.len() > MAX_EVENT_ID_LEN {
        errors.push(format!("event_id exceeds {MAX_EVENT_ID_LEN} characters"));
    }
    if event.actor.is_empty() {
        errors.push("actor must not be empty".to_string());
    }
    if event.subject.subject_type.is_empty() {
        errors.push("subject.subject_type must not be empty".to_string());
    }
    if event.output.decision.is_empty() {
        errors.push("output.decision must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(event)
    } else {
        Err(RegistryError::SchemaValidation(json!({
            "message": "schema validation failed",
            "errors": errors,
        })))
    }
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// PII minimization: unless raw PII is explicitly allowed at the key
/// scope, a present `subject_id` is hashed into `subject_id_hash`
/// (`sha256:<hex>`) when no hash was supplied, and then dropped from the
/// stored object.
pub fn minimize_subject(event: &mut DecisionEvent, allow_raw_pii: bool) {
    if allow_raw_pii {
        return;
    }
    if let Some(subject_id) = event.subject.subject_id.take() {
        if event.subject.subject_id_hash.is_none() {
            event.subject.subject_id_hash = Some(format!("sha256:{}", sha256_hex(&subject_id)));
        }
    }
}

/// Row shape shared by the JSON and CSV log exports.
#[derive(Debug, Clone, Serialize)]
pub struct LogExportRow {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub actor: String,
    pub decision: String,
    pub score: Option<f64>,
    pub reviewer_id: Option<String>,
    pub r#override: Option<bool>,
    pub ingested_at: DateTime<Utc>,
}

impl LogExportRow {
    /// Flatten a stored event for export; tolerant of minimized payloads.
    pub fn from_stored(event_json: &Value, ingested_at: DateTime<Utc>) -> Self {
        let str_at = |path: &[&str]| -> Option<String> {
            let mut v = event_json;
            for p in path {
                v = v.get(p)?;
            }
            v.as_str().map(str::to_string)
        };
        Self {
            event_id: str_at(&["event_id"]).unwrap_or_default(),
            event_time: str_at(&["event_time"])
                .and_then(|s| s.parse().ok())
                .unwrap_or(ingested_at),
            actor: str_at(&["actor"]).unwrap_or_default(),
            decision: str_at(&["output", "decision"]).unwrap_or_default(),
            score: event_json
                .get("output")
                .and_then(|o| o.get("score"))
                .and_then(Value::as_f64),
            reviewer_id: str_at(&["human", "reviewer_id"]),
            r#override: event_json
                .get("human")
                .and_then(|h| h.get("override"))
                .and_then(Value::as_bool),
            ingested_at,
        }
    }
}

fn rfc3339_micros(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Canonical JSON export of the filtered event set.
pub fn export_rows_json(rows: &[LogExportRow]) -> String {
    let value = Value::Array(
        rows.iter()
            .map(|r| {
                json!({
                    "event_id": r.event_id,
                    "event_time": rfc3339_micros(r.event_time),
                    "actor": r.actor,
                    "decision": r.decision,
                    "score": r.score,
                    "reviewer_id": r.reviewer_id,
                    "override": r.r#override,
                    "ingested_at": rfc3339_micros(r.ingested_at),
                })
            })
            .collect(),
    );
    canonical_string(&value)
}

/// CSV export with the stable column order from [`CSV_COLUMNS`].
pub fn export_rows_csv(rows: &[LogExportRow]) -> Result<Vec<u8>, RegistryError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| anyhow::anyhow!("writing csv header: {e}"))?;
    for r in rows {
        writer
            .write_record([
                r.event_id.clone(),
                rfc3339_micros(r.event_time),
                r.actor.clone(),
                r.decision.clone(),
                r.score.map(|s| s.to_string()).unwrap_or_default(),
                r.reviewer_id.clone().unwrap_or_default(),
                r.r#override.map(|o| o.to_string()).unwrap_or_default(),
                rfc3339_micros(r.ingested_at),
            ])
            .map_err(|e| anyhow::anyhow!("writing csv row: {e}"))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing csv: {e}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(event_id: &str) -> Value {
        json!({
            "event_id": event_id,
            "event_time": "2025-06-01T12:00:00Z",
            "actor": "scoring-service",
            "subject": {"subject_type": "candidate", "subject_id": "cand-42"},
            "model": {"model_id": "ranker", "model_version": "3.1"},
            "input": {"input_hash": "abc123"},
            "output": {"decision": "shortlist", "score": 0.82, "output_hash": "def456"},
            "human": {"reviewer_id": "rev-1", "override": false},
        })
    }

    #[test]
    fn valid_event_parses() {
        let event = validate_event(&raw_event("e1")).unwrap();
        assert_eq!(event.event_id, "e1");
        assert_eq!(event.output.decision, "shortlist");
        assert_eq!(event.human.unwrap().override_applied, Some(false));
    }

    #[test]
    fn missing_required_block_is_schema_error() {
        let mut raw = raw_event("e1");
        raw.as_object_mut().unwrap().remove("output");
        let err = validate_event(&raw).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let mut raw = raw_event("e1");
        raw["surprise"] = json!(1);
        assert!(validate_event(&raw).is_err());
    }

    #[test]
    fn oversize_event_id_is_rejected() {
        let raw = raw_event(&"x".repeat(MAX_EVENT_ID_LEN + 1));
        assert!(validate_event(&raw).is_err());
        let ok = raw_event(&"x".repeat(MAX_EVENT_ID_LEN));
        assert!(validate_event(&ok).is_ok());
    }

    #[test]
    fn pii_is_hashed_then_dropped() {
        let mut event = validate_event(&raw_event("e1")).unwrap();
        minimize_subject(&mut event, false);
        assert_eq!(event.subject.subject_id, None);
        let expected = format!("sha256:{}", sha256_hex("cand-42"));
        assert_eq!(event.subject.subject_id_hash.as_deref(), Some(expected.as_str()));

        // Stored form must not contain the raw id at all.
        let stored = serde_json::to_value(&event).unwrap();
        assert!(stored["subject"].get("subject_id").is_none());
    }

    #[test]
    fn supplied_hash_is_kept_verbatim() {
        let mut raw = raw_event("e1");
        raw["subject"]["subject_id_hash"] = json!("sha256:precomputed");
        let mut event = validate_event(&raw).unwrap();
        minimize_subject(&mut event, false);
        assert_eq!(
            event.subject.subject_id_hash.as_deref(),
            Some("sha256:precomputed")
        );
        assert_eq!(event.subject.subject_id, None);
    }

    #[test]
    fn allow_raw_pii_keeps_subject_id() {
        let mut event = validate_event(&raw_event("e1")).unwrap();
        minimize_subject(&mut event, true);
        assert_eq!(event.subject.subject_id.as_deref(), Some("cand-42"));
        assert_eq!(event.subject.subject_id_hash, None);
    }

    #[test]
    fn export_rows_flatten_stored_events() {
        let ingested = Utc::now();
        let row = LogExportRow::from_stored(&raw_event("e9"), ingested);
        assert_eq!(row.event_id, "e9");
        assert_eq!(row.decision, "shortlist");
        assert_eq!(row.score, Some(0.82));
        assert_eq!(row.reviewer_id.as_deref(), Some("rev-1"));
        assert_eq!(row.r#override, Some(false));

        let csv_bytes = export_rows_csv(&[row.clone()]).unwrap();
        let text = String::from_utf8(csv_bytes).unwrap();
        assert!(text.starts_with(
            "event_id,event_time,actor,decision,score,reviewer_id,override,ingested_at"
        ));

        let json_text = export_rows_json(&[row]);
        assert!(json_text.contains("\"decision\":\"shortlist\""));
    }
}
