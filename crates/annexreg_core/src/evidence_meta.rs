//! Typed evidence metadata — the JSON shape of `type_metadata` is a
//! function of the evidence type, modeled as a sum type and validated on
//! create and on update. Persisted as a JSON column for forward
//! compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::types::EvidenceType;

/// 50 MiB upload cap.
pub const MAX_FILE_SIZE: i64 = 50 * 1024 * 1024;

pub const MAX_STORAGE_URI_LEN: usize = 500;

pub const ALLOWED_MIME_TYPES: [&str; 8] = [
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/png",
    "image/jpeg",
    "text/plain",
    "text/markdown",
    "application/json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub storage_uri: String,
    pub checksum_sha256: String,
    pub file_size: i64,
    pub mime_type: String,
    pub original_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlMetadata {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitMetadata {
    pub repo_url: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub ticket_id: String,
    pub ticket_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMetadata {
    pub content: String,
}

/// Tagged view over `type_metadata`, dispatched on the item's type.
#[derive(Debug, Clone)]
pub enum EvidenceMetadata {
    Upload(UploadMetadata),
    Url(UrlMetadata),
    Git(GitMetadata),
    Ticket(TicketMetadata),
    Note(NoteMetadata),
}

impl EvidenceMetadata {
    /// Serialize back to the JSON column shape. Normalizations applied
    /// during validation (lowercased hashes) are preserved.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Upload(m) => serde_json::to_value(m),
            Self::Url(m) => serde_json::to_value(m),
            Self::Git(m) => serde_json::to_value(m),
            Self::Ticket(m) => serde_json::to_value(m),
            Self::Note(m) => serde_json::to_value(m),
        }
        .expect("metadata structs serialize infallibly")
    }
}

fn invalid(msg: impl Into<String>) -> RegistryError {
    RegistryError::Validation(msg.into())
}

fn parse_meta<T: serde::de::DeserializeOwned>(
    kind: EvidenceType,
    value: &Value,
) -> Result<T, RegistryError> {
    serde_json::from_value(value.clone())
        .map_err(|e| invalid(format!("{kind} metadata validation failed: {e}")))
}

fn require_http_url(field: &str, raw: &str) -> Result<(), RegistryError> {
    let parsed = Url::parse(raw).map_err(|_| invalid(format!("{field} must be a valid URL")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("{field} must be an http(s) URL")));
    }
    Ok(())
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a user-supplied storage URI:
/// `evidence/{org_id}/{yyyy}/{mm}/{uuid}.{ext}`, length ≤ 500, no leading
/// slash, no backslashes, month 01–12, alphanumeric extension ≤ 16 chars.
pub fn validate_storage_uri(storage_uri: &str, org_id: Uuid) -> Result<(), RegistryError> {
    if storage_uri.is_empty() {
        return Err(invalid("storage_uri is required"));
    }
    if storage_uri.len() > MAX_STORAGE_URI_LEN {
        return Err(invalid("storage_uri is too long"));
    }
    if storage_uri.starts_with('/') || storage_uri.contains('\\') {
        return Err(invalid("storage_uri is invalid"));
    }

    let parts: Vec<&str> = storage_uri.split('/').collect();
    if parts.len() != 5 || parts[0] != "evidence" || parts[1] != org_id.to_string() {
        return Err(invalid("storage_uri is invalid for this organization"));
    }

    let (year, month, filename) = (parts[2], parts[3], parts[4]);
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("storage_uri has an invalid year segment"));
    }
    let month_ok = month
        .parse::<u32>()
        .map(|m| (1..=12).contains(&m))
        .unwrap_or(false);
    if !month_ok {
        return Err(invalid("storage_uri has an invalid month segment"));
    }

    let Some((file_id, ext)) = filename.rsplit_once('.') else {
        return Err(invalid("storage_uri has an invalid filename segment"));
    };
    if Uuid::parse_str(file_id).is_err() {
        return Err(invalid("storage_uri has an invalid filename segment"));
    }
    if ext.is_empty() || ext.len() > 16 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("storage_uri has an invalid file extension"));
    }

    Ok(())
}

/// Validate `type_metadata` against the schema for `kind`, returning the
/// typed (and normalized) variant.
///
/// Upload errors distinguish their HTTP class: oversize → 413, MIME not on
/// the allow-list → 415, everything else → 422.
pub fn validate_metadata(
    kind: EvidenceType,
    value: &Value,
    org_id: Uuid,
) -> Result<EvidenceMetadata, RegistryError> {
    if !value.is_object() {
        return Err(invalid("type_metadata must be a JSON object"));
    }

    match kind {
        EvidenceType::Upload => {
            let meta: UploadMetadata = parse_meta(kind, value)?;
            validate_storage_uri(&meta.storage_uri, org_id)?;
            if meta.checksum_sha256.len() != 64 || !is_hex(&meta.checksum_sha256) {
                return Err(invalid("checksum_sha256 must be 64 hex characters"));
            }
            if meta.file_size <= 0 {
                return Err(invalid("file_size must be positive"));
            }
            if meta.file_size > MAX_FILE_SIZE {
                return Err(RegistryError::PayloadTooLarge(format!(
                    "file too large, maximum size is {}MB",
                    MAX_FILE_SIZE / (1024 * 1024)
                )));
            }
            if !ALLOWED_MIME_TYPES.contains(&meta.mime_type.as_str()) {
                return Err(RegistryError::UnsupportedMediaType(format!(
                    "file type '{}' is not allowed",
                    meta.mime_type
                )));
            }
            if meta.original_filename.is_empty() || meta.original_filename.len() > 255 {
                return Err(invalid("original_filename must be 1-255 characters"));
            }
            Ok(EvidenceMetadata::Upload(UploadMetadata {
                checksum_sha256: meta.checksum_sha256.to_lowercase(),
                ..meta
            }))
        }
        EvidenceType::Url => {
            let meta: UrlMetadata = parse_meta(kind, value)?;
            require_http_url("url", &meta.url)?;
            Ok(EvidenceMetadata::Url(meta))
        }
        EvidenceType::Git => {
            let meta: GitMetadata = parse_meta(kind, value)?;
            require_http_url("repo_url", &meta.repo_url)?;
            if meta.commit_hash.len() != 40 || !is_hex(&meta.commit_hash) {
                return Err(invalid("commit_hash must be exactly 40 hex characters"));
            }
            Ok(EvidenceMetadata::Git(GitMetadata {
                commit_hash: meta.commit_hash.to_lowercase(),
                ..meta
            }))
        }
        EvidenceType::Ticket => {
            let meta: TicketMetadata = parse_meta(kind, value)?;
            if meta.ticket_id.is_empty() {
                return Err(invalid("ticket_id must not be empty"));
            }
            if meta.ticket_system.is_empty() {
                return Err(invalid("ticket_system must not be empty"));
            }
            if let Some(url) = &meta.ticket_url {
                require_http_url("ticket_url", url)?;
            }
            Ok(EvidenceMetadata::Ticket(meta))
        }
        EvidenceType::Note => {
            let meta: NoteMetadata = parse_meta(kind, value)?;
            if meta.content.is_empty() {
                return Err(invalid("content must not be empty"));
            }
            Ok(EvidenceMetadata::Note(meta))
        }
    }
}

/// For upload evidence the storage fields are frozen after creation.
/// Returns the first field an update attempts to change.
pub fn changed_immutable_upload_field(
    existing: &Value,
    incoming: &Value,
) -> Option<&'static str> {
    for field in ["storage_uri", "checksum_sha256", "file_size", "mime_type"] {
        if existing.get(field) != incoming.get(field) {
            return Some(field);
        }
    }
    None
}

/// Tag set rules: at most 20 tags, each 1–50 characters.
pub fn validate_tags(tags: &[String]) -> Result<(), RegistryError> {
    if tags.len() > 20 {
        return Err(invalid("maximum 20 tags allowed"));
    }
    for tag in tags {
        if tag.is_empty() || tag.len() > 50 {
            return Err(invalid("each tag must be 1-50 characters"));
        }
    }
    Ok(())
}

/// Evidence titles: 1–255 characters.
pub fn validate_title(title: &str) -> Result<(), RegistryError> {
    if title.is_empty() || title.len() > 255 {
        return Err(invalid("title must be 1-255 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org() -> Uuid {
        Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap()
    }

    fn upload_meta(org_id: Uuid) -> Value {
        json!({
            "storage_uri": format!(
                "evidence/{org_id}/2025/03/8c5d1c12-9f5e-4d0a-9d52-1f8a1a2b3c4d.pdf"
            ),
            "checksum_sha256": "A".repeat(64),
            "file_size": 1024,
            "mime_type": "application/pdf",
            "original_filename": "report.pdf",
        })
    }

    #[test]
    fn upload_metadata_is_accepted_and_normalized() {
        let meta = validate_metadata(EvidenceType::Upload, &upload_meta(org()), org()).unwrap();
        match meta {
            EvidenceMetadata::Upload(u) => {
                assert_eq!(u.checksum_sha256, "a".repeat(64));
            }
            _ => panic!("expected upload variant"),
        }
    }

    #[test]
    fn storage_uri_rejections() {
        let org_id = org();
        let cases = [
            "".to_string(),
            "/evidence/x".to_string(),
            format!("evidence/{org_id}/2025/03/back\\slash.pdf"),
            format!("evidence/{}/2025/03/{}.pdf", Uuid::new_v4(), Uuid::new_v4()),
            format!("evidence/{org_id}/25/03/{}.pdf", Uuid::new_v4()),
            format!("evidence/{org_id}/2025/13/{}.pdf", Uuid::new_v4()),
            format!("evidence/{org_id}/2025/00/{}.pdf", Uuid::new_v4()),
            format!("evidence/{org_id}/2025/03/not-a-uuid.pdf"),
            format!("evidence/{org_id}/2025/03/{}", Uuid::new_v4()),
            format!("evidence/{org_id}/2025/03/{}.p!f", Uuid::new_v4()),
            format!("evidence/{org_id}/2025/03/{}.{}", Uuid::new_v4(), "x".repeat(17)),
        ];
        for uri in cases {
            assert!(validate_storage_uri(&uri, org_id).is_err(), "accepted {uri}");
        }
        let good = format!("evidence/{org_id}/2025/12/{}.docx", Uuid::new_v4());
        assert!(validate_storage_uri(&good, org_id).is_ok());
    }

    #[test]
    fn oversize_upload_maps_to_payload_too_large() {
        let mut meta = upload_meta(org());
        meta["file_size"] = json!(MAX_FILE_SIZE + 1);
        let err = validate_metadata(EvidenceType::Upload, &meta, org()).unwrap_err();
        assert_eq!(err.http_status(), 413);
    }

    #[test]
    fn disallowed_mime_maps_to_415() {
        let mut meta = upload_meta(org());
        meta["mime_type"] = json!("application/x-msdownload");
        let err = validate_metadata(EvidenceType::Upload, &meta, org()).unwrap_err();
        assert_eq!(err.http_status(), 415);
    }

    #[test]
    fn git_commit_hash_is_lowercased() {
        let meta = json!({
            "repo_url": "https://git.example.com/repo.git",
            "commit_hash": "ABCDEF0123456789ABCDEF0123456789ABCDEF01",
            "branch": "main",
        });
        match validate_metadata(EvidenceType::Git, &meta, org()).unwrap() {
            EvidenceMetadata::Git(g) => {
                assert_eq!(g.commit_hash, "abcdef0123456789abcdef0123456789abcdef01");
            }
            _ => panic!("expected git variant"),
        }
    }

    #[test]
    fn git_short_hash_is_rejected() {
        let meta = json!({
            "repo_url": "https://git.example.com/repo.git",
            "commit_hash": "abc123",
        });
        assert!(validate_metadata(EvidenceType::Git, &meta, org()).is_err());
    }

    #[test]
    fn url_must_be_absolute_http() {
        let ok = json!({"url": "https://example.com/doc"});
        assert!(validate_metadata(EvidenceType::Url, &ok, org()).is_ok());
        let relative = json!({"url": "docs/readme.md"});
        assert!(validate_metadata(EvidenceType::Url, &relative, org()).is_err());
        let ftp = json!({"url": "ftp://example.com/doc"});
        assert!(validate_metadata(EvidenceType::Url, &ftp, org()).is_err());
    }

    #[test]
    fn ticket_and_note_require_non_empty_fields() {
        let ticket = json!({"ticket_id": "", "ticket_system": "jira"});
        assert!(validate_metadata(EvidenceType::Ticket, &ticket, org()).is_err());
        let note = json!({"content": ""});
        assert!(validate_metadata(EvidenceType::Note, &note, org()).is_err());
        let note_ok = json!({"content": "Reviewed the model card."});
        assert!(validate_metadata(EvidenceType::Note, &note_ok, org()).is_ok());
    }

    #[test]
    fn immutable_upload_fields_are_detected() {
        let existing = upload_meta(org());
        let mut incoming = existing.clone();
        incoming["original_filename"] = json!("renamed.pdf");
        assert_eq!(changed_immutable_upload_field(&existing, &incoming), None);
        incoming["checksum_sha256"] = json!("b".repeat(64));
        assert_eq!(
            changed_immutable_upload_field(&existing, &incoming),
            Some("checksum_sha256")
        );
    }

    #[test]
    fn tag_limits() {
        let many: Vec<String> = (0..21).map(|i| format!("t{i}")).collect();
        assert!(validate_tags(&many).is_err());
        assert!(validate_tags(&["ok".to_string()]).is_ok());
        assert!(validate_tags(&["".to_string()]).is_err());
        assert!(validate_tags(&["x".repeat(51)]).is_err());
    }
}
