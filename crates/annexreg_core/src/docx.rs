//! AnnexIV.docx emission.
//!
//! A .docx is a ZIP of WordprocessingML parts, so the document is emitted
//! through the same deterministic ZIP writer used for export packages:
//! `[Content_Types].xml`, `_rels/.rels` and `word/document.xml`. Sections
//! are rendered sorted by key, content fields sorted by name, and evidence
//! sorted by id. The rendering is not part of the snapshot hash.

use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::package::{build_zip, PackageEntry};
use crate::sections::SectionKey;
use crate::types::EvidenceItem;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

#[derive(Debug, Clone)]
pub struct DocxInputs<'a> {
    pub org_name: &'a str,
    pub system_name: &'a str,
    pub hr_use_case_type: String,
    pub version_label: &'a str,
    pub version_status: String,
    /// Section key → (content, evidence refs).
    pub sections: Vec<(SectionKey, Value, Vec<Uuid>)>,
    pub evidence: Vec<&'a EvidenceItem>,
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn paragraph(style: Option<&str>, text: &str) -> String {
    let props = match style {
        Some(s) => format!("<w:pPr><w:pStyle w:val=\"{s}\"/></w:pPr>"),
        None => String::new(),
    };
    format!(
        "<w:p>{props}<w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        escape_xml(text)
    )
}

fn humanize_field(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_field_value(value: &Value) -> String {
    match value {
        Value::Null => "Not specified".to_string(),
        Value::String(s) if s.is_empty() => "Not specified".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => "Not specified".to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_field_value)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.iter()
                .map(|k| format!("{}: {}", humanize_field(k), render_field_value(&map[*k])))
                .collect::<Vec<_>>()
                .join("; ")
        }
        other => other.to_string(),
    }
}

/// Render the document part and wrap it into a deterministic .docx.
pub fn generate_annex_docx(inputs: &DocxInputs<'_>) -> Result<Vec<u8>, RegistryError> {
    let mut body = String::new();
    body.push_str(&paragraph(
        Some("Title"),
        "EU AI Act - Annex IV Technical Documentation",
    ));
    body.push_str(&paragraph(
        None,
        &format!("Organization: {}", inputs.org_name),
    ));
    body.push_str(&paragraph(None, &format!("System: {}", inputs.system_name)));
    body.push_str(&paragraph(
        None,
        &format!("HR Use Case Type: {}", inputs.hr_use_case_type),
    ));
    body.push_str(&paragraph(
        None,
        &format!(
            "Version: {} ({})",
            inputs.version_label, inputs.version_status
        ),
    ));

    let mut sections = inputs.sections.clone();
    sections.sort_by_key(|(key, _, _)| *key);

    for (key, content, evidence_refs) in &sections {
        body.push_str(&paragraph(Some("Heading1"), key.title()));

        match content.as_object().filter(|m| !m.is_empty()) {
            Some(map) => {
                let mut fields: Vec<&String> = map.keys().collect();
                fields.sort();
                for field in fields {
                    body.push_str(&paragraph(
                        None,
                        &format!(
                            "{}: {}",
                            humanize_field(field),
                            render_field_value(&map[field])
                        ),
                    ));
                }
            }
            None => body.push_str(&paragraph(None, "No content provided for this section.")),
        }

        if !evidence_refs.is_empty() {
            body.push_str(&paragraph(Some("Heading2"), "Evidence References"));
            let mut refs: Vec<String> = evidence_refs.iter().map(Uuid::to_string).collect();
            refs.sort();
            for evidence_id in refs {
                let title = inputs
                    .evidence
                    .iter()
                    .find(|e| e.id.to_string() == evidence_id)
                    .map(|e| e.title.as_str())
                    .unwrap_or("Unknown");
                body.push_str(&paragraph(None, &format!("[{evidence_id}] {title}")));
            }
        }
    }

    if !inputs.evidence.is_empty() {
        body.push_str(&paragraph(Some("Heading1"), "Appendix: Evidence Index"));
        let mut sorted: Vec<&&EvidenceItem> = inputs.evidence.iter().collect();
        sorted.sort_by_key(|e| e.id.to_string());
        for item in sorted {
            body.push_str(&paragraph(
                None,
                &format!("{} — {} ({})", item.id, item.title, item.evidence_type),
            ));
        }
    }

    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:body>{body}<w:sectPr/></w:body></w:document>"
    );

    build_zip(vec![
        PackageEntry::new("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes().to_vec()),
        PackageEntry::new("_rels/.rels", RELS_XML.as_bytes().to_vec()),
        PackageEntry::new("word/document.xml", document.into_bytes()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, EvidenceType};
    use chrono::Utc;
    use serde_json::json;
    use std::io::Cursor;
    use std::io::Read;

    fn evidence(id: &str, title: &str) -> EvidenceItem {
        EvidenceItem {
            id: Uuid::parse_str(id).unwrap(),
            org_id: Uuid::new_v4(),
            evidence_type: EvidenceType::Note,
            title: title.into(),
            description: None,
            tags: vec![],
            classification: Classification::Internal,
            type_metadata: json!({"content": "x"}),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn docx_is_a_zip_with_document_part() {
        let e = evidence("00000000-0000-0000-0000-00000000000a", "Model card <v1>");
        let inputs = DocxInputs {
            org_name: "Acme & Co",
            system_name: "Screener",
            hr_use_case_type: "recruitment_screening".into(),
            version_label: "v1.0",
            version_status: "approved".into(),
            sections: vec![(
                SectionKey::General,
                json!({"provider_name": "Acme & Co"}),
                vec![e.id],
            )],
            evidence: vec![&e],
        };
        let bytes = generate_annex_docx(&inputs).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut document = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut document)
            .unwrap();
        assert!(document.contains("Provider Name: Acme &amp; Co"));
        assert!(document.contains("Model card &lt;v1&gt;"));
        assert!(document.contains("General Information"));
    }

    #[test]
    fn docx_bytes_are_deterministic() {
        let inputs = DocxInputs {
            org_name: "Acme",
            system_name: "Screener",
            hr_use_case_type: "other_hr".into(),
            version_label: "v2",
            version_status: "draft".into(),
            sections: vec![],
            evidence: vec![],
        };
        assert_eq!(
            generate_annex_docx(&inputs).unwrap(),
            generate_annex_docx(&inputs).unwrap()
        );
    }
}
