//! Evidence-grounded draft generation with the strict-mode guardrail.
//!
//! The zero-evidence rule is a non-bypassable precondition: with no
//! selected evidence the provider is never invoked and a fixed placeholder
//! comes back. Provider unavailability degrades to a placeholder too —
//! never an error status. Citations pointing outside the supplied evidence
//! set are stripped.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::ports::CompletionProvider;
use crate::types::{EvidenceItem, EvidenceType};

pub const MAX_EVIDENCE_TOKENS_PER_ITEM: usize = 500;
pub const MAX_EVIDENCE_TOKENS_TOTAL: usize = 4000;
pub const MAX_PROMPT_TOKENS: usize = 8000;
pub const MAX_OUTPUT_TOKENS: u32 = 1024;

pub const NEEDS_EVIDENCE_PLACEHOLDER: &str =
    "[NEEDS EVIDENCE: select at least one evidence item to generate a grounded draft]";
pub const LLM_UNAVAILABLE_PLACEHOLDER: &str =
    "[LLM UNAVAILABLE: LLM features are disabled. Please edit this section manually.]";

pub const SYSTEM_PROMPT: &str = "You are drafting EU AI Act Annex IV technical documentation. \
Use ONLY the supplied evidence items. Cite every claim inline as [Evidence: <ID>]. \
If the evidence does not support a statement, omit the statement.";

#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub draft_text: String,
    pub cited_evidence_ids: Vec<Uuid>,
    pub warnings: Vec<String>,
    pub strict_mode: bool,
    pub model_info: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[Evidence:\s*([0-9a-fA-F-]{36})\]").expect("citation regex")
    })
}

/// Unique cited evidence ids in order of first appearance.
pub fn extract_cited_ids(text: &str) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut cited = Vec::new();
    for capture in citation_regex().captures_iter(text) {
        if let Ok(id) = Uuid::parse_str(&capture[1]) {
            if seen.insert(id) {
                cited.push(id);
            }
        }
    }
    cited
}

/// Remove `[Evidence: <uuid>]` markers whose id is not in `allowed`.
pub fn strip_uncited_references(text: &str, allowed: &HashSet<Uuid>) -> String {
    citation_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match Uuid::parse_str(&caps[1]) {
                Ok(id) if allowed.contains(&id) => caps[0].to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}

fn evidence_prompt_block(item: &EvidenceItem) -> String {
    let meta = &item.type_metadata;
    let str_of = |key: &str| meta.get(key).and_then(|v| v.as_str()).unwrap_or("");
    let content = match item.evidence_type {
        EvidenceType::Note => str_of("content").to_string(),
        EvidenceType::Url => format!("URL: {}", str_of("url")),
        EvidenceType::Git => format!(
            "Repo: {}\nFile: {}\nCommit: {}",
            str_of("repo_url"),
            str_of("file_path"),
            str_of("commit_hash")
        ),
        EvidenceType::Ticket => format!(
            "Ticket: {} ({})",
            str_of("ticket_id"),
            str_of("ticket_system")
        ),
        EvidenceType::Upload => format!(
            "File: {}\nMIME: {}",
            str_of("original_filename"),
            str_of("mime_type")
        ),
    };
    format!(
        "Evidence ID: {}\nTitle: {}\nType: {}\nClassification: {}\nContent:\n{}",
        item.id, item.title, item.evidence_type, item.classification, content
    )
}

/// Truncate evidence blocks to the per-item budget, then to the shared
/// total budget in order. Items past the budget become empty strings.
pub fn truncate_evidence_blocks(
    provider: &dyn CompletionProvider,
    blocks: Vec<String>,
) -> Vec<String> {
    let mut remaining = MAX_EVIDENCE_TOKENS_TOTAL;
    blocks
        .into_iter()
        .map(|block| {
            let per_item = provider.truncate_to_tokens(&block, MAX_EVIDENCE_TOKENS_PER_ITEM);
            if remaining == 0 {
                return String::new();
            }
            let fitted = provider.truncate_to_tokens(&per_item, remaining);
            remaining = remaining.saturating_sub(provider.count_tokens(&fitted));
            fitted
        })
        .collect()
}

/// Generate a section draft from the caller-selected evidence.
pub async fn generate_draft(
    provider: &dyn CompletionProvider,
    section_key: &str,
    evidence: &[EvidenceItem],
    instructions: Option<&str>,
) -> Result<DraftOutcome, RegistryError> {
    // Strict mode first: no evidence means no model call, unconditionally.
    if evidence.is_empty() {
        tracing::info!(section_key, "strict mode: no evidence selected, skipping provider");
        return Ok(DraftOutcome {
            draft_text: NEEDS_EVIDENCE_PLACEHOLDER.to_string(),
            cited_evidence_ids: vec![],
            warnings: vec!["strict_mode_activated".to_string()],
            strict_mode: true,
            model_info: None,
            input_tokens: 0,
            output_tokens: 0,
        });
    }

    if !provider.available() {
        return Ok(DraftOutcome {
            draft_text: LLM_UNAVAILABLE_PLACEHOLDER.to_string(),
            cited_evidence_ids: vec![],
            warnings: vec!["llm_unavailable".to_string()],
            strict_mode: false,
            model_info: None,
            input_tokens: 0,
            output_tokens: 0,
        });
    }

    let blocks = truncate_evidence_blocks(
        provider,
        evidence.iter().map(evidence_prompt_block).collect(),
    );

    let mut prompt_parts = vec![
        format!("Section: {section_key}"),
        "Evidence items (use ONLY these; cite as [Evidence: <ID>]):".to_string(),
    ];
    prompt_parts.extend(blocks.into_iter().filter(|b| !b.is_empty()).map(|b| format!("---\n{b}")));
    if let Some(extra) = instructions {
        prompt_parts.push(format!("User instructions: {extra}"));
    }
    prompt_parts
        .push("Output markdown with inline citations, ending with the cited evidence IDs.".into());
    let user_prompt = prompt_parts.join("\n");

    let full_len = provider.count_tokens(SYSTEM_PROMPT) + provider.count_tokens(&user_prompt);
    if full_len > MAX_PROMPT_TOKENS {
        return Err(RegistryError::PayloadTooLarge(
            "request too large for the model context window".to_string(),
        ));
    }

    let completion = provider
        .complete(SYSTEM_PROMPT, &user_prompt, MAX_OUTPUT_TOKENS)
        .await?;

    let allowed: HashSet<Uuid> = evidence.iter().map(|e| e.id).collect();
    let draft_text = strip_uncited_references(&completion.text, &allowed);
    let cited = extract_cited_ids(&draft_text)
        .into_iter()
        .filter(|id| allowed.contains(id))
        .collect();

    Ok(DraftOutcome {
        draft_text,
        cited_evidence_ids: cited,
        warnings: vec![],
        strict_mode: false,
        model_info: Some(completion.model),
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Completion;
    use crate::types::Classification;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    /// Provider double that fails the test if the model is ever invoked.
    struct PanickingProvider;

    #[async_trait]
    impl CompletionProvider for PanickingProvider {
        fn available(&self) -> bool {
            true
        }
        fn model(&self) -> &str {
            "panicking-model"
        }
        fn count_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
            text.chars().take(max_tokens * 4).collect()
        }
        async fn complete(&self, _: &str, _: &str, _: u32) -> crate::ports::Result<Completion> {
            panic!("strict mode must not reach the provider");
        }
    }

    struct CannedProvider {
        text: String,
    }

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        fn available(&self) -> bool {
            true
        }
        fn model(&self) -> &str {
            "canned"
        }
        fn count_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
            text.chars().take(max_tokens * 4).collect()
        }
        async fn complete(&self, _: &str, _: &str, _: u32) -> crate::ports::Result<Completion> {
            Ok(Completion {
                text: self.text.clone(),
                model: "canned".into(),
                input_tokens: 10,
                output_tokens: 20,
                duration_ms: 5,
            })
        }
    }

    struct OfflineProvider;

    #[async_trait]
    impl CompletionProvider for OfflineProvider {
        fn available(&self) -> bool {
            false
        }
        fn model(&self) -> &str {
            "offline"
        }
        fn count_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        fn truncate_to_tokens(&self, text: &str, _max_tokens: usize) -> String {
            text.to_string()
        }
        async fn complete(&self, _: &str, _: &str, _: u32) -> crate::ports::Result<Completion> {
            panic!("offline provider must not be invoked");
        }
    }

    fn note(id: Uuid) -> EvidenceItem {
        EvidenceItem {
            id,
            org_id: Uuid::new_v4(),
            evidence_type: EvidenceType::Note,
            title: "Note".into(),
            description: None,
            tags: vec![],
            classification: Classification::Internal,
            type_metadata: json!({"content": "the model was validated"}),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn zero_evidence_never_calls_the_provider() {
        let outcome = generate_draft(&PanickingProvider, "ANNEX4.GENERAL", &[], None)
            .await
            .unwrap();
        assert!(outcome.strict_mode);
        assert_eq!(outcome.draft_text, NEEDS_EVIDENCE_PLACEHOLDER);
        assert_eq!(outcome.warnings, vec!["strict_mode_activated"]);
    }

    #[tokio::test]
    async fn offline_provider_degrades_gracefully() {
        let items = vec![note(Uuid::new_v4())];
        let outcome = generate_draft(&OfflineProvider, "ANNEX4.GENERAL", &items, None)
            .await
            .unwrap();
        assert!(!outcome.strict_mode);
        assert_eq!(outcome.draft_text, LLM_UNAVAILABLE_PLACEHOLDER);
        assert_eq!(outcome.warnings, vec!["llm_unavailable"]);
    }

    #[tokio::test]
    async fn uncited_references_are_stripped() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let provider = CannedProvider {
            text: format!(
                "Validated [Evidence: {known}]. Fabricated [Evidence: {unknown}]."
            ),
        };
        let items = vec![note(known)];
        let outcome = generate_draft(&provider, "ANNEX4.PERFORMANCE", &items, None)
            .await
            .unwrap();
        assert!(outcome.draft_text.contains(&known.to_string()));
        assert!(!outcome.draft_text.contains(&unknown.to_string()));
        assert_eq!(outcome.cited_evidence_ids, vec![known]);
        assert_eq!(outcome.model_info.as_deref(), Some("canned"));
    }

    #[test]
    fn citation_extraction_dedupes_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let text = format!(
            "[Evidence: {a}] then [Evidence: {b}] then [Evidence: {a}] again"
        );
        assert_eq!(extract_cited_ids(&text), vec![a, b]);
    }

    #[test]
    fn total_budget_empties_trailing_blocks() {
        let provider = CannedProvider { text: String::new() };
        let big = "x".repeat(MAX_EVIDENCE_TOKENS_TOTAL * 4);
        let blocks = truncate_evidence_blocks(&provider, vec![big.clone(), big]);
        // First block is cut to the per-item budget, leaving room for the
        // second; both shrink to their budgets, never beyond the total.
        let used: usize = blocks.iter().map(|b| provider.count_tokens(b)).sum();
        assert!(used <= MAX_EVIDENCE_TOKENS_TOTAL);
        assert_eq!(provider.count_tokens(&blocks[0]), MAX_EVIDENCE_TOKENS_PER_ITEM);
    }
}
