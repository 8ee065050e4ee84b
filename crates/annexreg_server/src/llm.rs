//! Completion-provider adapters.
//!
//! The model provider is an external collaborator. The default adapter is
//! offline: `available()` is false, so draft generation degrades to its
//! placeholder path and the 200-with-warnings contract holds without any
//! provider configured.

use async_trait::async_trait;

use annexreg_core::ports::{Completion, CompletionProvider};
use annexreg_core::RegistryError;

/// Rough token sizing used for prompt budgeting: ~4 characters per token.
const CHARS_PER_TOKEN: usize = 4;

pub struct OfflineCompletionProvider {
    model: String,
}

impl OfflineCompletionProvider {
    pub fn new() -> Self {
        Self {
            model: "offline".to_string(),
        }
    }
}

impl Default for OfflineCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for OfflineCompletionProvider {
    fn available(&self) -> bool {
        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(CHARS_PER_TOKEN)
    }

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        text.chars().take(max_tokens * CHARS_PER_TOKEN).collect()
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _max_output_tokens: u32,
    ) -> annexreg_core::Result<Completion> {
        Err(RegistryError::Internal(anyhow::anyhow!(
            "offline provider cannot complete"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_provider_reports_unavailable() {
        let provider = OfflineCompletionProvider::new();
        assert!(!provider.available());
        assert_eq!(provider.count_tokens("abcdefgh"), 2);
        assert_eq!(provider.truncate_to_tokens("abcdefgh", 1), "abcd");
    }
}
