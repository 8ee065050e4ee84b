//! Collaborator port traits — implemented by adapter crates.
//! Core logic depends only on these traits, never on a concrete storage
//! or model provider.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RegistryError;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Object storage collaborator (uploads, export packages). Keys are the
/// registry's storage URIs, not filesystem paths.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, uri: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Best-effort delete; callers log failures and continue.
    async fn delete(&self, uri: &str) -> Result<()>;

    async fn exists(&self, uri: &str) -> Result<bool>;

    /// Time-limited download URL for a stored object.
    async fn presign_download(&self, uri: &str, expires_in: Duration) -> Result<String>;

    /// Time-limited upload URL for a not-yet-stored object.
    async fn presign_upload(&self, uri: &str, expires_in: Duration) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
}

/// LLM collaborator. `available()` gates all calls — when it returns
/// false, services degrade to placeholder responses instead of erroring.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn available(&self) -> bool;

    fn model(&self) -> &str;

    /// Approximate token count used for prompt budgeting.
    fn count_tokens(&self, text: &str) -> usize;

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<Completion>;
}
