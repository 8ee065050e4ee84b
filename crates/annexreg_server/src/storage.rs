//! Filesystem object-store adapter.
//!
//! Object storage is an external collaborator; this adapter backs
//! single-node deployments. Objects live under a root directory keyed by
//! their storage URI, and "presigned" URLs are expiring links signed with
//! the server secret, honored by the `/files` routes.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use annexreg_core::ports::ObjectStorage;
use annexreg_core::{RegistryError, Result};

#[derive(Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    secret: String,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, secret: String, public_base_url: String) -> Self {
        Self {
            root: root.into(),
            secret,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sign(&self, method: &str, uri: &str, expires_at: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"|");
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(uri.as_bytes());
        hasher.update(b"|");
        hasher.update(expires_at.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validate a presented signature; expiry is checked against now.
    pub fn verify(&self, method: &str, uri: &str, expires_at: i64, signature: &str) -> bool {
        expires_at > Utc::now().timestamp() && self.sign(method, uri, expires_at) == signature
    }

    fn presigned_url(&self, method: &str, uri: &str, expires_in: Duration) -> String {
        let expires_at = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = self.sign(method, uri, expires_at);
        format!(
            "{}/files/{uri}?exp={expires_at}&sig={signature}",
            self.public_base_url
        )
    }

    /// Resolve a storage URI to a path under the root, refusing absolute
    /// paths and parent traversal.
    pub fn path_for(&self, uri: &str) -> Result<PathBuf> {
        let relative = Path::new(uri);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if uri.is_empty() || !clean {
            return Err(RegistryError::Validation(
                "invalid storage uri".to_string(),
            ));
        }
        Ok(self.root.join(relative))
    }
}

fn io_err(context: &str, e: std::io::Error) -> RegistryError {
    RegistryError::Internal(anyhow::anyhow!("{context}: {e}"))
}

#[async_trait]
impl ObjectStorage for FsObjectStore {
    async fn put(&self, uri: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("creating storage directory", e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_err("writing object", e))
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.path_for(uri)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_err("deleting object", e))
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.path_for(uri)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_err("checking object", e))?)
    }

    async fn presign_download(&self, uri: &str, expires_in: Duration) -> Result<String> {
        self.path_for(uri)?;
        Ok(self.presigned_url("GET", uri, expires_in))
    }

    async fn presign_upload(&self, uri: &str, expires_in: Duration) -> Result<String> {
        self.path_for(uri)?;
        Ok(self.presigned_url("PUT", uri, expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FsObjectStore {
        FsObjectStore::new("/tmp/annexreg-test", "secret".into(), "http://localhost:4200".into())
    }

    #[test]
    fn signatures_verify_and_expire() {
        let s = store();
        let exp = Utc::now().timestamp() + 60;
        let sig = s.sign("GET", "exports/a/b.zip", exp);
        assert!(s.verify("GET", "exports/a/b.zip", exp, &sig));
        assert!(!s.verify("PUT", "exports/a/b.zip", exp, &sig));
        assert!(!s.verify("GET", "exports/a/other.zip", exp, &sig));
        let stale = Utc::now().timestamp() - 1;
        let stale_sig = s.sign("GET", "exports/a/b.zip", stale);
        assert!(!s.verify("GET", "exports/a/b.zip", stale, &stale_sig));
    }

    #[test]
    fn traversal_is_rejected() {
        let s = store();
        assert!(s.path_for("evidence/org/2025/01/file.pdf").is_ok());
        assert!(s.path_for("../outside").is_err());
        assert!(s.path_for("/etc/passwd").is_err());
        assert!(s.path_for("a/../../b").is_err());
        assert!(s.path_for("").is_err());
    }

    #[tokio::test]
    async fn presigned_urls_point_at_files_route() {
        let s = store();
        let url = s
            .presign_download("exports/x/y.zip", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:4200/files/exports/x/y.zip?exp="));
        assert!(url.contains("&sig="));
    }
}
