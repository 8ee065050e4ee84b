use thiserror::Error;

/// Typed error for every service operation. The HTTP layer maps each
/// variant to a status code via [`RegistryError::http_status`]; services
/// never construct status codes themselves.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request-shape problems on ordinary routes (422).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Decision-event schema failures carry structured details (400).
    #[error("schema validation failed")]
    SchemaValidation(serde_json::Value),

    /// Duplicates, immutable entities, bad transitions, revision mismatch.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Validation(_) => 422,
            Self::SchemaValidation(_) => 400,
            Self::Conflict(_) => 409,
            Self::PayloadTooLarge(_) => 413,
            Self::UnsupportedMediaType(_) => 415,
            Self::Locked(_) => 423,
            Self::RateLimited(_) => 429,
            Self::Internal(_) => 500,
        }
    }

    /// Shorthand for the common "entity not found or outside the caller's
    /// organization" case — cross-org reads must be indistinguishable from
    /// missing rows.
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{entity} not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_map_matches_contract() {
        assert_eq!(RegistryError::not_found("version").http_status(), 404);
        assert_eq!(RegistryError::Conflict("dup".into()).http_status(), 409);
        assert_eq!(
            RegistryError::SchemaValidation(serde_json::json!([])).http_status(),
            400
        );
        assert_eq!(RegistryError::Validation("bad".into()).http_status(), 422);
        assert_eq!(
            RegistryError::UnsupportedMediaType("x".into()).http_status(),
            415
        );
        assert_eq!(RegistryError::Locked("account".into()).http_status(), 423);
    }
}
