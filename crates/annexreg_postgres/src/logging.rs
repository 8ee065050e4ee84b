//! Decision-log collection: per-version API keys and idempotent event
//! ingestion.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::decision_event::{
    minimize_subject, sha256_hex, validate_event, LogExportRow,
};
use annexreg_core::types::{AuditAction, DecisionLogEntry, LogApiKey};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, is_unique_violation, DecisionLogRow, LogApiKeyRow};
use crate::versions;

const KEY_COLUMNS: &str = "id, version_id, key_hash, name, allow_raw_pii, revoked_at, \
     last_used_at, created_by, created_at";

const LOG_COLUMNS: &str = "id, version_id, event_id, event_time, event_json, ingested_at";

#[derive(Debug, Deserialize)]
pub struct EnableLoggingRequest {
    pub name: String,
    #[serde(default)]
    pub allow_raw_pii: bool,
}

/// Random 32-byte URL-safe API key, shown once. Only its SHA-256 lands in
/// the database.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("ak_{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn hash_api_key(api_key: &str) -> String {
    sha256_hex(api_key)
}

/// Create a per-version ingestion key; returns `(key row, plaintext)`.
pub async fn enable(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    request: &EnableLoggingRequest,
    current: &CurrentUser,
) -> Result<(LogApiKey, String)> {
    if request.name.is_empty() || request.name.len() > 255 {
        return Err(RegistryError::Validation(
            "key name must be 1-255 characters".to_string(),
        ));
    }
    versions::get(tx, system_id, version_id, current.org_id).await?;

    let api_key = generate_api_key();
    let row: LogApiKeyRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO log_api_keys (version_id, key_hash, name, allow_raw_pii, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {KEY_COLUMNS}
        "#
    ))
    .bind(version_id)
    .bind(hash_api_key(&api_key))
    .bind(&request.name)
    .bind(request.allow_raw_pii)
    .bind(current.user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "log_api_keys_key_hash_key") {
            RegistryError::Conflict("API key collision; please retry".to_string())
        } else {
            db_err(e)
        }
    })?;
    let key = row.into_domain();

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::LoggingEnable,
        "log_api_key",
        key.id,
        Some(json!({"version_id": version_id, "name": key.name})),
    )
    .await?;

    Ok((key, api_key))
}

/// Revoke a key; later ingestion attempts with it fail authentication.
pub async fn revoke(
    tx: &mut Transaction<'_, Postgres>,
    key_id: Uuid,
    current: &CurrentUser,
) -> Result<()> {
    let row: Option<LogApiKeyRow> = sqlx::query_as(&format!(
        r#"
        SELECT k.{} FROM log_api_keys k
        JOIN system_versions v ON k.version_id = v.id
        JOIN ai_systems s ON v.ai_system_id = s.id
        WHERE k.id = $1 AND s.org_id = $2
        "#,
        KEY_COLUMNS.replace(", ", ", k.")
    ))
    .bind(key_id)
    .bind(current.org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    let key = row
        .map(LogApiKeyRow::into_domain)
        .ok_or_else(|| RegistryError::not_found("API key"))?;

    if key.revoked_at.is_none() {
        sqlx::query(r#"UPDATE log_api_keys SET revoked_at = now() WHERE id = $1"#)
            .bind(key_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        let ctx = AuditContext::for_user(current.org_id, current.user_id);
        audit::record(
            tx,
            &ctx,
            AuditAction::LoggingRevoke,
            "log_api_key",
            key_id,
            Some(json!({"version_id": key.version_id})),
        )
        .await?;
    }
    Ok(())
}

/// Resolve a presented plaintext key to its un-revoked row, or 401.
pub async fn authenticate(
    tx: &mut Transaction<'_, Postgres>,
    presented_key: &str,
) -> Result<LogApiKey> {
    let row: Option<LogApiKeyRow> = sqlx::query_as(&format!(
        r#"
        SELECT {KEY_COLUMNS} FROM log_api_keys
        WHERE key_hash = $1 AND revoked_at IS NULL
        "#
    ))
    .bind(hash_api_key(presented_key))
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.map(LogApiKeyRow::into_domain)
        .ok_or_else(|| RegistryError::Unauthenticated("invalid or revoked API key".to_string()))
}

/// Validate, minimize and store one decision event. Duplicate
/// `(version_id, event_id)` is an idempotent rejection, not a retry.
pub async fn ingest(
    tx: &mut Transaction<'_, Postgres>,
    key: &LogApiKey,
    raw_event: &serde_json::Value,
) -> Result<DecisionLogEntry> {
    let mut event = validate_event(raw_event)?;
    minimize_subject(&mut event, key.allow_raw_pii);

    let event_json = serde_json::to_value(&event)
        .map_err(|e| RegistryError::Internal(anyhow::anyhow!("serializing event: {e}")))?;

    let row: DecisionLogRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO decision_logs (version_id, event_id, event_time, event_json)
        VALUES ($1, $2, $3, $4)
        RETURNING {LOG_COLUMNS}
        "#
    ))
    .bind(key.version_id)
    .bind(&event.event_id)
    .bind(event.event_time)
    .bind(&event_json)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_decision_logs_version_event") {
            RegistryError::Conflict("duplicate event_id for this version".to_string())
        } else {
            db_err(e)
        }
    })?;

    sqlx::query(r#"UPDATE log_api_keys SET last_used_at = now() WHERE id = $1"#)
        .bind(key.id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

    Ok(row.into_domain())
}

/// Inclusive time-range listing, newest events first.
pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<DecisionLogEntry>, i64)> {
    versions::get(tx, system_id, version_id, org_id).await?;

    let rows: Vec<DecisionLogRow> = sqlx::query_as(&format!(
        r#"
        SELECT {LOG_COLUMNS} FROM decision_logs
        WHERE version_id = $1
          AND ($2::timestamptz IS NULL OR event_time >= $2)
          AND ($3::timestamptz IS NULL OR event_time <= $3)
        ORDER BY event_time DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(version_id)
    .bind(start_time)
    .bind(end_time)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM decision_logs
        WHERE version_id = $1
          AND ($2::timestamptz IS NULL OR event_time >= $2)
          AND ($3::timestamptz IS NULL OR event_time <= $3)
        "#,
    )
    .bind(version_id)
    .bind(start_time)
    .bind(end_time)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok((rows.into_iter().map(DecisionLogRow::into_domain).collect(), total))
}

pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    log_id: Uuid,
    org_id: Uuid,
) -> Result<DecisionLogEntry> {
    versions::get(tx, system_id, version_id, org_id).await?;
    let row: Option<DecisionLogRow> = sqlx::query_as(&format!(
        r#"SELECT {LOG_COLUMNS} FROM decision_logs WHERE id = $1 AND version_id = $2"#
    ))
    .bind(log_id)
    .bind(version_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(row
        .ok_or_else(|| RegistryError::not_found("log entry"))?
        .into_domain())
}

/// Export rows for the filtered range, flattened for JSON/CSV emission.
pub async fn export_rows(
    tx: &mut Transaction<'_, Postgres>,
    system_id: Uuid,
    version_id: Uuid,
    org_id: Uuid,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
) -> Result<Vec<LogExportRow>> {
    let (entries, _) = list(
        tx, system_id, version_id, org_id, start_time, end_time, i64::MAX, 0,
    )
    .await?;
    Ok(entries
        .iter()
        .map(|e| LogExportRow::from_stored(&e.event_json, e.ingested_at))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("ak_"));
        assert_ne!(a, b);
        // 32 bytes of entropy → 43 chars of unpadded base64.
        assert_eq!(a.len(), 3 + 43);
    }

    #[test]
    fn key_hash_is_stable_sha256() {
        let h1 = hash_api_key("ak_test");
        let h2 = hash_api_key("ak_test");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_api_key("ak_other"));
    }
}
