//! Append-only audit trail.
//!
//! Called by every mutating service inside the caller's transaction, so an
//! audit row commits if and only if the change it describes commits. The
//! table itself rejects UPDATE/DELETE via triggers (see migrations).

use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::AuditAction;
use annexreg_core::Result;

use crate::rows::db_err;

#[derive(Debug, Clone)]
pub struct AuditContext {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
}

impl AuditContext {
    pub fn for_user(org_id: Uuid, user_id: Uuid) -> Self {
        Self {
            org_id,
            user_id: Some(user_id),
            ip_address: None,
        }
    }
}

/// Record one audit event. `diff_json` carries the service-level change
/// description; shape varies per action.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &AuditContext,
    action: AuditAction,
    entity_type: &str,
    entity_id: Uuid,
    diff_json: Option<Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_events (org_id, user_id, action, entity_type, entity_id, diff_json, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ctx.org_id)
    .bind(ctx.user_id)
    .bind(action.to_string())
    .bind(entity_type)
    .bind(entity_id)
    .bind(diff_json)
    .bind(ctx.ip_address.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Count audit events recorded for an entity under one action kind.
pub async fn count_for_entity(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    entity_id: Uuid,
    action: AuditAction,
) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM audit_events
        WHERE org_id = $1 AND entity_id = $2 AND action = $3
        "#,
    )
    .bind(org_id)
    .bind(entity_id)
    .bind(action.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(count)
}
