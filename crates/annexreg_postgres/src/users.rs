//! User administration with the last-admin protection.
//!
//! An organization must always keep at least one active admin: demoting,
//! deactivating or deleting the last one is rejected.

use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::{AuditAction, User, UserRole};
use annexreg_core::{CurrentUser, RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, UserRow};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn list(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    role_filter: Option<UserRole>,
) -> Result<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(
        r#"
        SELECT id, org_id, email, role, is_active, failed_login_attempts,
               locked_until, last_login_at, created_at, updated_at
        FROM users
        WHERE org_id = $1 AND ($2::text IS NULL OR role = $2)
        ORDER BY created_at
        "#,
    )
    .bind(org_id)
    .bind(role_filter.map(|r| r.to_string()))
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;
    rows.into_iter().map(UserRow::into_domain).collect()
}

pub async fn get(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    org_id: Uuid,
) -> Result<User> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT id, org_id, email, role, is_active, failed_login_attempts,
               locked_until, last_login_at, created_at, updated_at
        FROM users
        WHERE id = $1 AND org_id = $2
        "#,
    )
    .bind(user_id)
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.ok_or_else(|| RegistryError::not_found("user"))?
        .into_domain()
}

async fn count_active_admins(tx: &mut Transaction<'_, Postgres>, org_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM users
        WHERE org_id = $1 AND role = $2 AND is_active
        "#,
    )
    .bind(org_id)
    .bind(UserRole::Admin.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(count)
}

async fn is_last_active_admin(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<bool> {
    if user.role != UserRole::Admin || !user.is_active {
        return Ok(false);
    }
    Ok(count_active_admins(tx, user.org_id).await? == 1)
}

/// Role and activation changes. Admin-only upstream; audited.
pub async fn update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    request: &UpdateUserRequest,
    current: &CurrentUser,
) -> Result<User> {
    let user = get(tx, user_id, current.org_id).await?;
    let mut changes = serde_json::Map::new();

    let would_lose_admin = match (request.role, request.is_active) {
        (Some(role), _) if role != UserRole::Admin => true,
        (_, Some(false)) => true,
        _ => false,
    };
    if would_lose_admin && is_last_active_admin(tx, &user).await? {
        return Err(RegistryError::Conflict(
            "cannot demote or deactivate the last active admin of the organization".to_string(),
        ));
    }

    let new_role = request.role.unwrap_or(user.role);
    let new_active = request.is_active.unwrap_or(user.is_active);

    if new_role != user.role {
        changes.insert(
            "role".into(),
            json!({"old": user.role, "new": new_role}),
        );
    }
    if new_active != user.is_active {
        changes.insert(
            "is_active".into(),
            json!({"old": user.is_active, "new": new_active}),
        );
    }

    if changes.is_empty() {
        return Ok(user);
    }

    let row: UserRow = sqlx::query_as(
        r#"
        UPDATE users
        SET role = $3, is_active = $4, updated_at = now()
        WHERE id = $1 AND org_id = $2
        RETURNING id, org_id, email, role, is_active, failed_login_attempts,
                  locked_until, last_login_at, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(current.org_id)
    .bind(new_role.to_string())
    .bind(new_active)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let updated = row.into_domain()?;

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    if changes.contains_key("role") {
        audit::record(
            tx,
            &ctx,
            AuditAction::UserRoleChange,
            "user",
            user_id,
            Some(json!({
                "user_id": user_id,
                "old_role": user.role,
                "new_role": new_role,
            })),
        )
        .await?;
    }
    audit::record(
        tx,
        &ctx,
        AuditAction::UserUpdate,
        "user",
        user_id,
        Some(json!(changes)),
    )
    .await?;

    Ok(updated)
}

/// Delete a user. The last active admin cannot be removed.
pub async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    current: &CurrentUser,
) -> Result<()> {
    let user = get(tx, user_id, current.org_id).await?;

    if is_last_active_admin(tx, &user).await? {
        return Err(RegistryError::Conflict(
            "cannot delete the last active admin of the organization".to_string(),
        ));
    }

    let ctx = AuditContext::for_user(current.org_id, current.user_id);
    audit::record(
        tx,
        &ctx,
        AuditAction::UserDelete,
        "user",
        user_id,
        Some(json!({"email": user.email, "role": user.role})),
    )
    .await?;

    sqlx::query(r#"DELETE FROM users WHERE id = $1 AND org_id = $2"#)
        .bind(user_id)
        .bind(current.org_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}
