//! Organization bootstrap — the one-shot tenant-creation path.

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use annexreg_core::types::{AuditAction, Organization, User, UserRole};
use annexreg_core::{RegistryError, Result};

use crate::audit::{self, AuditContext};
use crate::rows::{db_err, is_unique_violation, OrganizationRow, UserRow};

#[derive(Debug, Deserialize)]
pub struct BootstrapOrgRequest {
    pub name: String,
    pub admin_email: String,
}

#[derive(Debug, Serialize)]
pub struct BootstrapOrgResponse {
    pub organization: Organization,
    pub admin: User,
}

/// Create an organization and its first admin user. Guarded upstream by
/// the bootstrap token; duplicate names conflict.
pub async fn bootstrap(
    tx: &mut Transaction<'_, Postgres>,
    request: &BootstrapOrgRequest,
) -> Result<BootstrapOrgResponse> {
    if request.name.is_empty() || request.name.len() > 255 {
        return Err(RegistryError::Validation(
            "organization name must be 1-255 characters".to_string(),
        ));
    }
    if !request.admin_email.contains('@') {
        return Err(RegistryError::Validation(
            "admin_email must be a valid email address".to_string(),
        ));
    }

    let org_row: OrganizationRow = sqlx::query_as(
        r#"
        INSERT INTO organizations (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(&request.name)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "organizations_name_key") {
            RegistryError::Conflict(format!(
                "organization '{}' already exists",
                request.name
            ))
        } else {
            db_err(e)
        }
    })?;
    let organization = org_row.into_domain();

    let user_row: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (org_id, email, role)
        VALUES ($1, $2, $3)
        RETURNING id, org_id, email, role, is_active, failed_login_attempts,
                  locked_until, last_login_at, created_at, updated_at
        "#,
    )
    .bind(organization.id)
    .bind(&request.admin_email)
    .bind(UserRole::Admin.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;
    let admin = user_row.into_domain()?;

    let ctx = AuditContext::for_user(organization.id, admin.id);
    audit::record(
        tx,
        &ctx,
        AuditAction::OrgCreate,
        "organization",
        organization.id,
        Some(serde_json::json!({"name": organization.name})),
    )
    .await?;

    Ok(BootstrapOrgResponse {
        organization,
        admin,
    })
}

/// Fetch an organization by id.
pub async fn get(tx: &mut Transaction<'_, Postgres>, org_id: Uuid) -> Result<Organization> {
    let row: Option<OrganizationRow> = sqlx::query_as(
        r#"SELECT id, name, created_at, updated_at FROM organizations WHERE id = $1"#,
    )
    .bind(org_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.map(OrganizationRow::into_domain)
        .ok_or_else(|| RegistryError::not_found("organization"))
}
