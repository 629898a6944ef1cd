use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::subject::PermissionName;
use crate::errors::AppError;

/// Role-permission reference data.
///
/// `permissions_of` an unknown role is the empty set, never an error: roles
/// are legal the moment they are created, before any grant is attached.
/// `resolve` is the opposite: a permission string that matches nothing is a
/// caller bug and fails loudly.
#[async_trait]
pub trait RoleRegistry: Send + Sync {
    async fn permissions_of(&self, role_id: Uuid) -> Result<HashSet<PermissionName>, AppError>;

    async fn resolve(&self, name: &str) -> Result<PermissionName, AppError>;
}

pub struct SqlRoleRegistry {
    pool: SqlitePool,
}

impl SqlRoleRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRegistry for SqlRoleRegistry {
    async fn permissions_of(&self, role_id: Uuid) -> Result<HashSet<PermissionName>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT p.namespace, p.codename
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let namespace: String = row
                    .try_get("namespace")
                    .map_err(|e| AppError::internal(format!("missing namespace: {}", e)))?;
                let codename: String = row
                    .try_get("codename")
                    .map_err(|e| AppError::internal(format!("missing codename: {}", e)))?;
                Ok(PermissionName::new(namespace, codename))
            })
            .collect()
    }

    async fn resolve(&self, name: &str) -> Result<PermissionName, AppError> {
        let parsed = PermissionName::parse(name)?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM permissions WHERE namespace = ? AND codename = ?",
        )
        .bind(&parsed.namespace)
        .bind(&parsed.codename)
        .fetch_one(&self.pool)
        .await?;

        if count == 0 {
            return Err(AppError::unknown_permission(name));
        }

        Ok(parsed)
    }
}
