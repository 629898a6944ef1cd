use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::subject::{PermissionName, SecuredTarget, SubjectClass};
use crate::db::row_parsers::{get_opt_uuid, get_uuid};
use crate::errors::AppError;

/// Read side of the role-mapping relations.
///
/// The forward queries return role ids for one object (expanded through the
/// registry by the evaluator); the reverse queries perform the
/// role-to-permission join themselves and return object ids for one
/// permission, which is the shape list-filtering needs.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn generic_role_grants(
        &self,
        target: &SecuredTarget,
        classes: &[SubjectClass],
    ) -> Result<Vec<Uuid>, AppError>;

    async fn user_role_grants(&self, target: &SecuredTarget, user: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn group_role_grants(&self, target: &SecuredTarget, group: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn generic_objects_with(
        &self,
        object_type: &str,
        classes: &[SubjectClass],
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError>;

    async fn user_objects_with(
        &self,
        object_type: &str,
        user: Uuid,
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError>;

    async fn group_objects_with(
        &self,
        object_type: &str,
        group: Uuid,
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError>;

    /// Object ids owned by `user`, for the owner-inclusive listing variant.
    async fn owned_objects(&self, object_type: &str, user: Uuid) -> Result<HashSet<Uuid>, AppError>;

    /// Look up the securable registration for an object. `None` means the
    /// object is not protected by this deployment.
    async fn secured_target(
        &self,
        object_type: &str,
        object_id: Uuid,
    ) -> Result<Option<SecuredTarget>, AppError>;
}

pub struct SqlMappingStore {
    pool: SqlitePool,
}

impl SqlMappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// subject_class IN (...) with one placeholder per class; classes is at most
// three entries so the string building stays trivial.
fn class_placeholders(classes: &[SubjectClass]) -> String {
    vec!["?"; classes.len()].join(", ")
}

#[async_trait]
impl MappingStore for SqlMappingStore {
    async fn generic_role_grants(
        &self,
        target: &SecuredTarget,
        classes: &[SubjectClass],
    ) -> Result<Vec<Uuid>, AppError> {
        if classes.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT role_id FROM generic_mappings WHERE object_type = ? AND object_id = ? AND subject_class IN ({})",
            class_placeholders(classes)
        );

        let mut query = sqlx::query(&sql)
            .bind(&target.object_type)
            .bind(target.object_id.to_string());
        for class in classes {
            query = query.bind(class.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| get_uuid(row, "role_id")).collect()
    }

    async fn user_role_grants(&self, target: &SecuredTarget, user: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT role_id FROM user_mappings WHERE object_type = ? AND object_id = ? AND user_id = ?",
        )
        .bind(&target.object_type)
        .bind(target.object_id.to_string())
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| get_uuid(row, "role_id")).collect()
    }

    async fn group_role_grants(&self, target: &SecuredTarget, group: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT role_id FROM group_mappings WHERE object_type = ? AND object_id = ? AND group_id = ?",
        )
        .bind(&target.object_type)
        .bind(target.object_id.to_string())
        .bind(group.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| get_uuid(row, "role_id")).collect()
    }

    async fn generic_objects_with(
        &self,
        object_type: &str,
        classes: &[SubjectClass],
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError> {
        if classes.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            r#"
            SELECT DISTINCT gm.object_id
            FROM generic_mappings gm
            INNER JOIN role_permissions rp ON rp.role_id = gm.role_id
            INNER JOIN permissions p ON p.id = rp.permission_id
            WHERE gm.object_type = ? AND p.namespace = ? AND p.codename = ?
              AND gm.subject_class IN ({})
            "#,
            class_placeholders(classes)
        );

        let mut query = sqlx::query(&sql)
            .bind(object_type)
            .bind(&permission.namespace)
            .bind(&permission.codename);
        for class in classes {
            query = query.bind(class.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| get_uuid(row, "object_id")).collect()
    }

    async fn user_objects_with(
        &self,
        object_type: &str,
        user: Uuid,
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT um.object_id
            FROM user_mappings um
            INNER JOIN role_permissions rp ON rp.role_id = um.role_id
            INNER JOIN permissions p ON p.id = rp.permission_id
            WHERE um.object_type = ? AND um.user_id = ? AND p.namespace = ? AND p.codename = ?
            "#,
        )
        .bind(object_type)
        .bind(user.to_string())
        .bind(&permission.namespace)
        .bind(&permission.codename)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| get_uuid(row, "object_id")).collect()
    }

    async fn group_objects_with(
        &self,
        object_type: &str,
        group: Uuid,
        permission: &PermissionName,
    ) -> Result<HashSet<Uuid>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT gm.object_id
            FROM group_mappings gm
            INNER JOIN role_permissions rp ON rp.role_id = gm.role_id
            INNER JOIN permissions p ON p.id = rp.permission_id
            WHERE gm.object_type = ? AND gm.group_id = ? AND p.namespace = ? AND p.codename = ?
            "#,
        )
        .bind(object_type)
        .bind(group.to_string())
        .bind(&permission.namespace)
        .bind(&permission.codename)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| get_uuid(row, "object_id")).collect()
    }

    async fn owned_objects(&self, object_type: &str, user: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT object_id FROM secured_objects WHERE object_type = ? AND owner_id = ?",
        )
        .bind(object_type)
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| get_uuid(row, "object_id")).collect()
    }

    async fn secured_target(
        &self,
        object_type: &str,
        object_id: Uuid,
    ) -> Result<Option<SecuredTarget>, AppError> {
        let row = sqlx::query(
            "SELECT owner_id FROM secured_objects WHERE object_type = ? AND object_id = ?",
        )
        .bind(object_type)
        .bind(object_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(SecuredTarget::new(
                object_type,
                object_id,
                get_opt_uuid(&row, "owner_id")?,
            ))),
            None => Ok(None),
        }
    }
}
