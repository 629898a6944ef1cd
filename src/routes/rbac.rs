//! Role and permission reference-data admin.
//!
//! Roles are legal with zero grants; deleting a role cascades its mappings
//! away at the store level. All mutations are logged with Critical severity.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::rbac::{
    AssignPermissionToRoleRequest, Permission, PermissionCreateRequest, Role, RoleCreateRequest,
    RolePermission,
};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id", get(get_role).delete(delete_role))
        .route(
            "/roles/:role_id/permissions",
            get(get_role_permissions).post(assign_permission_to_role),
        )
        .route(
            "/roles/:role_id/permissions/:permission_id",
            delete(remove_permission_from_role),
        )
        .route("/permissions", get(list_permissions).post(create_permission))
}

// =============================================================================
// ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
async fn list_roles(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    let rows = sqlx::query("SELECT id, name, description, created_at, updated_at FROM roles ORDER BY name")
        .fetch_all(&state.pool)
        .await?;

    let roles = rows
        .iter()
        .map(row_parsers::role_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE name = ?")
        .bind(&req.name)
        .fetch_one(&state.pool)
        .await?;
    if count > 0 {
        return Err(AppError::conflict("role name already exists"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query("INSERT INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(&req.name)
        .bind(&req.description)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let role = Role {
        id,
        name: req.name,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &role);

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn get_role(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let role = fetch_role(&state, role_id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let role = fetch_role(&state, role_id).await?;

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &role);

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ROLE-PERMISSION GRANTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses((status = 200, description = "Permissions granted by the role", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
async fn get_role_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Vec<Permission>>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.namespace, p.codename, p.description, p.created_at
        FROM permissions p
        INNER JOIN role_permissions rp ON p.id = rp.permission_id
        WHERE rp.role_id = ?
        ORDER BY p.namespace, p.codename
        "#,
    )
    .bind(role_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows
        .iter()
        .map(row_parsers::permission_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = AssignPermissionToRoleRequest,
    responses(
        (status = 201, description = "Permission granted to role"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
async fn assign_permission_to_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
    Json(req): Json<AssignPermissionToRoleRequest>,
) -> AppResult<StatusCode> {
    fetch_role(&state, role_id).await?;

    let now = utc_now();
    sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)")
        .bind(role_id.to_string())
        .bind(req.permission_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let grant = RolePermission {
        role_id,
        permission_id: req.permission_id,
        created_at: now,
    };
    log_activity(&state.event_bus, "assigned", Some(auth.user_id), &grant);

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("role_id" = Uuid, Path, description = "Role ID"),
        ("permission_id" = Uuid, Path, description = "Permission ID"),
    ),
    responses((status = 204, description = "Permission removed from role")),
    security(("bearerAuth" = []))
)]
async fn remove_permission_from_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&state.pool)
        .await?;

    let grant = RolePermission {
        role_id,
        permission_id,
        created_at: utc_now(),
    };
    log_activity(&state.event_bus, "revoked", Some(auth.user_id), &grant);

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PERMISSIONS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses((status = 200, description = "List of permissions", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
async fn list_permissions(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Permission>>> {
    let rows = sqlx::query(
        "SELECT id, namespace, codename, description, created_at FROM permissions ORDER BY namespace, codename",
    )
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows
        .iter()
        .map(row_parsers::permission_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/rbac/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission registered", body = Permission),
        (status = 409, description = "Permission already registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM permissions WHERE namespace = ? AND codename = ?")
        .bind(&req.namespace)
        .bind(&req.codename)
        .fetch_one(&state.pool)
        .await?;
    if count > 0 {
        return Err(AppError::conflict("permission already registered"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query("INSERT INTO permissions (id, namespace, codename, description, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(&req.namespace)
        .bind(&req.codename)
        .bind(&req.description)
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let permission = Permission {
        id,
        namespace: req.namespace,
        codename: req.codename,
        description: req.description,
        created_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &permission);

    Ok((StatusCode::CREATED, Json(permission)))
}

async fn fetch_role(state: &AppState, role_id: Uuid) -> AppResult<Role> {
    let row = sqlx::query("SELECT id, name, description, created_at, updated_at FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;

    row_parsers::role_from_row(&row)
}
