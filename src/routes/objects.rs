//! Secured-object registry and per-object grant administration.
//!
//! An object must be registered before it can carry mappings; mapping an
//! unregistered object is a 404, not a silent create. Grant mutations are
//! themselves authorized through the evaluator: the caller must own the
//! object or hold the grant-management permission on it. This is the
//! mutation side of the permissions panel: the read side lives in
//! `routes::checks`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{EvaluationContext, PermissionName, SecuredTarget, Subject, SubjectClass};
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::rbac::{
    GenericMapping, GenericMappingCreateRequest, GroupMapping, GroupMappingCreateRequest, ObjectMappings,
    RegisterObjectRequest, SecuredObject, UserMapping, UserMappingCreateRequest,
};
use crate::utils::utc_now;

/// Permission required to edit grants on an object the caller does not own.
const MANAGE_GRANTS: &str = "base.change_resourcebase_permissions";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(register_object))
        .route("/:object_type/:object_id", get(get_object_mappings))
        .route("/:object_type/:object_id/generic-mappings", post(create_generic_mapping))
        .route(
            "/:object_type/:object_id/generic-mappings/:mapping_id",
            delete(delete_generic_mapping),
        )
        .route("/:object_type/:object_id/user-mappings", post(create_user_mapping))
        .route(
            "/:object_type/:object_id/user-mappings/:mapping_id",
            delete(delete_user_mapping),
        )
        .route("/:object_type/:object_id/group-mappings", post(create_group_mapping))
        .route(
            "/:object_type/:object_id/group-mappings/:mapping_id",
            delete(delete_group_mapping),
        )
}

#[utoipa::path(
    post,
    path = "/objects",
    tag = "Objects",
    request_body = RegisterObjectRequest,
    responses(
        (status = 201, description = "Object registered", body = SecuredObject),
        (status = 409, description = "Object already registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn register_object(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RegisterObjectRequest>,
) -> AppResult<(StatusCode, Json<SecuredObject>)> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM secured_objects WHERE object_type = ? AND object_id = ?")
            .bind(&req.object_type)
            .bind(req.object_id.to_string())
            .fetch_one(&state.pool)
            .await?;
    if count > 0 {
        return Err(AppError::conflict("object already registered"));
    }

    let now = utc_now();
    sqlx::query("INSERT INTO secured_objects (object_type, object_id, owner_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(&req.object_type)
        .bind(req.object_id.to_string())
        .bind(req.owner_id.map(|id| id.to_string()))
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let object = SecuredObject {
        object_type: req.object_type,
        object_id: req.object_id,
        owner_id: req.owner_id,
        created_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &object);

    Ok((StatusCode::CREATED, Json(object)))
}

#[utoipa::path(
    get,
    path = "/objects/{object_type}/{object_id}",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
    ),
    responses(
        (status = 200, description = "All grants on the object", body = ObjectMappings),
        (status = 404, description = "Object not registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn get_object_mappings(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((object_type, object_id)): Path<(String, Uuid)>,
) -> AppResult<Json<ObjectMappings>> {
    let object = fetch_object(&state, &object_type, object_id).await?;

    let generic = sqlx::query(
        "SELECT id, object_type, object_id, subject_class, role_id, created_at FROM generic_mappings WHERE object_type = ? AND object_id = ?",
    )
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_all(&state.pool)
    .await?
    .iter()
    .map(row_parsers::generic_mapping_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    let users = sqlx::query(
        "SELECT id, object_type, object_id, user_id, role_id, created_at FROM user_mappings WHERE object_type = ? AND object_id = ?",
    )
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_all(&state.pool)
    .await?
    .iter()
    .map(row_parsers::user_mapping_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    let groups = sqlx::query(
        "SELECT id, object_type, object_id, group_id, role_id, created_at FROM group_mappings WHERE object_type = ? AND object_id = ?",
    )
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_all(&state.pool)
    .await?
    .iter()
    .map(row_parsers::group_mapping_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ObjectMappings {
        object_type,
        object_id,
        owner_id: object.owner_id,
        generic,
        users,
        groups,
    }))
}

#[utoipa::path(
    post,
    path = "/objects/{object_type}/{object_id}/generic-mappings",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
    ),
    request_body = GenericMappingCreateRequest,
    responses(
        (status = 201, description = "Grant added", body = GenericMapping),
        (status = 400, description = "Invalid subject class"),
        (status = 404, description = "Object not registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_generic_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id)): Path<(String, Uuid)>,
    Json(req): Json<GenericMappingCreateRequest>,
) -> AppResult<(StatusCode, Json<GenericMapping>)> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;
    let subject_class = SubjectClass::parse(&req.subject_class)?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT OR IGNORE INTO generic_mappings (id, object_type, object_id, subject_class, role_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .bind(subject_class.as_str())
    .bind(req.role_id.to_string())
    .bind(now.to_rfc3339())
    .execute(&state.pool)
    .await?;

    let mapping = GenericMapping {
        id,
        object_type,
        object_id,
        subject_class: subject_class.as_str().to_string(),
        role_id: req.role_id,
        created_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &mapping);

    Ok((StatusCode::CREATED, Json(mapping)))
}

#[utoipa::path(
    delete,
    path = "/objects/{object_type}/{object_id}/generic-mappings/{mapping_id}",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
        ("mapping_id" = Uuid, Path, description = "Mapping ID"),
    ),
    responses((status = 204, description = "Grant removed")),
    security(("bearerAuth" = []))
)]
async fn delete_generic_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id, mapping_id)): Path<(String, Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;

    let row = sqlx::query(
        "SELECT id, object_type, object_id, subject_class, role_id, created_at FROM generic_mappings WHERE id = ? AND object_type = ? AND object_id = ?",
    )
    .bind(mapping_id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("mapping not found"))?;
    let mapping = row_parsers::generic_mapping_from_row(&row)?;

    sqlx::query("DELETE FROM generic_mappings WHERE id = ?")
        .bind(mapping_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &mapping);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/objects/{object_type}/{object_id}/user-mappings",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
    ),
    request_body = UserMappingCreateRequest,
    responses(
        (status = 201, description = "Grant added", body = UserMapping),
        (status = 404, description = "Object not registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_user_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id)): Path<(String, Uuid)>,
    Json(req): Json<UserMappingCreateRequest>,
) -> AppResult<(StatusCode, Json<UserMapping>)> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT OR IGNORE INTO user_mappings (id, object_type, object_id, user_id, role_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .bind(req.user_id.to_string())
    .bind(req.role_id.to_string())
    .bind(now.to_rfc3339())
    .execute(&state.pool)
    .await?;

    let mapping = UserMapping {
        id,
        object_type,
        object_id,
        user_id: req.user_id,
        role_id: req.role_id,
        created_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &mapping);

    Ok((StatusCode::CREATED, Json(mapping)))
}

#[utoipa::path(
    delete,
    path = "/objects/{object_type}/{object_id}/user-mappings/{mapping_id}",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
        ("mapping_id" = Uuid, Path, description = "Mapping ID"),
    ),
    responses((status = 204, description = "Grant removed")),
    security(("bearerAuth" = []))
)]
async fn delete_user_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id, mapping_id)): Path<(String, Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;

    let row = sqlx::query(
        "SELECT id, object_type, object_id, user_id, role_id, created_at FROM user_mappings WHERE id = ? AND object_type = ? AND object_id = ?",
    )
    .bind(mapping_id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("mapping not found"))?;
    let mapping = row_parsers::user_mapping_from_row(&row)?;

    sqlx::query("DELETE FROM user_mappings WHERE id = ?")
        .bind(mapping_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &mapping);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/objects/{object_type}/{object_id}/group-mappings",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
    ),
    request_body = GroupMappingCreateRequest,
    responses(
        (status = 201, description = "Grant added", body = GroupMapping),
        (status = 404, description = "Object not registered"),
    ),
    security(("bearerAuth" = []))
)]
async fn create_group_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id)): Path<(String, Uuid)>,
    Json(req): Json<GroupMappingCreateRequest>,
) -> AppResult<(StatusCode, Json<GroupMapping>)> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT OR IGNORE INTO group_mappings (id, object_type, object_id, group_id, role_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .bind(req.group_id.to_string())
    .bind(req.role_id.to_string())
    .bind(now.to_rfc3339())
    .execute(&state.pool)
    .await?;

    let mapping = GroupMapping {
        id,
        object_type,
        object_id,
        group_id: req.group_id,
        role_id: req.role_id,
        created_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &mapping);

    Ok((StatusCode::CREATED, Json(mapping)))
}

#[utoipa::path(
    delete,
    path = "/objects/{object_type}/{object_id}/group-mappings/{mapping_id}",
    tag = "Objects",
    params(
        ("object_type" = String, Path, description = "Object type"),
        ("object_id" = Uuid, Path, description = "Object ID"),
        ("mapping_id" = Uuid, Path, description = "Mapping ID"),
    ),
    responses((status = 204, description = "Grant removed")),
    security(("bearerAuth" = []))
)]
async fn delete_group_mapping(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((object_type, object_id, mapping_id)): Path<(String, Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let object = fetch_object(&state, &object_type, object_id).await?;
    authorize_grant_change(&state, &auth, &object).await?;

    let row = sqlx::query(
        "SELECT id, object_type, object_id, group_id, role_id, created_at FROM group_mappings WHERE id = ? AND object_type = ? AND object_id = ?",
    )
    .bind(mapping_id.to_string())
    .bind(&object_type)
    .bind(object_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("mapping not found"))?;
    let mapping = row_parsers::group_mapping_from_row(&row)?;

    sqlx::query("DELETE FROM group_mappings WHERE id = ?")
        .bind(mapping_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &mapping);

    Ok(StatusCode::NO_CONTENT)
}

/// Owner override or a grant-management mapping; everyone else is a 403.
async fn authorize_grant_change(state: &AppState, auth: &AuthUser, object: &SecuredObject) -> AppResult<()> {
    let target = SecuredTarget::new(object.object_type.clone(), object.object_id, object.owner_id);
    let permission = PermissionName::parse(MANAGE_GRANTS)?;

    let mut ctx = EvaluationContext::new();
    let allowed = state
        .evaluator
        .has_permission(&mut ctx, &Subject::User(auth.user_id), &permission, &target)
        .await?;

    if !allowed {
        return Err(AppError::forbidden("not allowed to change grants on this object"));
    }
    Ok(())
}

async fn fetch_object(state: &AppState, object_type: &str, object_id: Uuid) -> AppResult<SecuredObject> {
    let row = sqlx::query(
        "SELECT object_type, object_id, owner_id, created_at FROM secured_objects WHERE object_type = ? AND object_id = ?",
    )
    .bind(object_type)
    .bind(object_id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("object not registered"))?;

    row_parsers::secured_object_from_row(&row)
}
