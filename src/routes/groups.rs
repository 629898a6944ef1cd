//! Groups subsystem admin API.
//!
//! Membership changes alter which group mappings apply to a user, so every
//! mutation is activity-logged.

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
use crate::models::group::{AddMemberRequest, Group, GroupCreateRequest, GroupMembership};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/:group_id", get(get_group))
        .route("/:group_id/members", get(list_members).post(add_member))
        .route("/:group_id/members/:user_id", delete(remove_member))
}

#[utoipa::path(
    get,
    path = "/groups",
    tag = "Groups",
    responses((status = 200, description = "List of groups", body = Vec<Group>)),
    security(("bearerAuth" = []))
)]
async fn list_groups(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Group>>> {
    let rows = sqlx::query("SELECT id, name, description, created_at, updated_at FROM groups ORDER BY name")
        .fetch_all(&state.pool)
        .await?;

    let groups = rows
        .iter()
        .map(row_parsers::group_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "Groups",
    request_body = GroupCreateRequest,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 409, description = "Group name already exists")
    ),
    security(("bearerAuth" = []))
)]
async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM groups WHERE name = ?")
        .bind(&req.name)
        .fetch_one(&state.pool)
        .await?;
    if count > 0 {
        return Err(AppError::conflict("group name already exists"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query("INSERT INTO groups (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(&req.name)
        .bind(&req.description)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let group = Group {
        id,
        name: req.name,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &group);

    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}",
    tag = "Groups",
    params(("group_id" = Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group details", body = Group),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
async fn get_group(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<Group>> {
    let group = fetch_group(&state, group_id).await?;
    Ok(Json(group))
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}/members",
    tag = "Groups",
    params(("group_id" = Uuid, Path, description = "Group ID")),
    responses((status = 200, description = "Group members", body = Vec<GroupMembership>)),
    security(("bearerAuth" = []))
)]
async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<Vec<GroupMembership>>> {
    let rows = sqlx::query("SELECT group_id, user_id, created_at FROM group_memberships WHERE group_id = ?")
        .bind(group_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let members = rows
        .iter()
        .map(|row| {
            Ok(GroupMembership {
                group_id: row_parsers::get_uuid(row, "group_id")?,
                user_id: row_parsers::get_uuid(row, "user_id")?,
                created_at: row_parsers::get_datetime(row, "created_at")?,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/groups/{group_id}/members",
    tag = "Groups",
    params(("group_id" = Uuid, Path, description = "Group ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added"),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<StatusCode> {
    fetch_group(&state, group_id).await?;

    let now = utc_now();
    sqlx::query("INSERT OR IGNORE INTO group_memberships (group_id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(group_id.to_string())
        .bind(req.user_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&state.pool)
        .await?;

    let membership = GroupMembership {
        group_id,
        user_id: req.user_id,
        created_at: now,
    };
    log_activity(&state.event_bus, "created", Some(auth.user_id), &membership);

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/groups/{group_id}/members/{user_id}",
    tag = "Groups",
    params(
        ("group_id" = Uuid, Path, description = "Group ID"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    sqlx::query("DELETE FROM group_memberships WHERE group_id = ? AND user_id = ?")
        .bind(group_id.to_string())
        .bind(user_id.to_string())
        .execute(&state.pool)
        .await?;

    let membership = GroupMembership {
        group_id,
        user_id,
        created_at: utc_now(),
    };
    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &membership);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_group(state: &AppState, group_id: Uuid) -> AppResult<Group> {
    let row = sqlx::query("SELECT id, name, description, created_at, updated_at FROM groups WHERE id = ?")
        .bind(group_id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("group not found"))?;

    row_parsers::group_from_row(&row)
}
