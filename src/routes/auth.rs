use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::user::{
    AuthResponse, DbUser, LoginRequest, OrgProfileChange, OrgProfileUpdateRequest, RegisterRequest, User,
};
use crate::utils::{hash_password, parse_expiration_date, utc_now, verify_password};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, is_org_member, member_expiration, created_at, updated_at, deleted_at";

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, is_org_member, member_expiration, created_at, updated_at) VALUES (?, ?, ?, ?, 0, NULL, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.pool)
    .await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.into();
    let token = state.jwt.encode(user.id)?;

    log_activity(&state.event_bus, "registered", Some(user.id), &user);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql)
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?;

    let row = row.ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    let db_user = row_parsers::db_user_from_row(&row)?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.into();

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    Ok(Json(db_user.into()))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged")),
    security(("bearerAuth" = []))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Set org membership on an account. Expiry gates the "customgroup" subject
/// class, so changes here move authorization outcomes and land in the audit
/// chain.
#[utoipa::path(
    put,
    path = "/auth/users/{user_id}/org-profile",
    tag = "Auth",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = OrgProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_org_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<OrgProfileUpdateRequest>,
) -> AppResult<Json<User>> {
    // ensure the target exists before mutating
    fetch_user_by_id(&state.pool, user_id).await?;

    let member_expiration = payload
        .member_expiration
        .as_deref()
        .map(parse_expiration_date)
        .transpose()?;

    sqlx::query(
        "UPDATE users SET is_org_member = ?, member_expiration = ?, updated_at = ? WHERE id = ?",
    )
    .bind(payload.is_org_member as i64)
    .bind(member_expiration.map(|d| d.to_string()))
    .bind(utc_now().to_rfc3339())
    .bind(user_id.to_string())
    .execute(&state.pool)
    .await?;

    let change = OrgProfileChange {
        user_id,
        is_org_member: payload.is_org_member,
        member_expiration,
    };
    log_activity(&state.event_bus, "updated", Some(auth.user_id), &change);

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    Ok(Json(db_user.into()))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => row_parsers::db_user_from_row(&row),
        None => Err(AppError::not_found("user not found")),
    }
}
