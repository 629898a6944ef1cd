//! Authorization query surface.
//!
//! Each handler builds one fresh [`EvaluationContext`]: the memo lives and
//! dies with the request, so a grant mutation is visible to the very next
//! call. The subject comes from the bearer token; its absence is the
//! anonymous subject, not an authentication failure.

use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{EvaluationContext, OwnedVisibility, PermissionName, Subject};
use crate::errors::AppResult;
use crate::jwt::MaybeAuthUser;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", post(check))
        .route("/effective", get(effective))
        .route("/objects", get(objects))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    /// Permission as "namespace.codename".
    #[schema(example = "base.view_resourcebase")]
    pub permission: String,
    #[schema(example = "map")]
    pub object_type: String,
    pub object_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[utoipa::path(
    post,
    path = "/authz/check",
    tag = "Authz",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Authorization decision", body = CheckResponse),
        (status = 400, description = "Malformed permission string"),
    )
)]
pub async fn check(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Json(req): Json<CheckRequest>,
) -> AppResult<Json<CheckResponse>> {
    let subject = caller.subject();
    let permission = PermissionName::parse(&req.permission)?;

    let target = match state.evaluator.lookup_target(&req.object_type, req.object_id).await? {
        Some(target) => target,
        None => {
            // Unprotected object types are a legitimate outcome: deny
            // without error rather than 404, so probes can't enumerate the
            // registry.
            tracing::debug!(object_type = %req.object_type, object_id = %req.object_id, "object not registered");
            return Ok(Json(CheckResponse { allowed: false }));
        }
    };

    let mut ctx = EvaluationContext::new();
    let allowed = state
        .evaluator
        .has_permission(&mut ctx, &subject, &permission, &target)
        .await?;

    Ok(Json(CheckResponse { allowed }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EffectiveParams {
    pub object_type: String,
    pub object_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectiveResponse {
    pub object_type: String,
    pub object_id: Uuid,
    /// Effective permissions as "namespace.codename", sorted.
    pub permissions: Vec<String>,
    pub is_owner: bool,
}

#[utoipa::path(
    get,
    path = "/authz/effective",
    tag = "Authz",
    params(EffectiveParams),
    responses((status = 200, description = "Effective permission set", body = EffectiveResponse))
)]
pub async fn effective(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Query(params): Query<EffectiveParams>,
) -> AppResult<Json<EffectiveResponse>> {
    let subject = caller.subject();

    let (permissions, is_owner) = match state
        .evaluator
        .lookup_target(&params.object_type, params.object_id)
        .await?
    {
        None => (HashSet::new(), false),
        Some(target) => {
            let mut ctx = EvaluationContext::new();
            let perms = state
                .evaluator
                .effective_permissions(&mut ctx, &subject, &target)
                .await?;
            let is_owner = matches!(
                (&subject, target.owner),
                (Subject::User(user_id), Some(owner)) if *user_id == owner
            );
            (perms, is_owner)
        }
    };

    let mut permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
    permissions.sort();

    Ok(Json(EffectiveResponse {
        object_type: params.object_type,
        object_id: params.object_id,
        permissions,
        is_owner,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ObjectsParams {
    /// Permission as "namespace.codename"; unknown permissions are a 400.
    pub permission: String,
    pub object_type: String,
    /// Include objects the caller owns even without a matching grant.
    #[serde(default)]
    pub include_owned: bool,
    /// List for a group principal instead of the caller.
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ObjectsResponse {
    pub object_type: String,
    pub permission: String,
    pub object_ids: Vec<Uuid>,
}

#[utoipa::path(
    get,
    path = "/authz/objects",
    tag = "Authz",
    params(ObjectsParams),
    responses(
        (status = 200, description = "Accessible object ids", body = ObjectsResponse),
        (status = 400, description = "Unknown permission"),
    )
)]
pub async fn objects(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Query(params): Query<ObjectsParams>,
) -> AppResult<Json<ObjectsResponse>> {
    let subject = match params.group_id {
        Some(group_id) => Subject::Group(group_id),
        None => caller.subject(),
    };
    let owned = if params.include_owned {
        OwnedVisibility::IncludeOwned
    } else {
        OwnedVisibility::MappedOnly
    };

    let ids = state
        .evaluator
        .objects_with_permission(&subject, &params.permission, &params.object_type, owned, Utc::now())
        .await?;

    let mut object_ids: Vec<Uuid> = ids.into_iter().collect();
    object_ids.sort();

    Ok(Json(ObjectsResponse {
        object_type: params.object_type,
        permission: params.permission,
        object_ids,
    }))
}
