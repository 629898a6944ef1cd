use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use granular::create_app;

async fn setup() -> Result<(Router, SqlitePool, tempfile::TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_checks.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    Ok((app, pool, dir))
}

async fn post_json(app: &Router, uri: &str, token: Option<&str>, body: Value) -> Result<Response> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    Ok(app.clone().oneshot(builder.body(Body::from(body.to_string()))?).await?)
}

async fn json_body(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn register_user(app: &Router, name: &str, email: &str) -> Result<(String, Uuid)> {
    let resp = post_json(
        app,
        "/auth/register",
        None,
        json!({ "name": name, "email": email, "password": "password123" }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await?;
    let token = body.get("token").and_then(|v| v.as_str()).context("missing token")?.to_string();
    let user_id = body
        .pointer("/user/id")
        .and_then(|v| v.as_str())
        .context("missing user id")?
        .parse()?;
    Ok((token, user_id))
}

/// Create a permission and a role granting it; returns (permission_id, role_id).
async fn viewer_fixture(app: &Router, token: &str) -> Result<(Uuid, Uuid)> {
    let resp = post_json(
        app,
        "/rbac/permissions",
        Some(token),
        json!({ "namespace": "base", "codename": "view_resourcebase" }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let permission_id: Uuid = json_body(resp).await?["id"].as_str().context("missing id")?.parse()?;

    let resp = post_json(app, "/rbac/roles", Some(token), json!({ "name": "viewer" })).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let role_id: Uuid = json_body(resp).await?["id"].as_str().context("missing id")?.parse()?;

    let resp = post_json(
        app,
        &format!("/rbac/roles/{}/permissions", role_id),
        Some(token),
        json!({ "permission_id": permission_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    Ok((permission_id, role_id))
}

async fn check(app: &Router, token: Option<&str>, permission: &str, object_type: &str, object_id: Uuid) -> Result<bool> {
    let resp = post_json(
        app,
        "/authz/check",
        token,
        json!({ "permission": permission, "object_type": object_type, "object_id": object_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await?;
    body.get("allowed").and_then(|v| v.as_bool()).context("missing allowed")
}

#[tokio::test]
async fn anonymous_generic_mapping_grants_exactly_its_role_permissions() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (admin_token, admin_id) = register_user(&app, "Admin", "admin@example.com").await?;
    let (_, role_id) = viewer_fixture(&app, &admin_token).await?;

    // also register the change permission so both names resolve
    let resp = post_json(
        &app,
        "/rbac/permissions",
        Some(&admin_token),
        json!({ "namespace": "base", "codename": "change_resourcebase" }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let object_id = Uuid::new_v4();
    let resp = post_json(
        &app,
        "/objects",
        Some(&admin_token),
        json!({ "object_type": "map", "object_id": object_id, "owner_id": admin_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = post_json(
        &app,
        &format!("/objects/map/{}/generic-mappings", object_id),
        Some(&admin_token),
        json!({ "subject_class": "anonymous", "role_id": role_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Anonymous caller: viewer role grants view, nothing else.
    assert!(check(&app, None, "base.view_resourcebase", "map", object_id).await?);
    assert!(!check(&app, None, "base.change_resourcebase", "map", object_id).await?);

    // The anonymous floor applies to logged-in users too.
    let (user_token, _) = register_user(&app, "Reader", "reader@example.com").await?;
    assert!(check(&app, Some(&user_token), "base.view_resourcebase", "map", object_id).await?);

    Ok(())
}

#[tokio::test]
async fn owner_passes_without_any_mapping() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (owner_token, owner_id) = register_user(&app, "Owner", "owner@example.com").await?;
    let (other_token, _) = register_user(&app, "Other", "other@example.com").await?;

    let object_id = Uuid::new_v4();
    let resp = post_json(
        &app,
        "/objects",
        Some(&owner_token),
        json!({ "object_type": "map", "object_id": object_id, "owner_id": owner_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Zero mappings exist; the owner still passes every check.
    assert!(check(&app, Some(&owner_token), "base.delete_resourcebase", "map", object_id).await?);

    // A different user does not.
    assert!(!check(&app, Some(&other_token), "base.delete_resourcebase", "map", object_id).await?);

    // And anonymous does not.
    assert!(!check(&app, None, "base.delete_resourcebase", "map", object_id).await?);

    Ok(())
}

#[tokio::test]
async fn unregistered_object_denies_without_error() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let allowed = check(&app, None, "base.view_resourcebase", "layer", Uuid::new_v4()).await?;
    assert!(!allowed);

    Ok(())
}

#[tokio::test]
async fn malformed_permission_string_is_rejected() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let resp = post_json(
        &app,
        "/authz/check",
        None,
        json!({ "permission": "bogus", "object_type": "map", "object_id": Uuid::new_v4() }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await?;
    assert_eq!(body.get("error").and_then(|v| v.as_str()), Some("unknown_permission"));

    Ok(())
}

#[tokio::test]
async fn effective_permissions_reflect_user_mappings() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (admin_token, admin_id) = register_user(&app, "Admin", "admin2@example.com").await?;
    let (user_token, user_id) = register_user(&app, "Editor", "editor@example.com").await?;
    let (_, role_id) = viewer_fixture(&app, &admin_token).await?;

    let object_id = Uuid::new_v4();
    let resp = post_json(
        &app,
        "/objects",
        Some(&admin_token),
        json!({ "object_type": "map", "object_id": object_id, "owner_id": admin_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = post_json(
        &app,
        &format!("/objects/map/{}/user-mappings", object_id),
        Some(&admin_token),
        json!({ "user_id": user_id, "role_id": role_id }),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // The mapped user sees the viewer permissions in its effective set.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/authz/effective?object_type=map&object_id={}", object_id))
        .header("authorization", format!("Bearer {}", user_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await?;
    let perms: Vec<&str> = body["permissions"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
    assert_eq!(perms, vec!["base.view_resourcebase"]);

    // Anonymous sees an empty set on the same object.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/authz/effective?object_type=map&object_id={}", object_id))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await?;
    assert!(body["permissions"].as_array().unwrap().is_empty());

    Ok(())
}
