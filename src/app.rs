use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{
    AuthzConfig, GroupProvider, PermissionEvaluator, SqlGroupProvider, SqlMappingStore, SqlProfileProvider,
    SqlRoleRegistry,
};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, checks, groups, health, objects, rbac};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub evaluator: Arc<PermissionEvaluator>,
    pub event_bus: EventBus,
}

fn groups_enabled_from_env() -> bool {
    std::env::var("GROUPS_ENABLED")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(true)
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_config = AuthzConfig::from_env();

    let group_provider: Option<Arc<dyn GroupProvider>> = if groups_enabled_from_env() {
        Some(Arc::new(SqlGroupProvider::new(pool.clone())))
    } else {
        None
    };

    let evaluator = Arc::new(PermissionEvaluator::new(
        Arc::new(SqlMappingStore::new(pool.clone())),
        Arc::new(SqlRoleRegistry::new(pool.clone())),
        Arc::new(SqlProfileProvider::new(pool.clone())),
        group_provider,
        authz_config,
    ));

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState {
        pool,
        jwt: Arc::new(jwt_config),
        evaluator,
        event_bus,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/users/:user_id/org-profile", put(auth::update_org_profile));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/groups", groups::routes())
        .nest("/rbac", rbac::routes())
        .nest("/objects", objects::routes())
        .nest("/authz", checks::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
