use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	components(
		schemas(
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::OrgProfileUpdateRequest,
			models::group::Group,
			models::group::GroupCreateRequest,
			models::group::AddMemberRequest,
			models::group::GroupMembership,
			models::rbac::Permission,
			models::rbac::PermissionCreateRequest,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::AssignPermissionToRoleRequest,
			models::rbac::SecuredObject,
			models::rbac::RegisterObjectRequest,
			models::rbac::GenericMapping,
			models::rbac::UserMapping,
			models::rbac::GroupMapping,
			models::rbac::GenericMappingCreateRequest,
			models::rbac::UserMappingCreateRequest,
			models::rbac::GroupMappingCreateRequest,
			models::rbac::ObjectMappings,
			routes::checks::CheckRequest,
			routes::checks::CheckResponse,
			routes::checks::EffectiveResponse,
			routes::checks::ObjectsResponse
		)
	),
	tags(
		(name = "Auth", description = "Authentication and org profiles"),
		(name = "Groups", description = "Groups subsystem"),
		(name = "RBAC", description = "Roles and permission reference data"),
		(name = "Objects", description = "Secured objects and their grants"),
		(name = "Authz", description = "Authorization queries"),
		(name = "Health", description = "Service health")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	// bearer scheme so Swagger UI's Authorize dialog works
	if let Some(components) = doc.pointer_mut("/components").and_then(|c| c.as_object_mut()) {
		let schemes = components
			.entry("securitySchemes")
			.or_insert_with(|| serde_json::json!({}));
		if let Some(schemes) = schemes.as_object_mut() {
			schemes.insert(
				"bearerAuth".to_string(),
				serde_json::json!({
					"type": "http",
					"scheme": "bearer",
					"bearerFormat": "JWT"
				}),
			);
		}
	}

	if doc.get("servers").is_none() {
		doc["servers"] = serde_json::json!([
			{ "url": format!("http://localhost:{}", port) }
		]);
	}

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}
