use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// PERMISSION
// =============================================================================

/// Reference data: an action identified by (namespace, codename), rendered as
/// "namespace.codename" on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "base")]
    pub namespace: String,
    #[schema(example = "view_resourcebase")]
    pub codename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "base")]
    pub namespace: String,
    #[schema(example = "view_resourcebase")]
    pub codename: String,
    #[schema(example = "View a catalog resource")]
    pub description: Option<String>,
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "viewer")]
    pub name: String,
    #[schema(example = "Read-only access to a resource")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for RolePermission {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> Uuid { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignPermissionToRoleRequest {
    pub permission_id: Uuid,
}

// =============================================================================
// SECURED OBJECTS
// =============================================================================

/// Registry row for a protected entity. Object types not present here are
/// unsupported: evaluation yields no permissions rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecuredObject {
    #[schema(example = "map")]
    pub object_type: String,
    pub object_id: Uuid,
    /// The owner, when set, passes every permission check on this object.
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for SecuredObject {
    fn entity_type() -> &'static str { "secured_object" }
    fn subject_id(&self) -> Uuid { self.object_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterObjectRequest {
    #[schema(example = "map")]
    pub object_type: String,
    pub object_id: Uuid,
    pub owner_id: Option<Uuid>,
}

// =============================================================================
// ROLE MAPPINGS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenericMapping {
    pub id: Uuid,
    pub object_type: String,
    pub object_id: Uuid,
    #[schema(example = "anonymous")]
    pub subject_class: String,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for GenericMapping {
    fn entity_type() -> &'static str { "generic_mapping" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserMapping {
    pub id: Uuid,
    pub object_type: String,
    pub object_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for UserMapping {
    fn entity_type() -> &'static str { "user_mapping" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupMapping {
    pub id: Uuid,
    pub object_type: String,
    pub object_id: Uuid,
    pub group_id: Uuid,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for GroupMapping {
    fn entity_type() -> &'static str { "group_mapping" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenericMappingCreateRequest {
    /// One of "anonymous", "authenticated", "customgroup".
    #[schema(example = "anonymous")]
    pub subject_class: String,
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserMappingCreateRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupMappingCreateRequest {
    pub group_id: Uuid,
    pub role_id: Uuid,
}

/// All mappings attached to one secured object, the shape the permissions
/// panel edits.
#[derive(Debug, Serialize, ToSchema)]
pub struct ObjectMappings {
    pub object_type: String,
    pub object_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub generic: Vec<GenericMapping>,
    pub users: Vec<UserMapping>,
    pub groups: Vec<GroupMapping>,
}
