use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Whether the account belongs to the deployment's organization.
    pub is_org_member: bool,
    /// Org membership is honored only while this date is set and not in the
    /// past; an expired or absent date silently drops the membership.
    #[schema(value_type = Option<String>, example = "2030-06-30")]
    pub member_expiration: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_org_member: bool,
    pub member_expiration: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DbUser> for User {
    fn from(db: DbUser) -> Self {
        User {
            id: db.id,
            name: db.name,
            email: db.email,
            is_org_member: db.is_org_member,
            member_expiration: db.member_expiration,
            created_at: db.created_at,
            updated_at: db.updated_at,
            deleted_at: db.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Admin-set organization membership fields. The expiration date is an ISO
/// `YYYY-MM-DD` string.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OrgProfileUpdateRequest {
    pub is_org_member: bool,
    #[schema(example = "2030-06-30")]
    pub member_expiration: Option<String>,
}

/// Org membership updates affect authorization outcomes, so they are kept
/// long-term in the activity log.
#[derive(Debug, Clone, Serialize)]
pub struct OrgProfileChange {
    pub user_id: Uuid,
    pub is_org_member: bool,
    pub member_expiration: Option<NaiveDate>,
}

impl Loggable for OrgProfileChange {
    fn entity_type() -> &'static str { "org_profile" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}
