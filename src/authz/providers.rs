use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::parse_opt_date;
use crate::errors::AppError;

/// Org membership facts about a user, as the resolver consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgProfile {
    pub is_org_member: bool,
    pub member_expiration: Option<NaiveDate>,
}

impl OrgProfile {
    /// Membership counts only while flagged AND carrying an unexpired date.
    /// A missing date means not active, never an error.
    pub fn is_active(&self, on: NaiveDate) -> bool {
        self.is_org_member && self.member_expiration.map(|d| d >= on).unwrap_or(false)
    }
}

#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn profile_of(&self, user: Uuid) -> Result<Option<OrgProfile>, AppError>;
}

/// Concrete group memberships for a user. Absence of this collaborator on
/// the evaluator means the groups subsystem is not installed.
#[async_trait]
pub trait GroupProvider: Send + Sync {
    async fn groups_for(&self, user: Uuid) -> Result<Vec<Uuid>, AppError>;
}

pub struct SqlProfileProvider {
    pool: SqlitePool,
}

impl SqlProfileProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileProvider for SqlProfileProvider {
    async fn profile_of(&self, user: Uuid) -> Result<Option<OrgProfile>, AppError> {
        let row = sqlx::query(
            "SELECT is_org_member, member_expiration FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(user.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let is_org_member: i64 = row
            .try_get("is_org_member")
            .map_err(|e| AppError::internal(format!("missing is_org_member: {}", e)))?;
        let member_expiration: Option<String> = row
            .try_get("member_expiration")
            .map_err(|e| AppError::internal(format!("missing member_expiration: {}", e)))?;

        Ok(Some(OrgProfile {
            is_org_member: is_org_member != 0,
            member_expiration: parse_opt_date(member_expiration)?,
        }))
    }
}

pub struct SqlGroupProvider {
    pool: SqlitePool,
}

impl SqlGroupProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupProvider for SqlGroupProvider {
    async fn groups_for(&self, user: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query("SELECT group_id FROM group_memberships WHERE user_id = ?")
            .bind(user.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| crate::db::row_parsers::get_uuid(row, "group_id"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn active_membership_requires_unexpired_date() {
        let profile = OrgProfile {
            is_org_member: true,
            member_expiration: Some(date("2030-01-01")),
        };
        assert!(profile.is_active(date("2026-08-07")));
        assert!(!profile.is_active(date("2031-01-01")));
    }

    #[test]
    fn missing_expiration_is_inactive() {
        let profile = OrgProfile {
            is_org_member: true,
            member_expiration: None,
        };
        assert!(!profile.is_active(date("2026-08-07")));
    }

    #[test]
    fn non_member_flag_wins_over_date() {
        let profile = OrgProfile {
            is_org_member: false,
            member_expiration: Some(date("2030-01-01")),
        };
        assert!(!profile.is_active(date("2026-08-07")));
    }
}
