//! Row decoding helpers.
//!
//! All tables store uuids and timestamps as TEXT; these parsers centralize
//! the string handling so the queries stay plain `sqlx::query` calls.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::group::Group;
use crate::models::rbac::{GenericMapping, GroupMapping, Permission, Role, SecuredObject, UserMapping};
use crate::models::user::DbUser;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

pub fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

pub fn parse_opt_date(s: Option<String>) -> Result<Option<NaiveDate>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| AppError::internal(format!("invalid date: {}", e))),
        _ => Ok(None),
    }
}

fn get_string(row: &SqliteRow, col: &str) -> Result<String, AppError> {
    row.try_get(col)
        .map_err(|e| AppError::internal(format!("missing {}: {}", col, e)))
}

fn get_opt_string(row: &SqliteRow, col: &str) -> Result<Option<String>, AppError> {
    row.try_get(col)
        .map_err(|e| AppError::internal(format!("missing {}: {}", col, e)))
}

pub fn get_uuid(row: &SqliteRow, col: &str) -> Result<Uuid, AppError> {
    let raw = get_string(row, col)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", col, e)))
}

pub fn get_opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, AppError> {
    match get_opt_string(row, col)? {
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", col, e))),
        None => Ok(None),
    }
}

pub fn get_datetime(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&get_string(row, col)?)
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let is_org_member: i64 = row
        .try_get("is_org_member")
        .map_err(|e| AppError::internal(format!("missing is_org_member: {}", e)))?;

    Ok(DbUser {
        id: get_uuid(row, "id")?,
        name: get_string(row, "name")?,
        email: get_string(row, "email")?,
        password_hash: get_string(row, "password_hash")?,
        is_org_member: is_org_member != 0,
        member_expiration: parse_opt_date(get_opt_string(row, "member_expiration")?)?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: parse_opt_datetime(get_opt_string(row, "deleted_at")?)?,
    })
}

pub fn group_from_row(row: &SqliteRow) -> Result<Group, AppError> {
    Ok(Group {
        id: get_uuid(row, "id")?,
        name: get_string(row, "name")?,
        description: get_opt_string(row, "description")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn permission_from_row(row: &SqliteRow) -> Result<Permission, AppError> {
    Ok(Permission {
        id: get_uuid(row, "id")?,
        namespace: get_string(row, "namespace")?,
        codename: get_string(row, "codename")?,
        description: get_opt_string(row, "description")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn role_from_row(row: &SqliteRow) -> Result<Role, AppError> {
    Ok(Role {
        id: get_uuid(row, "id")?,
        name: get_string(row, "name")?,
        description: get_opt_string(row, "description")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn secured_object_from_row(row: &SqliteRow) -> Result<SecuredObject, AppError> {
    Ok(SecuredObject {
        object_type: get_string(row, "object_type")?,
        object_id: get_uuid(row, "object_id")?,
        owner_id: get_opt_uuid(row, "owner_id")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn generic_mapping_from_row(row: &SqliteRow) -> Result<GenericMapping, AppError> {
    Ok(GenericMapping {
        id: get_uuid(row, "id")?,
        object_type: get_string(row, "object_type")?,
        object_id: get_uuid(row, "object_id")?,
        subject_class: get_string(row, "subject_class")?,
        role_id: get_uuid(row, "role_id")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn user_mapping_from_row(row: &SqliteRow) -> Result<UserMapping, AppError> {
    Ok(UserMapping {
        id: get_uuid(row, "id")?,
        object_type: get_string(row, "object_type")?,
        object_id: get_uuid(row, "object_id")?,
        user_id: get_uuid(row, "user_id")?,
        role_id: get_uuid(row, "role_id")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn group_mapping_from_row(row: &SqliteRow) -> Result<GroupMapping, AppError> {
    Ok(GroupMapping {
        id: get_uuid(row, "id")?,
        object_type: get_string(row, "object_type")?,
        object_id: get_uuid(row, "object_id")?,
        group_id: get_uuid(row, "group_id")?,
        role_id: get_uuid(row, "role_id")?,
        created_at: get_datetime(row, "created_at")?,
    })
}
