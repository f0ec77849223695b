use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{EntityType, Group, Permission, User};

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z), which is what the store writes
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn get_string(row: &SqliteRow, column: &str) -> Result<String, AppError> {
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let raw = get_string(row, column)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", column, e)))
}

fn get_datetime(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&get_string(row, column)?)
}

fn get_flag(row: &SqliteRow, column: &str) -> Result<bool, AppError> {
    let value: i64 = row
        .try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))?;
    Ok(value != 0)
}

pub fn entity_type_from_row(row: &SqliteRow) -> Result<EntityType, AppError> {
    Ok(EntityType {
        id: get_uuid(row, "id")?,
        app_label: get_string(row, "app_label")?,
        model: get_string(row, "model")?,
    })
}

/// Expects the permission columns plus `namespace` (the entity type's app label).
pub fn permission_from_row(row: &SqliteRow) -> Result<Permission, AppError> {
    Ok(Permission {
        id: get_uuid(row, "id")?,
        entity_type_id: get_uuid(row, "entity_type_id")?,
        namespace: get_string(row, "namespace")?,
        codename: get_string(row, "codename")?,
        description: get_string(row, "description")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn group_from_row(row: &SqliteRow) -> Result<Group, AppError> {
    Ok(Group {
        id: get_uuid(row, "id")?,
        name: get_string(row, "name")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    Ok(User {
        id: get_uuid(row, "id")?,
        username: get_string(row, "username")?,
        is_active: get_flag(row, "is_active")?,
        is_superuser: get_flag(row, "is_superuser")?,
        created_at: get_datetime(row, "created_at")?,
    })
}
