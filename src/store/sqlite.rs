use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{split_identifier, IdentityStore};
use crate::db::row_parsers::{entity_type_from_row, group_from_row, permission_from_row, user_from_row};
use crate::errors::{AppError, AppResult};
use crate::models::{
    EntityType, EntityTypeRef, Group, Permission, User, GLOBAL_NAMESPACE, GLOBAL_PERMISSION_MODEL,
};
use crate::utils::utc_now;

const PERMISSION_SELECT: &str = r#"
    SELECT p.id, p.entity_type_id, et.app_label AS namespace, p.codename, p.description,
           p.created_at, p.updated_at
    FROM auth_permissions p
    INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
"#;

const USER_SELECT: &str = "SELECT id, username, is_active, is_superuser, created_at FROM auth_users";

/// [`IdentityStore`] backed by the `auth_*` tables.
#[derive(Debug, Clone)]
pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Make an entity type known to the store so permissions can target it.
    pub async fn register_entity_type(&self, app_label: &str, model: &str) -> AppResult<EntityType> {
        let (entity_type, created) = self
            .get_or_create_entity_type(&EntityTypeRef::new(app_label, model))
            .await?;
        if created {
            tracing::info!(app_label = %entity_type.app_label, model = %entity_type.model, "entity type registered");
        }
        Ok(entity_type)
    }

    pub async fn create_user(&self, username: &str, is_superuser: bool) -> AppResult<User> {
        let id = Uuid::new_v4();
        let now = utc_now();

        sqlx::query(
            "INSERT INTO auth_users (id, username, is_active, is_superuser, created_at) VALUES (?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(username)
        .bind(is_superuser)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::internal(format!("user {} vanished after insert", username)))
    }

    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE auth_users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("user {}", user_id)));
        }
        Ok(())
    }

    pub async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let sql = format!("{} WHERE username = ?", USER_SELECT);
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn find_permission_by_identifier(&self, identifier: &str) -> AppResult<Option<Permission>> {
        let Some((namespace, codename)) = split_identifier(identifier) else {
            return Ok(None);
        };

        let sql = format!("{} WHERE et.app_label = ? AND p.codename = ?", PERMISSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(namespace)
            .bind(codename)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(permission_from_row).transpose()
    }

    pub async fn grant_user_permission(&self, user_id: Uuid, permission_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO auth_user_permissions (user_id, permission_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(permission_id.to_string())
        .bind(utc_now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_user_to_group(&self, user_id: Uuid, group_id: Uuid) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO auth_user_groups (user_id, group_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id.to_string())
            .bind(group_id.to_string())
            .bind(utc_now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let sql = format!("{} ORDER BY et.app_label, p.codename", PERMISSION_SELECT);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(permission_from_row).collect()
    }

    pub async fn count_permissions(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM auth_permissions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch_permission(&self, entity_type: &EntityType, codename: &str) -> AppResult<Permission> {
        self.find_permission(entity_type, codename).await?.ok_or_else(|| {
            AppError::internal(format!("permission {}.{} vanished after write", entity_type.app_label, codename))
        })
    }

    /// Insert unless the key already exists. Returns whether a row was written.
    async fn insert_permission(&self, entity_type: &EntityType, codename: &str, description: &str) -> AppResult<bool> {
        let now = utc_now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO auth_permissions (id, entity_type_id, codename, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (entity_type_id, codename) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entity_type.id.to_string())
        .bind(codename)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn get_entity_type(&self, key: &EntityTypeRef) -> AppResult<Option<EntityType>> {
        let row = sqlx::query("SELECT id, app_label, model FROM auth_entity_types WHERE app_label = ? AND model = ?")
            .bind(&key.app_label)
            .bind(&key.model)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entity_type_from_row).transpose()
    }

    async fn get_or_create_entity_type(&self, key: &EntityTypeRef) -> AppResult<(EntityType, bool)> {
        if let Some(existing) = self.get_entity_type(key).await? {
            return Ok((existing, false));
        }

        let result = sqlx::query(
            "INSERT INTO auth_entity_types (id, app_label, model) VALUES (?, ?, ?) ON CONFLICT (app_label, model) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&key.app_label)
        .bind(&key.model)
        .execute(&self.pool)
        .await?;

        let entity_type = self
            .get_entity_type(key)
            .await?
            .ok_or_else(|| AppError::internal(format!("entity type {} vanished after insert", key)))?;

        Ok((entity_type, result.rows_affected() == 1))
    }

    async fn find_permission(&self, entity_type: &EntityType, codename: &str) -> AppResult<Option<Permission>> {
        let sql = format!("{} WHERE p.entity_type_id = ? AND p.codename = ?", PERMISSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(entity_type.id.to_string())
            .bind(codename)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(permission_from_row).transpose()
    }

    async fn get_or_create_permission(
        &self,
        entity_type: &EntityType,
        codename: &str,
        description: &str,
    ) -> AppResult<(Permission, bool)> {
        if let Some(existing) = self.find_permission(entity_type, codename).await? {
            return Ok((existing, false));
        }

        let created = self.insert_permission(entity_type, codename, description).await?;
        Ok((self.fetch_permission(entity_type, codename).await?, created))
    }

    async fn update_or_create_permission(
        &self,
        entity_type: &EntityType,
        codename: &str,
        description: &str,
    ) -> AppResult<(Permission, bool)> {
        let created = match self.find_permission(entity_type, codename).await? {
            Some(existing) if existing.description == description => return Ok((existing, false)),
            Some(_) => false,
            None => self.insert_permission(entity_type, codename, description).await?,
        };

        if !created {
            sqlx::query(
                "UPDATE auth_permissions SET description = ?, updated_at = ? WHERE entity_type_id = ? AND codename = ?",
            )
            .bind(description)
            .bind(utc_now().to_rfc3339())
            .bind(entity_type.id.to_string())
            .bind(codename)
            .execute(&self.pool)
            .await?;
        }

        Ok((self.fetch_permission(entity_type, codename).await?, created))
    }

    async fn global_permissions(&self) -> AppResult<Vec<Permission>> {
        let sql = format!(
            "{} WHERE et.app_label = ? AND et.model = ? ORDER BY p.codename",
            PERMISSION_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(GLOBAL_NAMESPACE)
            .bind(GLOBAL_PERMISSION_MODEL)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(permission_from_row).collect()
    }

    async fn find_group(&self, name: &str) -> AppResult<Option<Group>> {
        let row = sqlx::query("SELECT id, name, created_at, updated_at FROM auth_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    async fn get_or_create_group(&self, name: &str) -> AppResult<(Group, bool)> {
        if let Some(existing) = self.find_group(name).await? {
            return Ok((existing, false));
        }

        let now = utc_now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO auth_groups (id, name, created_at, updated_at) VALUES (?, ?, ?, ?) ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let group = self
            .find_group(name)
            .await?
            .ok_or_else(|| AppError::internal(format!("group {} vanished after insert", name)))?;

        Ok((group, result.rows_affected() == 1))
    }

    async fn set_group_permissions(&self, group_id: Uuid, permission_ids: &[Uuid]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM auth_group_permissions WHERE group_id = ?")
            .bind(group_id.to_string())
            .execute(&mut *tx)
            .await?;

        for permission_id in permission_ids {
            sqlx::query("INSERT OR IGNORE INTO auth_group_permissions (group_id, permission_id) VALUES (?, ?)")
                .bind(group_id.to_string())
                .bind(permission_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn group_permissions(&self, group_id: Uuid) -> AppResult<Vec<Permission>> {
        let sql = format!(
            "{} INNER JOIN auth_group_permissions gp ON gp.permission_id = p.id WHERE gp.group_id = ? ORDER BY et.app_label, p.codename",
            PERMISSION_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(group_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(permission_from_row).collect()
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("{} WHERE id = ?", USER_SELECT);
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_has_perm(&self, user: &User, identifier: &str) -> AppResult<bool> {
        let Some((namespace, codename)) = split_identifier(identifier) else {
            return Ok(false);
        };

        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM auth_permissions p
                INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
                WHERE et.app_label = ? AND p.codename = ?
                  AND (
                    p.id IN (SELECT permission_id FROM auth_user_permissions WHERE user_id = ?)
                    OR p.id IN (
                        SELECT gp.permission_id
                        FROM auth_group_permissions gp
                        INNER JOIN auth_user_groups ug ON ug.group_id = gp.group_id
                        WHERE ug.user_id = ?
                    )
                  )
            )
            "#,
        )
        .bind(namespace)
        .bind(codename)
        .bind(user.id.to_string())
        .bind(user.id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(found != 0)
    }

    async fn user_permissions(&self, user: &User) -> AppResult<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT et.app_label AS namespace, p.codename
            FROM auth_permissions p
            INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
            INNER JOIN auth_user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = ?
            UNION
            SELECT et.app_label AS namespace, p.codename
            FROM auth_permissions p
            INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
            INNER JOIN auth_group_permissions gp ON gp.permission_id = p.id
            INNER JOIN auth_user_groups ug ON ug.group_id = gp.group_id
            WHERE ug.user_id = ?
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> AppResult<String> {
                let namespace: String = r.try_get("namespace")?;
                let codename: String = r.try_get("codename")?;
                Ok(format!("{}.{}", namespace, codename))
            })
            .collect()
    }
}
