use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::split_identifier;
use crate::errors::{AppError, AppResult};
use crate::models::{EntityTypeRef, User};
use crate::utils::utc_now;

/// Identity of one domain object: its entity type plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub entity: EntityTypeRef,
    pub id: String,
}

impl ObjectRef {
    pub fn new(app_label: &str, model: &str, id: impl Into<String>) -> Self {
        Self {
            entity: EntityTypeRef::new(app_label, model),
            id: id.into(),
        }
    }

    /// Parse `app_label.model:id`.
    pub fn parse(value: &str) -> Option<Self> {
        let (entity, id) = value.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            entity: EntityTypeRef::parse(entity)?,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.id)
    }
}

/// Index of grants restricted to a single object.
#[async_trait]
pub trait ObjectPermissionIndex: Send + Sync {
    async fn grant(&self, identifier: &str, user: &User, object: &ObjectRef) -> AppResult<()>;

    async fn check(&self, user: &User, identifier: &str, object: &ObjectRef) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
pub struct SqliteObjectPermissionIndex {
    pool: SqlitePool,
}

impl SqliteObjectPermissionIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn permission_id(&self, identifier: &str) -> AppResult<Option<String>> {
        let Some((namespace, codename)) = split_identifier(identifier) else {
            return Ok(None);
        };

        let id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.id
            FROM auth_permissions p
            INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
            WHERE et.app_label = ? AND p.codename = ?
            "#,
        )
        .bind(namespace)
        .bind(codename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl ObjectPermissionIndex for SqliteObjectPermissionIndex {
    async fn grant(&self, identifier: &str, user: &User, object: &ObjectRef) -> AppResult<()> {
        let permission_id = self
            .permission_id(identifier)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permission {}", identifier)))?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO object_permissions
                (id, user_id, permission_id, object_app_label, object_model, object_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.id.to_string())
        .bind(&permission_id)
        .bind(&object.entity.app_label)
        .bind(&object.entity.model)
        .bind(&object.id)
        .bind(utc_now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user.id, permission = %identifier, object = %object, "object permission granted");
        Ok(())
    }

    async fn check(&self, user: &User, identifier: &str, object: &ObjectRef) -> AppResult<bool> {
        let Some((namespace, codename)) = split_identifier(identifier) else {
            return Ok(false);
        };

        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM object_permissions op
                INNER JOIN auth_permissions p ON p.id = op.permission_id
                INNER JOIN auth_entity_types et ON et.id = p.entity_type_id
                WHERE op.user_id = ?
                  AND et.app_label = ? AND p.codename = ?
                  AND op.object_app_label = ? AND op.object_model = ? AND op.object_id = ?
            )
            "#,
        )
        .bind(user.id.to_string())
        .bind(namespace)
        .bind(codename)
        .bind(&object.entity.app_label)
        .bind(&object.entity.model)
        .bind(&object.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(found != 0)
    }
}
