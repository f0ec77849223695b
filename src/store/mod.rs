//! Identity store collaborators.
//!
//! The relational store holding users, groups, permissions and entity types,
//! and the index of object-scoped grants. Both are traits so the resolver and
//! the reconciliation engine can run against any backing store; SQLite
//! implementations are provided.

mod object_index;
mod sqlite;

pub use object_index::{ObjectPermissionIndex, ObjectRef, SqliteObjectPermissionIndex};
pub use sqlite::SqliteIdentityStore;

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{EntityType, EntityTypeRef, Group, Permission, User};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_entity_type(&self, key: &EntityTypeRef) -> AppResult<Option<EntityType>>;

    /// Returns the entity type and whether it was newly created.
    async fn get_or_create_entity_type(&self, key: &EntityTypeRef) -> AppResult<(EntityType, bool)>;

    async fn find_permission(&self, entity_type: &EntityType, codename: &str) -> AppResult<Option<Permission>>;

    /// Fetch by `(entity_type, codename)`, inserting with `description` when absent.
    async fn get_or_create_permission(
        &self,
        entity_type: &EntityType,
        codename: &str,
        description: &str,
    ) -> AppResult<(Permission, bool)>;

    /// Same key as [`IdentityStore::get_or_create_permission`], but an existing
    /// row's description is overwritten.
    async fn update_or_create_permission(
        &self,
        entity_type: &EntityType,
        codename: &str,
        description: &str,
    ) -> AppResult<(Permission, bool)>;

    /// Permissions stored under the global marker entity type.
    async fn global_permissions(&self) -> AppResult<Vec<Permission>>;

    async fn find_group(&self, name: &str) -> AppResult<Option<Group>>;

    async fn get_or_create_group(&self, name: &str) -> AppResult<(Group, bool)>;

    /// Replace the group's permission set with exactly `permission_ids`.
    async fn set_group_permissions(&self, group_id: Uuid, permission_ids: &[Uuid]) -> AppResult<()>;

    async fn group_permissions(&self, group_id: Uuid) -> AppResult<Vec<Permission>>;

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Whether `user` holds `identifier` (`namespace.codename`) directly or
    /// through a group. Activity and superuser status are not considered.
    async fn user_has_perm(&self, user: &User, identifier: &str) -> AppResult<bool>;

    /// Every identifier `user` holds, direct and group-inherited.
    async fn user_permissions(&self, user: &User) -> AppResult<HashSet<String>>;
}

/// Split `namespace.codename` at the first dot.
pub(crate) fn split_identifier(identifier: &str) -> Option<(&str, &str)> {
    let (namespace, codename) = identifier.split_once('.')?;
    if namespace.is_empty() || codename.is_empty() {
        return None;
    }
    Some((namespace, codename))
}
