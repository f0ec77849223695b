use std::sync::Arc;

use async_trait::async_trait;

use super::reference::PermissionRef;
use crate::declarations::{DeclarationRegistry, PermissionDeclaration};
use crate::errors::AppResult;
use crate::models::User;
use crate::store::{IdentityStore, ObjectPermissionIndex, ObjectRef};

/// Pluggable authorization backend
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Check whether `user` holds `permission`, optionally for one `object`
    async fn has_permission(
        &self,
        user: &User,
        permission: PermissionRef<'_>,
        object: Option<&ObjectRef>,
    ) -> AppResult<bool>;
}

/// Default backend, resolving declarations against the identity store
///
/// Evaluation order:
/// 1. no permission reference -> deny
/// 2. inactive user -> deny
/// 3. active superuser -> allow
/// 4. no object: direct or group grant in the store
/// 5. object: the declaration's custom check, else the object-permission index
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<DeclarationRegistry>,
    store: Arc<dyn IdentityStore>,
    objects: Option<Arc<dyn ObjectPermissionIndex>>,
}

impl Resolver {
    pub fn new(registry: Arc<DeclarationRegistry>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            registry,
            store,
            objects: None,
        }
    }

    pub fn with_object_index(mut self, objects: Arc<dyn ObjectPermissionIndex>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn registry(&self) -> &Arc<DeclarationRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    fn declaration_for<'a>(&'a self, permission: &PermissionRef<'a>) -> Option<&'a PermissionDeclaration> {
        match permission.declaration() {
            Some(declaration) => Some(declaration),
            None => permission
                .identifier()
                .and_then(|identifier| self.registry.lookup(identifier))
                .map(|declaration| declaration.as_ref()),
        }
    }

    async fn has_object_permission(
        &self,
        user: &User,
        permission: &PermissionRef<'_>,
        identifier: &str,
        object: &ObjectRef,
    ) -> AppResult<bool> {
        if let Some(check) = self.declaration_for(permission).and_then(|d| d.object_check()) {
            let allowed = check.has_object_permission(user, object).await;
            tracing::debug!(
                user_id = %user.id,
                permission = %identifier,
                object = %object,
                allowed,
                "custom object check"
            );
            return Ok(allowed);
        }

        match &self.objects {
            Some(index) => index.check(user, identifier, object).await,
            None => {
                tracing::debug!(
                    user_id = %user.id,
                    permission = %identifier,
                    object = %object,
                    "no object permission index configured"
                );
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl PermissionBackend for Resolver {
    async fn has_permission(
        &self,
        user: &User,
        permission: PermissionRef<'_>,
        object: Option<&ObjectRef>,
    ) -> AppResult<bool> {
        let Some(identifier) = permission.identifier() else {
            return Ok(false);
        };

        if !user.is_active {
            tracing::debug!(user_id = %user.id, permission = %identifier, "inactive user denied");
            return Ok(false);
        }

        if user.is_superuser {
            tracing::debug!(user_id = %user.id, permission = %identifier, "superuser bypass");
            return Ok(true);
        }

        let allowed = match object {
            None => self.store.user_has_perm(user, identifier).await?,
            Some(object) => self.has_object_permission(user, &permission, identifier, object).await?,
        };

        tracing::debug!(user_id = %user.id, permission = %identifier, allowed, "permission resolved");
        Ok(allowed)
    }
}
