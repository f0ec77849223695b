//! Reconciliation of declarations into the identity store.
//!
//! Permissions are upserted first, then groups, then each group's permission
//! set is replaced wholesale. Re-running with unchanged declarations changes
//! nothing. Errors abort the run; rows already written stay written.

use serde::Serialize;

use crate::declarations::DeclarationRegistry;
use crate::errors::{AppError, AppResult};
use crate::settings::Settings;
use crate::store::IdentityStore;

/// Counts of what a reconciliation run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub permissions_created: usize,
    pub permissions_updated: usize,
    pub permissions_unchanged: usize,
    pub groups_created: usize,
    pub groups_synced: usize,
}

pub struct Reconciler<'a> {
    registry: &'a DeclarationRegistry,
    store: &'a dyn IdentityStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a DeclarationRegistry, store: &'a dyn IdentityStore) -> Self {
        Self { registry, store }
    }

    /// Upsert every permission declared in an installed app's permissions namespace.
    pub async fn create_permissions(&self) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for app in self.registry.apps().apps() {
            for declaration in self.registry.permissions_module(app) {
                let before = match declaration.get(self.store).await {
                    Ok(existing) => Some(existing),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err),
                };
                let (permission, created) = declaration.update_or_create(self.store).await?;

                if created {
                    report.permissions_created += 1;
                    tracing::info!(app = %app.label, permission = %declaration.identifier(), "permission created");
                } else if before.is_some_and(|b| b.description != permission.description) {
                    report.permissions_updated += 1;
                    tracing::info!(app = %app.label, permission = %declaration.identifier(), "permission description updated");
                } else {
                    report.permissions_unchanged += 1;
                    tracing::debug!(app = %app.label, permission = %declaration.identifier(), "permission unchanged");
                }
            }
        }

        Ok(report)
    }

    /// Upsert the groups declared in `module` and replace their permission sets.
    /// Every listed permission must already be stored.
    pub async fn sync_groups(&self, module: &str) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for declaration in self.registry.groups_in(module) {
            let (group, created) = declaration.update_or_create(self.store).await?;
            if created {
                report.groups_created += 1;
            }

            let mut permission_ids = Vec::with_capacity(declaration.permissions().len());
            for permission in declaration.permissions() {
                permission_ids.push(permission.get(self.store).await?.id);
            }

            self.store.set_group_permissions(group.id, &permission_ids).await?;
            report.groups_synced += 1;
            tracing::info!(
                group = %group.name,
                created,
                permissions = permission_ids.len(),
                "group permissions synchronized"
            );
        }

        Ok(report)
    }

    /// Create permissions, then the groups of `default_groups_module`.
    pub async fn create_groups(&self, default_groups_module: Option<&str>) -> AppResult<ReconcileReport> {
        let permissions = self.create_permissions().await?;

        let module = default_groups_module
            .filter(|module| !module.trim().is_empty())
            .ok_or_else(|| AppError::configuration("DEFAULT_GROUPS_MODULE setting is not set"))?;

        if !self.registry.has_groups_module(module) {
            return Err(AppError::configuration(format!(
                "default groups module `{}` declares no groups",
                module
            )));
        }

        let groups = self.sync_groups(module).await?;

        Ok(ReconcileReport {
            groups_created: groups.groups_created,
            groups_synced: groups.groups_synced,
            ..permissions
        })
    }

    pub async fn synchronize_all(&self, settings: &Settings) -> AppResult<ReconcileReport> {
        self.create_groups(settings.default_groups_module.as_deref()).await
    }
}
