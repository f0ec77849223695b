use std::collections::HashMap;
use std::sync::Arc;

use super::apps::{AppConfig, AppRegistry};
use super::group::{GroupDeclaration, GroupSpec};
use super::permission::{PermissionDeclaration, PermissionSpec};
use crate::errors::{AppError, AppResult};

/// Every permission and group declaration of the process, built once at
/// start-up and shared with the reconciler and the resolver.
#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    apps: AppRegistry,
    permissions: Vec<Arc<PermissionDeclaration>>,
    by_identifier: HashMap<String, Arc<PermissionDeclaration>>,
    groups: Vec<Arc<GroupDeclaration>>,
}

impl DeclarationRegistry {
    pub fn new(apps: AppRegistry) -> Self {
        Self {
            apps,
            ..Self::default()
        }
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    pub fn declare_permission(&mut self, spec: PermissionSpec) -> AppResult<Arc<PermissionDeclaration>> {
        let declaration = Arc::new(PermissionDeclaration::declare(spec, &self.apps)?);

        if let Some(previous) = self
            .by_identifier
            .insert(declaration.identifier().to_string(), declaration.clone())
        {
            if previous.entity_type_ref() == declaration.entity_type_ref() {
                tracing::warn!(
                    identifier = %declaration.identifier(),
                    previous = %previous.name(),
                    current = %declaration.name(),
                    "permission declared more than once; both map onto one stored row"
                );
            } else {
                tracing::warn!(
                    identifier = %declaration.identifier(),
                    previous = %previous.name(),
                    previous_entity = %previous.entity_type_ref(),
                    current = %declaration.name(),
                    current_entity = %declaration.entity_type_ref(),
                    "distinct permission rows share one identifier; lookups resolve to the later declaration"
                );
            }
        }

        self.permissions.push(declaration.clone());
        Ok(declaration)
    }

    pub fn declare_group(&mut self, spec: GroupSpec) -> AppResult<Arc<GroupDeclaration>> {
        let declaration = GroupDeclaration::declare(spec, |name| self.resolve_member(name))?;

        if self
            .groups
            .iter()
            .any(|g| g.module() == declaration.module() && g.group_name() == declaration.group_name())
        {
            return Err(AppError::configuration(format!(
                "group `{}` is declared more than once in `{}`",
                declaration.group_name(),
                declaration.module()
            )));
        }

        let declaration = Arc::new(declaration);
        self.groups.push(declaration.clone());
        Ok(declaration)
    }

    /// All permission declarations, in declaration order.
    pub fn permissions(&self) -> &[Arc<PermissionDeclaration>] {
        &self.permissions
    }

    /// Declarations living in `app`'s nested permissions namespace.
    pub fn permissions_module(&self, app: &AppConfig) -> Vec<Arc<PermissionDeclaration>> {
        let module = app.permissions_module();
        self.permissions
            .iter()
            .filter(|p| p.module() == module)
            .cloned()
            .collect()
    }

    pub fn has_groups_module(&self, module: &str) -> bool {
        self.groups.iter().any(|g| g.module() == module)
    }

    pub fn groups_in(&self, module: &str) -> Vec<Arc<GroupDeclaration>> {
        self.groups
            .iter()
            .filter(|g| g.module() == module)
            .cloned()
            .collect()
    }

    pub fn lookup(&self, identifier: &str) -> Option<&Arc<PermissionDeclaration>> {
        self.by_identifier.get(identifier)
    }

    fn resolve_member(&self, name: &str) -> AppResult<Arc<PermissionDeclaration>> {
        if let Some(declaration) = self.lookup(name) {
            return Ok(declaration.clone());
        }

        let mut matches = self.permissions.iter().filter(|p| p.name() == name);
        match (matches.next(), matches.next()) {
            (Some(declaration), None) => Ok(declaration.clone()),
            (Some(_), Some(_)) => Err(AppError::configuration(format!(
                "permission name `{}` is ambiguous; reference it by identifier",
                name
            ))),
            (None, _) => Err(AppError::configuration(format!(
                "`{}` is not a declared permission",
                name
            ))),
        }
    }
}
