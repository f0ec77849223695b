use std::sync::Arc;

use super::permission::{PermissionDeclaration, PERMISSION_SUFFIX};
use crate::errors::{AppError, AppResult};
use crate::models::Group;
use crate::store::IdentityStore;
use crate::utils::camel_to_snake;

pub const GROUP_SUFFIX: &str = "Group";

/// One entry of a group's permission list.
#[derive(Debug, Clone)]
pub enum GroupMember {
    Declared(Arc<PermissionDeclaration>),
    /// Identifier or declaration name, resolved against the registry.
    Named(String),
}

/// The permissions attribute exactly as declared.
#[derive(Debug, Clone, Default)]
pub enum PermissionsAttr {
    #[default]
    Missing,
    /// Present but not a sequence of permission references.
    Invalid(String),
    List(Vec<GroupMember>),
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub module: String,
    pub group_name: Option<String>,
    pub permissions: PermissionsAttr,
}

impl GroupSpec {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            group_name: None,
            permissions: PermissionsAttr::Missing,
        }
    }

    pub fn group_name(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    pub fn permissions<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Arc<PermissionDeclaration>>,
    {
        self.permissions = PermissionsAttr::List(permissions.into_iter().map(GroupMember::Declared).collect());
        self
    }

    pub fn members(mut self, members: Vec<GroupMember>) -> Self {
        self.permissions = PermissionsAttr::List(members);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GroupDeclaration {
    name: String,
    module: String,
    group_name: String,
    permissions: Vec<Arc<PermissionDeclaration>>,
}

impl GroupDeclaration {
    /// Validate `spec`; `resolve` turns a named member into its declaration.
    pub fn declare<F>(spec: GroupSpec, resolve: F) -> AppResult<Self>
    where
        F: Fn(&str) -> AppResult<Arc<PermissionDeclaration>>,
    {
        let base_name = spec.name.strip_suffix(GROUP_SUFFIX).ok_or_else(|| {
            AppError::configuration(format!(
                "A group declaration's name must end with '{}' (got `{}`)",
                GROUP_SUFFIX, spec.name
            ))
        })?;
        if base_name.is_empty() {
            return Err(AppError::configuration(format!(
                "`{}` is the base declaration and cannot be declared itself",
                GROUP_SUFFIX
            )));
        }

        let members = match spec.permissions {
            PermissionsAttr::List(members) => members,
            PermissionsAttr::Missing => return Err(permissions_error(&spec.name, "it is missing")),
            PermissionsAttr::Invalid(found) => return Err(permissions_error(&spec.name, &found)),
        };

        let mut permissions = Vec::with_capacity(members.len());
        for member in members {
            let declaration = match member {
                GroupMember::Declared(declaration) => declaration,
                GroupMember::Named(name) if name == PERMISSION_SUFFIX => {
                    return Err(permissions_error(&spec.name, "it lists the base declaration"))
                }
                GroupMember::Named(name) => resolve(&name)?,
            };
            permissions.push(declaration);
        }

        let group_name = spec.group_name.unwrap_or_else(|| camel_to_snake(base_name));

        Ok(Self {
            name: spec.name,
            module: spec.module,
            group_name,
            permissions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn permissions(&self) -> &[Arc<PermissionDeclaration>] {
        &self.permissions
    }

    pub async fn get_or_create(&self, store: &dyn IdentityStore) -> AppResult<(Group, bool)> {
        store.get_or_create_group(&self.group_name).await
    }

    /// Groups carry nothing beyond their name, so the row upsert matches
    /// [`Self::get_or_create`]; reconciliation replaces the associations afterwards.
    pub(crate) async fn update_or_create(&self, store: &dyn IdentityStore) -> AppResult<(Group, bool)> {
        store.get_or_create_group(&self.group_name).await
    }

    pub async fn get(&self, store: &dyn IdentityStore) -> AppResult<Group> {
        store
            .find_group(&self.group_name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("group `{}` has not been created", self.group_name)))
    }
}

fn permissions_error(group: &str, problem: &str) -> AppError {
    AppError::configuration(format!(
        "group declaration `{}` must have a 'permissions' list of permission declarations \
         (except the base declaration), but {}",
        group, problem
    ))
}
