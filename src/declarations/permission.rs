use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::apps::AppRegistry;
use crate::authz::{PermissionBackend, PermissionRef};
use crate::errors::{AppError, AppResult};
use crate::models::{EntityType, EntityTypeRef, GlobalPermission, Permission, User, GLOBAL_NAMESPACE};
use crate::store::{IdentityStore, ObjectRef};
use crate::utils::camel_to_snake;

pub const PERMISSION_SUFFIX: &str = "Permission";

/// Custom object-level rule attached to a permission declaration. When present,
/// object-scoped checks call it instead of the object-permission index.
#[async_trait]
pub trait ObjectCheck: Send + Sync {
    async fn has_object_permission(&self, user: &User, object: &ObjectRef) -> bool;
}

/// The target-entity attribute exactly as declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetAttr {
    /// No target attribute at all.
    #[default]
    Unset,
    /// Explicitly no entity: a global permission.
    Global,
    /// Model name inside the declaring application.
    Model(String),
    Entity(EntityTypeRef),
    /// Anything else; holds a description of the offending value.
    Invalid(String),
}

/// A permission declaration literal, before validation.
#[derive(Clone)]
pub struct PermissionSpec {
    pub name: String,
    pub module: String,
    pub description: Option<String>,
    pub codename: Option<String>,
    pub target: TargetAttr,
    pub object_check: Option<Arc<dyn ObjectCheck>>,
}

impl PermissionSpec {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            description: None,
            codename: None,
            target: TargetAttr::Unset,
            object_check: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn codename(mut self, codename: impl Into<String>) -> Self {
        self.codename = Some(codename.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.target = TargetAttr::Model(model.into());
        self
    }

    pub fn entity(mut self, entity: EntityTypeRef) -> Self {
        self.target = TargetAttr::Entity(entity);
        self
    }

    pub fn global(mut self) -> Self {
        self.target = TargetAttr::Global;
        self
    }

    pub fn target(mut self, target: TargetAttr) -> Self {
        self.target = target;
        self
    }

    pub fn object_check(mut self, check: Arc<dyn ObjectCheck>) -> Self {
        self.object_check = Some(check);
        self
    }
}

impl fmt::Debug for PermissionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionSpec")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("description", &self.description)
            .field("codename", &self.codename)
            .field("target", &self.target)
            .field("object_check", &self.object_check.is_some())
            .finish()
    }
}

/// Validated target entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Global,
    Model(String),
    Entity(EntityTypeRef),
}

/// A validated, immutable permission declaration.
#[derive(Clone)]
pub struct PermissionDeclaration {
    name: String,
    module: String,
    app_label: String,
    codename: String,
    description: String,
    target: Target,
    identifier: String,
    object_check: Option<Arc<dyn ObjectCheck>>,
}

impl PermissionDeclaration {
    /// Validate `spec` and derive its codename and identifier.
    pub fn declare(spec: PermissionSpec, apps: &AppRegistry) -> AppResult<Self> {
        let app_label = apps.app_for_module(&spec.module)?.label.clone();

        let base_name = spec
            .name
            .strip_suffix(PERMISSION_SUFFIX)
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "A permission declaration's name must end with '{}' (got `{}`)",
                    PERMISSION_SUFFIX, spec.name
                ))
            })?;
        if base_name.is_empty() {
            return Err(AppError::configuration(format!(
                "`{}` is the base declaration and cannot be declared itself",
                PERMISSION_SUFFIX
            )));
        }

        let description = spec
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "permission declaration `{}` must have a non-empty description",
                    spec.name
                ))
            })?;

        let target = match spec.target {
            TargetAttr::Unset => {
                return Err(AppError::configuration(format!(
                    "permission declaration `{}` must declare a target model, or none for a global permission",
                    spec.name
                )))
            }
            TargetAttr::Invalid(value) => {
                return Err(AppError::invalid_value(format!(
                    "target of permission declaration `{}` must be a model name or an entity type, got {}",
                    spec.name, value
                )))
            }
            TargetAttr::Global => Target::Global,
            TargetAttr::Model(model) => Target::Model(model),
            TargetAttr::Entity(entity) => Target::Entity(EntityTypeRef::new(entity.app_label, entity.model)),
        };

        let codename = spec.codename.unwrap_or_else(|| camel_to_snake(base_name));
        let (codename, identifier) = match &target {
            Target::Global => {
                let codename = format!("{}.{}", app_label, codename);
                let identifier = format!("{}.{}", GLOBAL_NAMESPACE, codename);
                (codename, identifier)
            }
            Target::Model(_) => {
                let identifier = format!("{}.{}", app_label, codename);
                (codename, identifier)
            }
            Target::Entity(entity) => {
                let identifier = format!("{}.{}", entity.app_label, codename);
                (codename, identifier)
            }
        };

        Ok(Self {
            name: spec.name,
            module: spec.module,
            app_label,
            codename,
            description,
            target,
            identifier,
            object_check: spec.object_check,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn app_label(&self) -> &str {
        &self.app_label
    }

    pub fn codename(&self) -> &str {
        &self.codename
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_global(&self) -> bool {
        matches!(self.target, Target::Global)
    }

    /// Canonical `namespace.codename` string of this permission.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn object_check(&self) -> Option<&Arc<dyn ObjectCheck>> {
        self.object_check.as_ref()
    }

    /// Natural key of the entity type this permission's row lives under.
    pub fn entity_type_ref(&self) -> EntityTypeRef {
        match &self.target {
            Target::Global => GlobalPermission::entity_type_ref(),
            Target::Model(model) => EntityTypeRef::new(&self.app_label, model),
            Target::Entity(entity) => entity.clone(),
        }
    }

    async fn resolve_entity_type(&self, store: &dyn IdentityStore) -> AppResult<EntityType> {
        let key = self.entity_type_ref();
        if self.is_global() {
            let (entity_type, _) = store.get_or_create_entity_type(&key).await?;
            return Ok(entity_type);
        }

        store.get_entity_type(&key).await?.ok_or_else(|| {
            AppError::not_found(format!(
                "entity type `{}` targeted by `{}` is not registered",
                key, self.name
            ))
        })
    }

    /// Fetch this permission's row, creating it when absent.
    pub async fn get_or_create(&self, store: &dyn IdentityStore) -> AppResult<(Permission, bool)> {
        let entity_type = self.resolve_entity_type(store).await?;
        store
            .get_or_create_permission(&entity_type, &self.codename, &self.description)
            .await
    }

    /// Like [`Self::get_or_create`], but brings the stored description up to date.
    pub(crate) async fn update_or_create(&self, store: &dyn IdentityStore) -> AppResult<(Permission, bool)> {
        let entity_type = self.resolve_entity_type(store).await?;
        store
            .update_or_create_permission(&entity_type, &self.codename, &self.description)
            .await
    }

    /// Fetch the existing row without creating anything.
    pub async fn get(&self, store: &dyn IdentityStore) -> AppResult<Permission> {
        let entity_type = self.resolve_entity_type(store).await?;
        store
            .find_permission(&entity_type, &self.codename)
            .await?
            .ok_or_else(|| AppError::not_found(format!("permission `{}` has not been created", self.identifier)))
    }

    pub async fn user_has_permission(&self, backend: &dyn PermissionBackend, user: &User) -> AppResult<bool> {
        backend.has_permission(user, PermissionRef::from(self), None).await
    }
}

impl fmt::Debug for PermissionDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionDeclaration")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("description", &self.description)
            .field("target", &self.target)
            .field("object_check", &self.object_check.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::AppConfig;

    fn apps() -> AppRegistry {
        AppRegistry::new()
            .install(AppConfig::new("test_app", "test_app"))
            .install(AppConfig::new("other_app", "other_app"))
    }

    fn spec(name: &str) -> PermissionSpec {
        PermissionSpec::new(name, "test_app::permissions").description("Can do things")
    }

    #[test]
    fn derives_codename_and_identifier() {
        let decl = PermissionDeclaration::declare(spec("RestrictedModelPermission").model("RestrictedModel"), &apps())
            .unwrap();
        assert_eq!(decl.app_label(), "test_app");
        assert_eq!(decl.codename(), "restricted_model");
        assert_eq!(decl.identifier(), "test_app.restricted_model");
        assert_eq!(decl.entity_type_ref(), EntityTypeRef::new("test_app", "restrictedmodel"));
    }

    #[test]
    fn explicit_codename_wins() {
        let decl = PermissionDeclaration::declare(
            spec("WriteArticlePermission").model("Article").codename("write"),
            &apps(),
        )
        .unwrap();
        assert_eq!(decl.identifier(), "test_app.write");
    }

    #[test]
    fn global_permissions_use_the_system_namespace() {
        let ours = PermissionDeclaration::declare(spec("GlobalPermission").global(), &apps()).unwrap();
        let theirs = PermissionDeclaration::declare(
            PermissionSpec::new("GlobalPermission", "other_app::permissions")
                .description("Other")
                .global(),
            &apps(),
        )
        .unwrap();

        assert!(ours.is_global());
        assert_eq!(ours.codename(), "test_app.global");
        assert_eq!(ours.identifier(), "global_permissions.test_app.global");
        assert_ne!(ours.identifier(), theirs.identifier());
        assert_eq!(ours.entity_type_ref(), GlobalPermission::entity_type_ref());
    }

    #[test]
    fn entity_targets_namespace_by_their_app() {
        let decl = PermissionDeclaration::declare(
            spec("ViewInvoicePermission").entity(EntityTypeRef::new("other_app", "Invoice")),
            &apps(),
        )
        .unwrap();
        assert_eq!(decl.identifier(), "other_app.view_invoice");
        assert_eq!(decl.entity_type_ref().model, "invoice");
    }

    #[test]
    fn name_must_end_with_permission() {
        let err = PermissionDeclaration::declare(spec("FooBar").model("Foo"), &apps()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'Permission'"));
    }

    #[test]
    fn base_name_is_rejected() {
        let err = PermissionDeclaration::declare(spec("Permission").global(), &apps()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn description_is_required() {
        let missing = PermissionSpec::new("EditPermission", "test_app::permissions").global();
        assert!(PermissionDeclaration::declare(missing, &apps()).unwrap_err().is_configuration());

        let blank = PermissionSpec::new("EditPermission", "test_app::permissions")
            .description("   ")
            .global();
        assert!(PermissionDeclaration::declare(blank, &apps()).unwrap_err().is_configuration());
    }

    #[test]
    fn unset_target_differs_from_global() {
        let err = PermissionDeclaration::declare(spec("EditPermission"), &apps()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_target_is_a_value_error() {
        let err = PermissionDeclaration::declare(
            spec("EditPermission").target(TargetAttr::Invalid("42".to_string())),
            &apps(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidValue(_)));
    }

    #[test]
    fn module_outside_any_app_is_rejected() {
        let orphan = PermissionSpec::new("EditPermission", "elsewhere::permissions")
            .description("Edit")
            .global();
        assert!(PermissionDeclaration::declare(orphan, &apps()).unwrap_err().is_configuration());
    }

    #[test]
    fn spec_macro_captures_the_calling_module() {
        let spec = crate::permission_spec!(ArchivePermission).description("Archive").global();
        assert_eq!(spec.name, "ArchivePermission");
        assert_eq!(spec.module, module_path!());

        let apps = AppRegistry::new().install(AppConfig::new("decl_perms", "decl_perms"));
        let decl = PermissionDeclaration::declare(spec, &apps).unwrap();
        assert_eq!(decl.identifier(), "global_permissions.decl_perms.archive");
    }
}
