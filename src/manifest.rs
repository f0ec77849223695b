//! JSON declaration manifests.
//!
//! The CLI cannot see declarations compiled into another program, so it reads
//! them from a manifest:
//!
//! ```json
//! {
//!   "default_groups_module": "test_app::groups",
//!   "apps": [{
//!     "label": "test_app",
//!     "models": ["RestrictedModel"],
//!     "permissions": [
//!       {"name": "RestrictedModelPermission", "model": "RestrictedModel",
//!        "description": "Enables the user to write in RestrictedModel"},
//!       {"name": "GlobalPermission", "model": null,
//!        "description": "Enables the user to write in any model"}
//!     ]
//!   }],
//!   "group_modules": [{
//!     "module": "test_app::groups",
//!     "groups": [{"name": "AuthorizedGroup", "permissions": ["RestrictedModelPermission"]}]
//!   }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::declarations::{
    AppConfig, AppRegistry, DeclarationRegistry, GroupMember, GroupSpec, PermissionSpec, PermissionsAttr,
    TargetAttr,
};
use crate::errors::{AppError, AppResult};
use crate::models::EntityTypeRef;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub default_groups_module: Option<String>,
    #[serde(default)]
    pub apps: Vec<AppManifest>,
    #[serde(default)]
    pub group_modules: Vec<GroupModuleManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppManifest {
    pub label: String,
    /// Root module path; defaults to the label.
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,
}

impl AppManifest {
    pub fn config(&self) -> AppConfig {
        AppConfig::new(&self.label, self.module.clone().unwrap_or_else(|| self.label.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub codename: Option<String>,
    /// `None` when the key is absent, `Some(Value::Null)` for an explicit null.
    #[serde(default, deserialize_with = "present")]
    pub model: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupModuleManifest {
    pub module: String,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub permissions: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn target_attr(model: &Option<Value>) -> TargetAttr {
    match model {
        None => TargetAttr::Unset,
        Some(Value::Null) => TargetAttr::Global,
        Some(Value::String(model)) => TargetAttr::Model(model.clone()),
        Some(Value::Object(map)) => {
            match (
                map.get("app_label").and_then(Value::as_str),
                map.get("model").and_then(Value::as_str),
            ) {
                (Some(app_label), Some(model)) => TargetAttr::Entity(EntityTypeRef::new(app_label, model)),
                _ => TargetAttr::Invalid(Value::Object(map.clone()).to_string()),
            }
        }
        Some(other) => TargetAttr::Invalid(other.to_string()),
    }
}

fn permissions_attr(permissions: &Option<Value>) -> PermissionsAttr {
    match permissions {
        None => PermissionsAttr::Missing,
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(|name| GroupMember::Named(name.to_string())))
            .collect::<Option<Vec<_>>>()
            .map_or_else(
                || PermissionsAttr::Invalid(format!("it lists a non-name entry in {}", Value::Array(items.clone()))),
                PermissionsAttr::List,
            ),
        Some(other) => PermissionsAttr::Invalid(format!("it is not a list: {}", other)),
    }
}

impl Manifest {
    pub fn parse(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| AppError::configuration(format!("invalid manifest: {}", e)))
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::configuration(format!("cannot read manifest {}: {}", path.display(), e)))?;
        Self::parse(&raw)
    }

    pub fn app_registry(&self) -> AppRegistry {
        self.apps
            .iter()
            .fold(AppRegistry::new(), |apps, app| apps.install(app.config()))
    }

    /// Declare every permission and group, failing on the first invalid one.
    pub fn build_registry(&self) -> AppResult<DeclarationRegistry> {
        let mut registry = DeclarationRegistry::new(self.app_registry());

        for app in &self.apps {
            let module = app.config().permissions_module();
            for entry in &app.permissions {
                let mut spec = PermissionSpec::new(&entry.name, &module).target(target_attr(&entry.model));
                spec.description = entry.description.clone();
                spec.codename = entry.codename.clone();
                registry.declare_permission(spec)?;
            }
        }

        for group_module in &self.group_modules {
            for entry in &group_module.groups {
                let mut spec = GroupSpec::new(&entry.name, &group_module.module);
                spec.group_name = entry.group_name.clone();
                spec.permissions = permissions_attr(&entry.permissions);
                registry.declare_group(spec)?;
            }
        }

        Ok(registry)
    }

    /// Entity types the manifest's apps define, with lowercased model names.
    pub fn entity_types(&self) -> Vec<EntityTypeRef> {
        self.apps
            .iter()
            .flat_map(|app| app.models.iter().map(move |model| EntityTypeRef::new(&app.label, model)))
            .collect()
    }
}
