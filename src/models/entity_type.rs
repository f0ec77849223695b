use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// App label of the marker entity type that global permissions are stored under.
/// Also the namespace of every global permission identifier.
pub const GLOBAL_NAMESPACE: &str = "global_permissions";
pub const GLOBAL_PERMISSION_MODEL: &str = "global_permission";

/// A registered kind of domain object that permissions may be scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: Uuid,
    pub app_label: String,
    pub model: String,
}

/// Natural key of an entity type: `(app_label, model)`, with the model lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTypeRef {
    pub app_label: String,
    pub model: String,
}

impl EntityTypeRef {
    pub fn new(app_label: impl Into<String>, model: impl AsRef<str>) -> Self {
        Self {
            app_label: app_label.into(),
            model: model.as_ref().to_lowercase(),
        }
    }

    /// Parse `app_label.model`.
    pub fn parse(value: &str) -> Option<Self> {
        let (app_label, model) = value.split_once('.')?;
        if app_label.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(app_label, model))
    }
}

impl fmt::Display for EntityTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

/// Marker entity type for permissions that are not tied to any entity.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPermission;

impl GlobalPermission {
    pub fn entity_type_ref() -> EntityTypeRef {
        EntityTypeRef::new(GLOBAL_NAMESPACE, GLOBAL_PERMISSION_MODEL)
    }
}
