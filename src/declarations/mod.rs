//! Declarative permissions and groups.
//!
//! A declaration starts as a plain [`PermissionSpec`] or [`GroupSpec`] value,
//! is validated once through [`DeclarationRegistry`] and is immutable
//! afterwards. Validation failures surface immediately, before anything is
//! persisted or checked.

mod apps;
mod group;
mod permission;
mod registry;

pub use apps::{AppConfig, AppRegistry};
pub use group::{GroupDeclaration, GroupMember, GroupSpec, PermissionsAttr, GROUP_SUFFIX};
pub use permission::{
    ObjectCheck, PermissionDeclaration, PermissionSpec, Target, TargetAttr, PERMISSION_SUFFIX,
};
pub use registry::DeclarationRegistry;

/// Start a [`PermissionSpec`] named after the given identifier, owned by the calling module.
///
/// ```ignore
/// let spec = permission_spec!(RestrictedModelPermission)
///     .model("RestrictedModel")
///     .description("Enables the user to write in RestrictedModel");
/// ```
#[macro_export]
macro_rules! permission_spec {
    ($name:ident) => {
        $crate::declarations::PermissionSpec::new(stringify!($name), module_path!())
    };
}

/// Start a [`GroupSpec`] named after the given identifier, owned by the calling module.
#[macro_export]
macro_rules! group_spec {
    ($name:ident) => {
        $crate::declarations::GroupSpec::new(stringify!($name), module_path!())
    };
}
