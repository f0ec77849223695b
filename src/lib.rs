pub mod authz;
pub mod db;
pub mod declarations;
pub mod errors;
pub mod manifest;
pub mod models;
pub mod reconcile;
pub mod settings;
pub mod store;
pub mod utils;

// Re-export commonly used items
pub use authz::{AuthzMode, PermissionBackend, PermissionGuard, PermissionRef, Resolver};
pub use declarations::{DeclarationRegistry, GroupDeclaration, PermissionDeclaration};
pub use errors::{AppError, AppResult};
pub use reconcile::{ReconcileReport, Reconciler};
pub use settings::Settings;
pub use store::{IdentityStore, ObjectPermissionIndex, ObjectRef, SqliteIdentityStore, SqliteObjectPermissionIndex};
