pub mod entity_type;
pub mod group;
pub mod permission;
pub mod user;

pub use entity_type::{EntityType, EntityTypeRef, GlobalPermission, GLOBAL_NAMESPACE, GLOBAL_PERMISSION_MODEL};
pub use group::Group;
pub use permission::Permission;
pub use user::User;
