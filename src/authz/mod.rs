//! Authorization - permission resolution and request guard
//!
//! This module resolves declared permissions against the identity store:
//! - Direct and group-inherited grants
//! - Object-scoped grants (custom checks or the object-permission index)
//! - Superuser bypass, inactive-user denial
//! - Configurable enforcement modes for the guard (off/advisory/strict)

mod guard;
mod reference;
mod resolver;

pub use guard::{require_permission, AuthUser, GuardPermission, PermissionGuard};
pub use reference::PermissionRef;
pub use resolver::{PermissionBackend, Resolver};

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    Off,
    /// Log denials but allow requests (testing mode)
    Advisory,
    /// Deny requests that fail the check (production mode)
    #[default]
    Strict,
}

impl AuthzMode {
    /// Parse an `AUTHZ_MODE` value. Anything unrecognised enforces.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "off" => AuthzMode::Off,
            "advisory" => AuthzMode::Advisory,
            _ => AuthzMode::Strict,
        }
    }
}
