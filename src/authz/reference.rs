use std::sync::Arc;

use crate::declarations::PermissionDeclaration;

/// What a permission check is asked about: a declaration, its identifier
/// string, or nothing at all (which never grants).
#[derive(Debug, Clone, Copy)]
pub enum PermissionRef<'a> {
    Declared(&'a PermissionDeclaration),
    Identifier(&'a str),
    Nothing,
}

impl<'a> PermissionRef<'a> {
    /// Canonical identifier to check against, if any.
    pub fn identifier(&self) -> Option<&'a str> {
        match *self {
            PermissionRef::Declared(declaration) => Some(declaration.identifier()),
            PermissionRef::Identifier(identifier) => Some(identifier),
            PermissionRef::Nothing => None,
        }
    }

    pub fn declaration(&self) -> Option<&'a PermissionDeclaration> {
        match *self {
            PermissionRef::Declared(declaration) => Some(declaration),
            _ => None,
        }
    }
}

impl<'a> From<&'a PermissionDeclaration> for PermissionRef<'a> {
    fn from(declaration: &'a PermissionDeclaration) -> Self {
        PermissionRef::Declared(declaration)
    }
}

impl<'a> From<&'a Arc<PermissionDeclaration>> for PermissionRef<'a> {
    fn from(declaration: &'a Arc<PermissionDeclaration>) -> Self {
        PermissionRef::Declared(declaration.as_ref())
    }
}

impl<'a> From<&'a str> for PermissionRef<'a> {
    fn from(identifier: &'a str) -> Self {
        PermissionRef::Identifier(identifier)
    }
}

impl<'a> From<&'a String> for PermissionRef<'a> {
    fn from(identifier: &'a String) -> Self {
        PermissionRef::Identifier(identifier.as_str())
    }
}

impl<'a> From<Option<&'a str>> for PermissionRef<'a> {
    fn from(identifier: Option<&'a str>) -> Self {
        identifier.map_or(PermissionRef::Nothing, PermissionRef::Identifier)
    }
}
