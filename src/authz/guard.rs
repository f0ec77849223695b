use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use super::reference::PermissionRef;
use super::resolver::{PermissionBackend, Resolver};
use super::AuthzMode;
use crate::declarations::PermissionDeclaration;
use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::store::IdentityStore;

/// Authenticated caller, placed in the request extensions by whatever
/// authentication layer runs in front of the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// The permission a guard requires, owned so the guard can live in router state.
#[derive(Debug, Clone)]
pub enum GuardPermission {
    Declared(Arc<PermissionDeclaration>),
    Identifier(String),
}

impl GuardPermission {
    pub fn as_permission_ref(&self) -> PermissionRef<'_> {
        match self {
            GuardPermission::Declared(declaration) => PermissionRef::Declared(declaration.as_ref()),
            GuardPermission::Identifier(identifier) => PermissionRef::Identifier(identifier),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            GuardPermission::Declared(declaration) => declaration.identifier(),
            GuardPermission::Identifier(identifier) => identifier.as_str(),
        }
    }
}

impl From<Arc<PermissionDeclaration>> for GuardPermission {
    fn from(declaration: Arc<PermissionDeclaration>) -> Self {
        GuardPermission::Declared(declaration)
    }
}

impl From<&str> for GuardPermission {
    fn from(identifier: &str) -> Self {
        GuardPermission::Identifier(identifier.to_string())
    }
}

impl From<String> for GuardPermission {
    fn from(identifier: String) -> Self {
        GuardPermission::Identifier(identifier)
    }
}

/// Allow/deny gate for request handlers requiring one permission.
#[derive(Clone)]
pub struct PermissionGuard {
    backend: Arc<dyn PermissionBackend>,
    store: Arc<dyn IdentityStore>,
    permission: GuardPermission,
    mode: AuthzMode,
    login_url: Option<String>,
}

impl PermissionGuard {
    pub fn new(
        backend: Arc<dyn PermissionBackend>,
        store: Arc<dyn IdentityStore>,
        permission: impl Into<GuardPermission>,
    ) -> Self {
        Self {
            backend,
            store,
            permission: permission.into(),
            mode: AuthzMode::Strict,
            login_url: None,
        }
    }

    pub fn from_resolver(resolver: &Resolver, permission: impl Into<GuardPermission>) -> Self {
        Self::new(Arc::new(resolver.clone()), resolver.store().clone(), permission)
    }

    pub fn with_mode(mut self, mode: AuthzMode) -> Self {
        self.mode = mode;
        self
    }

    /// Redirect denied requests here instead of answering 401/403.
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = Some(login_url.into());
        self
    }

    pub fn permission(&self) -> &GuardPermission {
        &self.permission
    }

    /// The raw decision for `user`; anonymous callers never pass.
    pub async fn check(&self, user: Option<&User>) -> AppResult<bool> {
        match user {
            Some(user) => self.backend.has_permission(user, self.permission.as_permission_ref(), None).await,
            None => Ok(false),
        }
    }

    async fn load_user(&self, auth: Option<AuthUser>) -> AppResult<Option<User>> {
        match auth {
            Some(auth) => self.store.get_user(auth.user_id).await,
            None => Ok(None),
        }
    }

    fn deny(&self, user: Option<&User>, path: &str) -> Response {
        if let Some(login_url) = &self.login_url {
            let separator = if login_url.contains('?') { '&' } else { '?' };
            let location = format!("{}{}next={}", login_url, separator, urlencoding::encode(path));
            return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
        }

        let err = match user {
            Some(_) => AppError::forbidden(format!("missing permission {}", self.permission.identifier())),
            None => AppError::unauthorized("authentication required"),
        };
        err.into_response()
    }
}

/// Middleware for `axum::middleware::from_fn_with_state` gating routes on the
/// guard's permission. The loaded [`User`] is added to the request extensions.
pub async fn require_permission(State(guard): State<PermissionGuard>, mut request: Request, next: Next) -> Response {
    if guard.mode == AuthzMode::Off {
        return next.run(request).await;
    }

    let auth = request.extensions().get::<AuthUser>().copied();
    let user = match guard.load_user(auth).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let allowed = match guard.check(user.as_ref()).await {
        Ok(allowed) => allowed,
        Err(err) => return err.into_response(),
    };

    if !allowed {
        let path = request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path().to_string(), |pq| pq.as_str().to_string());
        tracing::warn!(
            user_id = ?auth.map(|a| a.user_id),
            permission = %guard.permission.identifier(),
            path = %path,
            mode = ?guard.mode,
            "permission denied"
        );

        if guard.mode == AuthzMode::Strict {
            return guard.deny(user.as_ref(), &path);
        }
    }

    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}
