use crate::authz::AuthzMode;
use crate::errors::AppError;

/// Process-wide configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// Module path holding the default group declarations, e.g. `test_app::groups`.
    pub default_groups_module: Option<String>,
    pub authz_mode: AuthzMode,
    /// Where the guard redirects denied requests. Without it, denials are 401/403.
    pub login_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        Ok(Self {
            database_url,
            default_groups_module: non_blank(std::env::var("DEFAULT_GROUPS_MODULE").ok()),
            authz_mode: AuthzMode::parse(&std::env::var("AUTHZ_MODE").unwrap_or_default()),
            login_url: non_blank(std::env::var("LOGIN_URL").ok()),
        })
    }

    /// The configured default groups module, failing when it is unset or blank.
    pub fn require_default_groups_module(&self) -> Result<&str, AppError> {
        self.default_groups_module
            .as_deref()
            .filter(|module| !module.trim().is_empty())
            .ok_or_else(|| AppError::configuration("DEFAULT_GROUPS_MODULE setting is not set"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
