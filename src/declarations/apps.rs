use crate::errors::{AppError, AppResult};

/// Configuration descriptor of an installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub label: String,
    /// Root module path of the application, e.g. `test_app` or `shop::billing`.
    pub module: String,
}

impl AppConfig {
    pub fn new(label: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            module: module.into(),
        }
    }

    /// The nested namespace scanned for permission declarations.
    pub fn permissions_module(&self) -> String {
        format!("{}::permissions", self.module)
    }

    fn encloses(&self, module: &str) -> bool {
        module == self.module
            || module
                .strip_prefix(self.module.as_str())
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

/// Installed applications, in install order.
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: Vec<AppConfig>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(mut self, app: AppConfig) -> Self {
        self.apps.push(app);
        self
    }

    pub fn apps(&self) -> &[AppConfig] {
        &self.apps
    }

    pub fn get(&self, label: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.label == label)
    }

    /// The nearest installed application enclosing `module`.
    pub fn app_for_module(&self, module: &str) -> AppResult<&AppConfig> {
        self.apps
            .iter()
            .filter(|app| app.encloses(module))
            .max_by_key(|app| app.module.len())
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "no installed application encloses module `{}`",
                    module
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AppRegistry {
        AppRegistry::new()
            .install(AppConfig::new("shop", "shop"))
            .install(AppConfig::new("billing", "shop::billing"))
    }

    #[test]
    fn resolves_nearest_enclosing_app() {
        let apps = registry();
        assert_eq!(apps.app_for_module("shop::permissions").unwrap().label, "shop");
        assert_eq!(apps.app_for_module("shop::billing::permissions").unwrap().label, "billing");
        assert_eq!(apps.app_for_module("shop::billing").unwrap().label, "billing");
    }

    #[test]
    fn prefix_must_stop_at_a_module_boundary() {
        let apps = registry();
        let err = apps.app_for_module("shopping::permissions").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn permissions_module_is_nested() {
        assert_eq!(AppConfig::new("billing", "shop::billing").permissions_module(), "shop::billing::permissions");
    }
}
