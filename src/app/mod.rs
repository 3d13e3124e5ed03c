//! Applications discovered in a source repository
//!
//! Discovered applications are owned by an [`AppRegistry`] and referred to
//! elsewhere by [`AppId`], so caches and build results never hold
//! references back into the registry.

mod config;
mod finder;

pub use config::{AppConfig, Hooks, SharedMount, DEFAULT_DOCUMENT_ROOT};
pub use finder::ApplicationFinder;

pub(crate) use config::type_name;

use crate::error::PlatformError;
use std::path::{Path, PathBuf};

/// Index of an application in its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(usize);

impl AppId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A discovered unit of buildable code
#[derive(Debug, Clone)]
pub struct Application {
    id: String,
    root: PathBuf,
    relative: PathBuf,
    config_file: PathBuf,
    config: AppConfig,
}

impl Application {
    pub fn new(
        id: impl Into<String>,
        root: PathBuf,
        relative: PathBuf,
        config_file: PathBuf,
        config: AppConfig,
    ) -> Self {
        Self {
            id: id.into(),
            root,
            relative,
            config_file,
            config,
        }
    }

    /// Unique name within the project
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute application root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Application root relative to the repository
    pub fn relative_root(&self) -> &Path {
        &self.relative
    }

    /// File the application was declared in
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Directory name of this app inside a multi-app build
    pub fn build_dir_name(&self) -> String {
        dir_name(&self.id)
    }

    /// Whether the whole app is placed inside the document root.
    ///
    /// True when requested, or when the default document root is not
    /// present in the source.
    pub fn moves_to_web_root(&self) -> bool {
        self.config.move_to_root
            || (!self.config.document_root_declared
                && !self.root.join(&self.config.document_root).is_dir())
    }

    /// Document root inside an app build directory
    pub fn web_root_in(&self, app_build_dir: &Path) -> PathBuf {
        if self.config.document_root.is_empty() {
            app_build_dir.to_path_buf()
        } else {
            app_build_dir.join(&self.config.document_root)
        }
    }
}

/// Flatten an application name into a single path component.
///
/// Not injective (`a/b` and `a-b` both map to `a-b`); the finder rejects
/// applications whose flattened names collide.
pub fn dir_name(id: &str) -> String {
    id.replace(['/', '\\'], "-")
}

/// An application whose configuration could not be loaded
#[derive(Debug)]
pub struct InvalidApp {
    /// Name derived from the declaration's location
    pub id: String,
    /// Application root relative to the repository
    pub relative: PathBuf,
    pub config_file: PathBuf,
    pub error: PlatformError,
}

/// Ordered collection of discovered applications
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: Vec<Application>,
    invalid: Vec<InvalidApp>,
}

impl AppRegistry {
    /// Build a registry, ordering applications by relative path
    pub fn new(mut apps: Vec<Application>) -> Self {
        apps.sort_by(|a, b| a.relative.cmp(&b.relative).then_with(|| a.id.cmp(&b.id)));
        Self {
            apps,
            invalid: Vec::new(),
        }
    }

    /// Attach applications that were declared but failed to load
    pub fn with_invalid(mut self, mut invalid: Vec<InvalidApp>) -> Self {
        invalid.sort_by(|a, b| a.relative.cmp(&b.relative).then_with(|| a.id.cmp(&b.id)));
        self.invalid = invalid;
        self
    }

    pub fn invalid(&self) -> &[InvalidApp] {
        &self.invalid
    }

    /// Remove and return the applications that failed to load
    pub fn take_invalid(&mut self) -> Vec<InvalidApp> {
        std::mem::take(&mut self.invalid)
    }

    pub fn get(&self, id: AppId) -> &Application {
        &self.apps[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = AppId> + '_ {
        (0..self.apps.len()).map(AppId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AppId, &Application)> {
        self.apps.iter().enumerate().map(|(i, app)| (AppId(i), app))
    }

    /// Look up an application by its name
    pub fn find(&self, name: &str) -> Option<AppId> {
        self.apps.iter().position(|app| app.id == name).map(AppId)
    }

    /// Keep only the named applications, returning names that matched none
    pub fn retain_named(&mut self, names: &[String]) -> Vec<String> {
        let missing = names
            .iter()
            .filter(|name| self.find(name).is_none() && !self.invalid.iter().any(|app| &app.id == *name))
            .cloned()
            .collect();
        self.apps.retain(|app| names.iter().any(|name| name == &app.id));
        self.invalid.retain(|app| names.iter().any(|name| name == &app.id));
        missing
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Whether exactly one application was declared
    pub fn is_single(&self) -> bool {
        self.apps.len() + self.invalid.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, relative: &str) -> Application {
        Application::new(
            id,
            PathBuf::from("/repo").join(relative),
            PathBuf::from(relative),
            PathBuf::from("/repo").join(relative).join(".platform.app.yaml"),
            AppConfig::default(),
        )
    }

    #[test]
    fn registry_orders_by_path() {
        let registry = AppRegistry::new(vec![app("web", "web"), app("api", "backend/api")]);
        let ids: Vec<_> = registry.iter().map(|(_, a)| a.id().to_string()).collect();
        assert_eq!(ids, vec!["api", "web"]);
        assert_eq!(registry.find("web"), Some(AppId(1)));
        assert!(!registry.is_single());
    }

    #[test]
    fn retain_named_reports_missing() {
        let mut registry = AppRegistry::new(vec![app("web", "web"), app("api", "api")]);
        let missing = registry.retain_named(&["web".to_string(), "worker".to_string()]);
        assert_eq!(missing, vec!["worker".to_string()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_single());
    }

    #[test]
    fn build_dir_name_flattens_paths() {
        assert_eq!(app("backend/api", "backend/api").build_dir_name(), "backend-api");
    }

    #[test]
    fn invalid_apps_count_towards_layout() {
        let invalid = InvalidApp {
            id: "worker".to_string(),
            relative: PathBuf::from("worker"),
            config_file: PathBuf::from("/repo/worker/.platform.app.yaml"),
            error: PlatformError::invalid_config("bad"),
        };
        let mut registry = AppRegistry::new(vec![app("web", "web")]).with_invalid(vec![invalid]);
        assert!(!registry.is_single());
        assert_eq!(registry.invalid().len(), 1);

        let missing = registry.retain_named(&["worker".to_string()]);
        assert!(missing.is_empty());
        assert!(registry.is_empty());
        assert_eq!(registry.take_invalid().len(), 1);
        assert!(registry.invalid().is_empty());
    }
}
