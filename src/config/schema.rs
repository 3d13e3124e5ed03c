//! Configuration schema for the platform CLI
//!
//! Configuration is stored at `~/.config/platform/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Project layout conventions
    pub service: ServiceConfig,

    /// Local build directories
    pub local: LocalConfig,

    /// Build behaviour
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Where project and application configuration files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Project configuration directory, relative to the project root
    pub project_config_dir: String,

    /// File name of a single application's configuration
    pub app_config_file: String,

    /// Grouped application declarations, relative to the project root
    pub applications_config_file: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            project_config_dir: ".platform".to_string(),
            app_config_file: ".platform.app.yaml".to_string(),
            applications_config_file: ".platform/applications.yaml".to_string(),
        }
    }
}

/// Local build directory layout.
///
/// `local_dir` and `web_root` are relative to the project root; the other
/// directories are relative to `local_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub local_dir: String,
    pub build_dir: String,
    pub archive_dir: String,
    pub cache_dir: String,
    pub dependencies_dir: String,
    pub shared_dir: String,
    pub web_root: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            local_dir: ".platform/local".to_string(),
            build_dir: "builds".to_string(),
            archive_dir: "build-archives".to_string(),
            cache_dir: "cache".to_string(),
            dependencies_dir: "deps".to_string(),
            shared_dir: "shared".to_string(),
            web_root: "_www".to_string(),
        }
    }
}

/// Build behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of old builds kept by the automatic cleanup
    pub keep_builds: usize,

    /// Number of full-build archives kept by the automatic cleanup
    pub keep_archives: usize,

    /// Maximum directory depth searched for application config files
    pub max_depth: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            keep_builds: 10,
            keep_archives: 10,
            max_depth: 5,
        }
    }
}

impl Config {
    /// Absolute local directory for a project
    pub fn local_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.local.local_dir)
    }

    /// Directory holding build directories
    pub fn builds_dir(&self, project_root: &Path) -> PathBuf {
        self.local_dir(project_root).join(&self.local.build_dir)
    }

    /// Directory holding full-build archives
    pub fn archives_dir(&self, project_root: &Path) -> PathBuf {
        self.local_dir(project_root).join(&self.local.archive_dir)
    }

    /// Root of the build-cache store
    pub fn cache_dir(&self, project_root: &Path) -> PathBuf {
        self.local_dir(project_root).join(&self.local.cache_dir)
    }

    /// Install prefix for build dependencies
    pub fn dependencies_dir(&self, project_root: &Path) -> PathBuf {
        self.local_dir(project_root).join(&self.local.dependencies_dir)
    }

    /// Directory for files shared between builds
    pub fn shared_dir(&self, project_root: &Path) -> PathBuf {
        self.local_dir(project_root).join(&self.local.shared_dir)
    }

    /// Default web root location
    pub fn web_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.local.web_root)
    }

    /// Paths, relative to the project root, that never count as source
    pub fn excluded_source_paths(&self) -> Vec<String> {
        vec![
            self.local.local_dir.trim_matches('/').to_string(),
            self.local.web_root.trim_matches('/').to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[local]"));
        assert!(toml.contains("[service]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.local.web_root, "_www");
        assert_eq!(config.build.keep_builds, 10);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [local]
            local_dir = ".upsun/local"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.local.local_dir, ".upsun/local");
        assert_eq!(config.local.build_dir, "builds"); // default preserved
    }

    #[test]
    fn directories_resolve_under_local_dir() {
        let config = Config::default();
        let root = Path::new("/srv/project");
        assert_eq!(
            config.builds_dir(root),
            PathBuf::from("/srv/project/.platform/local/builds")
        );
        assert_eq!(
            config.cache_dir(root),
            PathBuf::from("/srv/project/.platform/local/cache")
        );
        assert_eq!(config.web_root(root), PathBuf::from("/srv/project/_www"));
    }
}
