//! CLI command implementations

pub mod build;
pub mod cache;
pub mod clean;
pub mod config;

pub use build::execute as build;
pub use cache::execute as cache;
pub use clean::execute as clean;
pub use config::execute as config;

use crate::config::{Config, ConfigManager};
use crate::error::{PlatformError, PlatformResult};
use std::path::{Path, PathBuf};

/// Resolve the project a command works on.
///
/// An explicit `--source` is used as given; otherwise the project enclosing
/// the current directory.
pub(crate) fn project_root(config: &Config, source: Option<&Path>) -> PlatformResult<PathBuf> {
    if let Some(source) = source {
        return source
            .canonicalize()
            .map_err(|_| PlatformError::NotADirectory(source.to_path_buf()));
    }
    let cwd = std::env::current_dir().map_err(|e| PlatformError::io("getting current directory", e))?;
    ConfigManager::find_project_root(config, &cwd).ok_or(PlatformError::ProjectRootNotFound)
}

/// Make a user-supplied path absolute against the current directory
pub(crate) fn absolute(path: &Path) -> PlatformResult<PathBuf> {
    std::path::absolute(path).map_err(|e| PlatformError::io(format!("resolving {}", path.display()), e))
}
