//! Application discovery
//!
//! Applications are declared either by an application file in their root
//! directory or by an entry in the project's grouped applications file.
//! Discovery stops descending at an application root, so applications
//! never nest.

use super::config::type_name;
use super::{dir_name, AppConfig, AppRegistry, Application, InvalidApp};
use crate::config::Config;
use crate::error::{PlatformError, PlatformResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names never searched for applications
const IGNORED_DIRS: &[&str] = &[".git", ".idea", "builds", "node_modules", "vendor"];

/// Applications found so far, loaded or not
#[derive(Default)]
struct Found {
    apps: Vec<Application>,
    invalid: Vec<InvalidApp>,
}

impl Found {
    /// Keep an app that failed to load when the error is local to it
    fn reject(&mut self, app: InvalidApp) -> PlatformResult<()> {
        if !app.error.is_per_app() {
            return Err(app.error);
        }
        warn!("Skipping application {}: {}", app.id, app.error);
        self.invalid.push(app);
        Ok(())
    }

    fn extend(&mut self, other: Found) {
        self.apps.extend(other.apps);
        self.invalid.extend(other.invalid);
    }
}

/// Finds applications inside a source directory
pub struct ApplicationFinder<'a> {
    config: &'a Config,
}

impl<'a> ApplicationFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find all applications below `repository_root`, ordered by path.
    ///
    /// Applications whose configuration is invalid are kept in the
    /// registry's invalid list so the others can still be built.
    pub fn find_applications(&self, repository_root: &Path) -> PlatformResult<AppRegistry> {
        if !repository_root.is_dir() {
            return Err(PlatformError::NotADirectory(repository_root.to_path_buf()));
        }

        let grouped = self.find_grouped(repository_root)?;
        let grouped_roots: Vec<PathBuf> = grouped.apps.iter().map(|app| app.root.clone()).collect();
        let mut found = self.find_app_files(repository_root, &grouped_roots)?;
        found.extend(grouped);

        // Names must be unique, and so must the build directories they map to
        let mut seen: HashMap<String, (String, PathBuf)> = HashMap::new();
        let declared = found
            .apps
            .iter()
            .map(|app| (&app.id, &app.config_file))
            .chain(found.invalid.iter().map(|app| (&app.id, &app.config_file)));
        for (id, config_file) in declared {
            if let Some((first_id, first)) = seen.get(&dir_name(id)) {
                return Err(PlatformError::DuplicateName {
                    name: if first_id == id { id.clone() } else { format!("{} (as {})", id, first_id) },
                    first: first.clone(),
                    second: config_file.clone(),
                });
            }
            seen.insert(dir_name(id), (id.clone(), config_file.clone()));
        }

        debug!(
            "Found {} application(s) in {} ({} invalid)",
            found.apps.len() + found.invalid.len(),
            repository_root.display(),
            found.invalid.len()
        );
        Ok(AppRegistry::new(found.apps).with_invalid(found.invalid))
    }

    /// Applications declared by their own application file
    fn find_app_files(&self, root: &Path, grouped_roots: &[PathBuf]) -> PlatformResult<Found> {
        let file_name = self.config.service.app_config_file.as_str();
        let excluded = self.config.excluded_source_paths();
        let mut found = Found::default();

        let mut walker = WalkDir::new(root)
            .max_depth(self.config.build.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return false;
                }
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if IGNORED_DIRS.contains(&&*name) {
                    return false;
                }
                let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
                !excluded.iter().any(|e| !e.is_empty() && rel.starts_with(e))
                    && !grouped_roots.iter().any(|g| entry.path().starts_with(g))
            });

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping unreadable path: {}", err);
                    continue;
                }
            };
            let config_file = entry.path().join(file_name);
            if !config_file.is_file() {
                continue;
            }

            // Applications do not nest
            walker.skip_current_dir();

            let loaded = AppConfig::from_file(&config_file).and_then(|config| {
                let app_root = match &config.source_root {
                    Some(explicit) => explicit_root(root, explicit, &config_file)?,
                    None => entry.path().to_path_buf(),
                };
                Ok((app_root, config))
            });
            match loaded {
                Ok((app_root, config)) => {
                    found.apps.push(application(root, app_root, config_file, config, None))
                }
                Err(error) => found.reject(invalid(root, entry.path(), config_file, None, error))?,
            }
        }
        Ok(found)
    }

    /// Applications declared in the grouped applications file
    fn find_grouped(&self, root: &Path) -> PlatformResult<Found> {
        let config_file = root.join(&self.config.service.applications_config_file);
        let mut found = Found::default();
        if !config_file.is_file() {
            return Ok(found);
        }

        let content = fs::read_to_string(&config_file)
            .map_err(|e| PlatformError::io(format!("reading {}", config_file.display()), e))?;
        let document: Value = serde_yaml::from_str(&content).map_err(|e| {
            PlatformError::invalid_config(format!("{}: {}", config_file.display(), e))
        })?;

        let entries: Vec<(Option<String>, Value)> = match document {
            Value::Null => Vec::new(),
            Value::Mapping(map) => map
                .into_iter()
                .map(|(key, value)| (key.as_str().map(str::to_string), value))
                .collect(),
            Value::Sequence(list) => list.into_iter().map(|value| (None, value)).collect(),
            other => {
                return Err(PlatformError::invalid_config(format!(
                    "{}: expected a map of applications, found {}",
                    config_file.display(),
                    type_name(&other)
                )))
            }
        };

        for (index, (key, value)) in entries.into_iter().enumerate() {
            let label = key.clone().unwrap_or_else(|| index.to_string());
            match grouped_entry(root, &config_file, &label, value) {
                Ok((app_root, config)) => {
                    found.apps.push(application(root, app_root, config_file.clone(), config, key))
                }
                Err(error) => {
                    let id = key.unwrap_or_else(|| format!("#{}", index));
                    let declared = root.join(&id);
                    found.reject(invalid(root, &declared, config_file.clone(), Some(id), error))?
                }
            }
        }
        Ok(found)
    }
}

/// Load one entry of the grouped applications file
fn grouped_entry(root: &Path, config_file: &Path, label: &str, value: Value) -> PlatformResult<(PathBuf, AppConfig)> {
    if !value.is_mapping() {
        return Err(PlatformError::invalid_config(format!(
            "{}: application '{}' has invalid type {}: it must be a map",
            config_file.display(),
            label,
            type_name(&value)
        )));
    }
    let config = AppConfig::from_value(value).map_err(|e| {
        PlatformError::invalid_config(format!("{} ({}): {}", config_file.display(), label, e))
    })?;
    let Some(explicit) = config.source_root.clone() else {
        return Err(PlatformError::invalid_config(format!(
            "{} ({}): the \"source.root\" key is required",
            config_file.display(),
            label
        )));
    };
    let app_root = explicit_root(root, &explicit, config_file)?;
    Ok((app_root, config))
}

fn explicit_root(repository_root: &Path, explicit: &str, config_file: &Path) -> PlatformResult<PathBuf> {
    let app_root = if explicit.is_empty() {
        repository_root.to_path_buf()
    } else {
        repository_root.join(explicit)
    };
    if !app_root.is_dir() {
        return Err(PlatformError::invalid_config(format!(
            "{}: directory not found: {}",
            config_file.display(),
            app_root.display()
        )));
    }
    Ok(app_root)
}

/// Record of an application that failed to load, named like a valid one
fn invalid(
    repository_root: &Path,
    declared_at: &Path,
    config_file: PathBuf,
    key: Option<String>,
    error: PlatformError,
) -> InvalidApp {
    let relative = declared_at
        .strip_prefix(repository_root)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    InvalidApp {
        id: key.unwrap_or_else(|| path_name(&relative)),
        relative,
        config_file,
        error,
    }
}

fn path_name(relative: &Path) -> String {
    let rel = relative.to_string_lossy().replace('\\', "/");
    if rel.is_empty() {
        "default".to_string()
    } else {
        rel
    }
}

fn application(
    repository_root: &Path,
    app_root: PathBuf,
    config_file: PathBuf,
    config: AppConfig,
    key: Option<String>,
) -> Application {
    let relative = app_root
        .strip_prefix(repository_root)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let id = config.name.clone().or(key).unwrap_or_else(|| path_name(&relative));
    Application::new(id, app_root, relative, config_file, config)
}
