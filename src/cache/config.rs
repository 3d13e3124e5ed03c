//! Build cache declarations
//!
//! An application's `caches` section maps cache names to definitions:
//!
//! ```yaml
//! caches:
//!   node_modules:
//!     watch: [package.json, package-lock.json]
//!     allow_stale: true
//!   vendor:
//!     directory: vendor
//!     watch: composer.lock
//!     share_between_apps: true
//! ```

use crate::app::type_name;
use crate::error::{PlatformError, PlatformResult};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Store bucket for caches shared between applications
pub const SHARED_SCOPE: &str = "shared";

/// Store bucket prefix for caches owned by one application
pub const APP_SCOPE: &str = "apps";

/// A named cache of one directory of an application's build output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCache {
    name: String,
    app: String,
    directory: String,
    watch: Vec<String>,
    allow_stale: bool,
    share_between_apps: bool,
}

impl BuildCache {
    /// Parse one cache definition
    pub fn from_config(name: &str, app: &str, definition: &Value) -> PlatformResult<Self> {
        if name.trim().is_empty() {
            return Err(PlatformError::invalid_config(
                "the cache name must be a non-empty string",
            ));
        }
        let Some(map) = definition.as_mapping() else {
            return Err(PlatformError::invalid_config(format!(
                "cache '{}' must be a map, found {}",
                name,
                type_name(definition)
            )));
        };

        let watch = match map.get("watch") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(path)) => vec![path.clone()],
            Some(Value::Sequence(paths)) => paths
                .iter()
                .map(|p| {
                    p.as_str().map(str::to_string).ok_or_else(|| {
                        PlatformError::invalid_config(format!(
                            "cache '{}': watched paths must be strings",
                            name
                        ))
                    })
                })
                .collect::<PlatformResult<Vec<_>>>()?,
            Some(other) => {
                return Err(PlatformError::invalid_config(format!(
                    "cache '{}': 'watch' must be a list of paths, found {}",
                    name,
                    type_name(other)
                )))
            }
        };
        let watch: Vec<String> = watch
            .into_iter()
            .map(|p| p.trim_start_matches(['/', '\\']).to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if watch.is_empty() {
            return Err(PlatformError::invalid_config(format!(
                "cache '{}': 'watch' is required and must not be empty",
                name
            )));
        }

        let directory = match map.get("directory") {
            None | Some(Value::Null) => name.to_string(),
            Some(Value::String(dir)) => dir.clone(),
            Some(other) => {
                return Err(PlatformError::invalid_config(format!(
                    "cache '{}': 'directory' must be a string, found {}",
                    name,
                    type_name(other)
                )))
            }
        };
        let directory = directory.trim_matches(['/', '\\']).to_string();
        if directory.is_empty() || Path::new(&directory).components().any(|c| c.as_os_str() == "..") {
            return Err(PlatformError::invalid_config(format!(
                "cache '{}': 'directory' must be a relative path inside the build",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            app: app.to_string(),
            directory,
            watch,
            allow_stale: bool_field(map, name, "allow_stale")?,
            share_between_apps: bool_field(map, name, "share_between_apps")?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning application
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Directory inside the build output, relative, without leading slash
    pub fn target_dir(&self) -> &str {
        &self.directory
    }

    /// Watched path globs, relative to the source directory
    pub fn watched_paths(&self) -> &[String] {
        &self.watch
    }

    pub fn allow_stale(&self) -> bool {
        self.allow_stale
    }

    pub fn shared(&self) -> bool {
        self.share_between_apps
    }

    /// Store subdirectory holding this cache's archives, relative to the store root
    pub fn store_subdir(&self) -> std::path::PathBuf {
        let scope = if self.share_between_apps {
            Path::new(SHARED_SCOPE).to_path_buf()
        } else {
            Path::new(APP_SCOPE).join(crate::app::dir_name(&self.app))
        };
        scope.join(&self.directory)
    }
}

fn bool_field(map: &Mapping, cache: &str, key: &str) -> PlatformResult<bool> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(PlatformError::invalid_config(format!(
            "cache '{}': {} must be a Boolean (true or false), found {}",
            cache,
            key,
            type_name(other)
        ))),
    }
}

/// All caches of one application, validated as a unit
#[derive(Debug, Clone, Default)]
pub struct BuildCacheCollection {
    caches: Vec<BuildCache>,
}

impl BuildCacheCollection {
    /// Parse and validate an application's `caches` section
    pub fn from_app_config(app: &str, caches: &Value) -> PlatformResult<Self> {
        let map = match caches {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(map) => map,
            other => {
                return Err(PlatformError::invalid_config(format!(
                    "'caches' must be a map, found {}",
                    type_name(other)
                )))
            }
        };

        let mut parsed: Vec<BuildCache> = Vec::with_capacity(map.len());
        for (name, definition) in map {
            let name = match name {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => String::new(),
            };
            parsed.push(BuildCache::from_config(&name, app, definition)?);
        }

        for (i, a) in parsed.iter().enumerate() {
            for b in &parsed[i + 1..] {
                let (pa, pb) = (Path::new(a.target_dir()), Path::new(b.target_dir()));
                if pa.starts_with(pb) || pb.starts_with(pa) {
                    return Err(PlatformError::invalid_config(format!(
                        "cache directories must not be nested: '{}' ({}) and '{}' ({})",
                        a.target_dir(),
                        a.name(),
                        b.target_dir(),
                        b.name()
                    )));
                }
            }
        }

        Ok(Self { caches: parsed })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BuildCache> {
        self.caches.iter()
    }

    pub fn get(&self, name: &str) -> Option<&BuildCache> {
        self.caches.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

impl<'a> IntoIterator for &'a BuildCacheCollection {
    type Item = &'a BuildCache;
    type IntoIter = std::slice::Iter<'a, BuildCache>;

    fn into_iter(self) -> Self::IntoIter {
        self.caches.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caches(yaml: &str) -> PlatformResult<BuildCacheCollection> {
        BuildCacheCollection::from_app_config("app", &serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn parses_defaults() {
        let collection = caches(
            r#"
node_modules:
  watch: package.json
vendor:
  directory: /lib/vendor
  watch: [composer.json, /composer.lock]
  allow_stale: true
  share_between_apps: true
"#,
        )
        .unwrap();
        assert_eq!(collection.len(), 2);

        let node = collection.get("node_modules").unwrap();
        assert_eq!(node.target_dir(), "node_modules");
        assert_eq!(node.watched_paths(), ["package.json".to_string()]);
        assert!(!node.allow_stale());
        assert_eq!(node.store_subdir(), Path::new("apps/app/node_modules"));

        let vendor = collection.get("vendor").unwrap();
        assert_eq!(vendor.target_dir(), "lib/vendor");
        assert_eq!(vendor.watched_paths()[1], "composer.lock");
        assert!(vendor.allow_stale());
        assert_eq!(vendor.store_subdir(), Path::new("shared/lib/vendor"));
    }

    #[test]
    fn missing_section_is_empty() {
        assert!(BuildCacheCollection::from_app_config("app", &Value::Null)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn watch_is_required() {
        let err = caches("deps:\n  directory: deps\n").unwrap_err();
        assert!(err.to_string().contains("'watch' is required"));
        assert!(caches("deps:\n  watch: []\n").is_err());
    }

    #[test]
    fn booleans_are_checked() {
        let err = caches("deps:\n  watch: a\n  allow_stale: 'yes'\n").unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfig(_)));
        assert!(err.to_string().contains("allow_stale must be a Boolean"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = caches("'':\n  watch: a\n").unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn nested_directories_are_rejected() {
        let err = caches(
            r#"
outer:
  directory: foo
  watch: a
inner:
  directory: foo/bar
  watch: b
"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'foo'"));
        assert!(message.contains("'foo/bar'"));
    }

    #[test]
    fn sibling_directories_with_shared_prefix_are_allowed() {
        let collection = caches(
            r#"
a:
  directory: foo
  watch: a
b:
  directory: foobar
  watch: b
"#,
        )
        .unwrap();
        assert_eq!(collection.iter().count(), 2);
    }
}
