//! Build cache archive store
//!
//! Layout below the store root:
//!
//! ```text
//! shared/<target dir>/<key>.tar.gz        caches shared between apps
//! apps/<app>/<target dir>/<key>.tar.gz    caches owned by one app
//! ```

use super::config::{APP_SCOPE, SHARED_SCOPE};
use super::{key, BuildCache};
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info};
use walkdir::WalkDir;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// An archive found in the store
#[derive(Debug, Clone, Serialize)]
pub struct CachedArchive {
    /// `shared` or the owning application
    pub scope: String,
    /// Target directory of the cache
    pub target: String,
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Persists archives of build cache directories, keyed by watched-file content
pub struct BuildCacheStore {
    root: PathBuf,
    excluded: Vec<String>,
    keys: Mutex<HashMap<(PathBuf, PathBuf), String>>,
}

impl BuildCacheStore {
    /// Open the store at `root`.
    ///
    /// `excluded` lists source-relative paths never read for cache keys.
    pub fn new(root: impl Into<PathBuf>, excluded: Vec<String>) -> Self {
        Self {
            root: root.into(),
            excluded,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Restore a cache into `build_dir`.
    ///
    /// Uses `archive` when given, otherwise looks one up. Returns whether
    /// anything was restored.
    pub fn restore(
        &self,
        cache: &BuildCache,
        source_dir: &Path,
        build_dir: &Path,
        archive: Option<&Path>,
    ) -> PlatformResult<bool> {
        fsutil::ensure_writable(build_dir)?;

        let archive = match archive {
            Some(path) => path.to_path_buf(),
            None => match self.find_archive(cache, source_dir, false)? {
                Some(path) => path,
                None => {
                    debug!("No archive for cache '{}' of {}", cache.name(), cache.app());
                    return Ok(false);
                }
            },
        };

        let destination = build_dir.join(cache.target_dir());
        fsutil::extract_archive(&archive, &destination)?;
        info!(
            "Restored cache '{}' into {} from {}",
            cache.name(),
            destination.display(),
            archive.display()
        );
        Ok(true)
    }

    /// Archive `build_dir/<target dir>` under the current cache key
    pub fn save(&self, cache: &BuildCache, source_dir: &Path, build_dir: &Path) -> PlatformResult<PathBuf> {
        let built = build_dir.join(cache.target_dir());
        if !built.is_dir() {
            return Err(PlatformError::MissingBuildOutput(built));
        }

        let key = self.cache_key(cache, source_dir)?;
        let archive = self.archive_path(cache, &key);
        fsutil::archive_dir(&built, &archive)?;
        info!("Saved cache '{}' to {}", cache.name(), archive.display());
        Ok(archive)
    }

    /// Find an archive for a cache.
    ///
    /// An exact key match wins. Otherwise, unless `exact` is set, a cache
    /// that allows stale content falls back to its newest archive.
    pub fn find_archive(
        &self,
        cache: &BuildCache,
        source_dir: &Path,
        exact: bool,
    ) -> PlatformResult<Option<PathBuf>> {
        let key = self.cache_key(cache, source_dir)?;
        let archive = self.archive_path(cache, &key);
        if archive.is_file() {
            return Ok(Some(archive));
        }
        if exact || !cache.allow_stale() {
            return Ok(None);
        }

        let subdir = self.subdirectory(cache);
        let Ok(entries) = fs::read_dir(&subdir) else {
            return Ok(None);
        };
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_archive = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ARCHIVE_SUFFIX));
            if !is_archive || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let newer = match &newest {
                None => true,
                Some((time, best)) => modified > *time || (modified == *time && path > *best),
            };
            if newer {
                newest = Some((modified, path));
            }
        }

        if let Some((_, path)) = &newest {
            debug!("Using stale archive {} for cache '{}'", path.display(), cache.name());
        }
        Ok(newest.map(|(_, path)| path))
    }

    /// Delete one cache's archives, or the whole store.
    ///
    /// Only archives directly in the cache's subdirectory are removed, so a
    /// cache whose target is nested below it keeps its archives.
    pub fn delete_all(&self, cache: Option<&BuildCache>) -> PlatformResult<()> {
        let target = match cache {
            Some(cache) => self.subdirectory(cache),
            None => self.root.clone(),
        };
        if cache.is_some() {
            self.delete_archives_in(&target)?;
        } else {
            fsutil::remove_path(&target)?;
        }
        if let Ok(mut keys) = self.keys.lock() {
            keys.clear();
        }
        info!("Deleted {}", target.display());
        Ok(())
    }

    fn delete_archives_in(&self, dir: &Path) -> PlatformResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PlatformError::io(format!("reading {}", dir.display()), e)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_archive = entry.file_type().is_ok_and(|t| t.is_file())
                && entry.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX);
            if is_archive {
                debug!("Deleting {}", path.display());
                fs::remove_file(&path)
                    .map_err(|e| PlatformError::io(format!("deleting {}", path.display()), e))?;
            }
        }
        // Still holds nested caches when not empty
        let _ = fs::remove_dir(dir);
        Ok(())
    }

    /// Current key of a cache, computed once per store instance
    pub fn cache_key(&self, cache: &BuildCache, source_dir: &Path) -> PlatformResult<String> {
        let memo_key = (cache.store_subdir().join(cache.name()), source_dir.to_path_buf());
        if let Some(key) = self.keys.lock().ok().and_then(|keys| keys.get(&memo_key).cloned()) {
            return Ok(key);
        }
        let key = key::compute(cache, source_dir, &self.excluded)?;
        if let Ok(mut keys) = self.keys.lock() {
            keys.insert(memo_key, key.clone());
        }
        Ok(key)
    }

    /// Directory holding all archives of a cache
    pub fn subdirectory(&self, cache: &BuildCache) -> PathBuf {
        self.root.join(cache.store_subdir())
    }

    fn archive_path(&self, cache: &BuildCache, key: &str) -> PathBuf {
        self.subdirectory(cache).join(format!("{}{}", key, ARCHIVE_SUFFIX))
    }

    /// All archives in the store, ordered by scope, target and age
    pub fn list(&self) -> PlatformResult<Vec<CachedArchive>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(key) = file_name.strip_suffix(ARCHIVE_SUFFIX) else {
                continue;
            };
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Vec<String> = rel
                .parent()
                .map(|p| p.iter().map(|c| c.to_string_lossy().into_owned()).collect())
                .unwrap_or_default();
            let (scope, target) = match parts.split_first() {
                Some((first, rest)) if first == SHARED_SCOPE => (SHARED_SCOPE.to_string(), rest.join("/")),
                Some((first, rest)) if first == APP_SCOPE && !rest.is_empty() => {
                    (rest[0].clone(), rest[1..].join("/"))
                }
                _ => continue,
            };
            let metadata = entry.metadata()?;
            archives.push(CachedArchive {
                scope,
                target,
                key: key.to_string(),
                path: entry.path().to_path_buf(),
                size: metadata.len(),
                modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_default(),
            });
        }
        archives.sort_by(|a, b| {
            (&a.scope, &a.target)
                .cmp(&(&b.scope, &b.target))
                .then_with(|| b.modified.cmp(&a.modified))
        });
        Ok(archives)
    }
}
