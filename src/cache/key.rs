//! Cache key computation
//!
//! A key is the SHA-256 of the cache name and the sorted `path:digest`
//! pairs of every watched file. A file is watched when its relative path,
//! or the path of one of its parent directories, matches a watch glob, so
//! `watch: [assets]` covers everything below `assets/`.

use super::BuildCache;
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil;
use crate::hash::{hash_bytes, hash_file};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Compute the key of `cache` for the files in `source_dir`.
///
/// `excluded` lists relative paths that are never read.
pub fn compute(cache: &BuildCache, source_dir: &Path, excluded: &[String]) -> PlatformResult<String> {
    if !source_dir.is_dir() {
        return Err(PlatformError::NotADirectory(source_dir.to_path_buf()));
    }
    let globs = fsutil::glob_set(cache.watched_paths())?;

    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let Ok(rel) = entry.path().strip_prefix(source_dir) else {
                return false;
            };
            entry.file_name() != ".git"
                && !excluded.iter().any(|e| !e.is_empty() && rel.starts_with(e))
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| PlatformError::Internal("walk escaped source dir".to_string()))?;
        if !rel.ancestors().any(|p| !p.as_os_str().is_empty() && globs.is_match(p)) {
            continue;
        }

        let digest = if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .map_err(|e| PlatformError::io(format!("reading link {}", entry.path().display()), e))?;
            hash_bytes(target.to_string_lossy().as_bytes())
        } else {
            hash_file(entry.path())?
        };
        entries.push(format!("{}:{}", rel.to_string_lossy().replace('\\', "/"), digest));
    }
    entries.sort();

    let mut material = format!("{}\n", cache.name());
    for line in &entries {
        material.push_str(line);
        material.push('\n');
    }
    Ok(hash_bytes(material.as_bytes()))
}
