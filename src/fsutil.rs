//! Filesystem helpers shared by the build, cache and archive code
//!
//! Archives are gzip-compressed tarballs written through a temporary file
//! in the destination directory and renamed into place, so an interrupted
//! write never leaves a truncated `<hash>.tar.gz` behind.

use crate::error::{PlatformError, PlatformResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How files are placed into a build directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Hard-link each file, copying when linking is not possible
    HardLink,
    /// Deep copy
    Copy,
}

/// Compress a directory's contents into a `.tar.gz` archive
pub fn archive_dir(dir: &Path, archive: &Path) -> PlatformResult<()> {
    let parent = archive
        .parent()
        .ok_or_else(|| PlatformError::Internal(format!("archive has no parent: {}", archive.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| PlatformError::io(format!("creating directory {}", parent.display()), e))?;

    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|_| PlatformError::DirectoryNotWritable(parent.to_path_buf()))?;

    {
        let encoder = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);
        builder
            .append_dir_all(".", dir)
            .map_err(|e| PlatformError::io(format!("archiving {}", dir.display()), e))?;
        let encoder = builder
            .into_inner()
            .map_err(|e| PlatformError::io("finishing tar stream", e))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| PlatformError::io("finishing gzip stream", e))?;
        writer
            .flush()
            .map_err(|e| PlatformError::io("flushing archive", e))?;
    }

    tmp.persist(archive)
        .map_err(|e| PlatformError::io(format!("writing archive {}", archive.display()), e.error))?;
    debug!("Archived {} to {}", dir.display(), archive.display());
    Ok(())
}

/// Extract a `.tar.gz` archive into a directory, creating it if needed
pub fn extract_archive(archive: &Path, dest: &Path) -> PlatformResult<()> {
    fs::create_dir_all(dest)
        .map_err(|e| PlatformError::io(format!("creating directory {}", dest.display()), e))?;

    let file = File::open(archive)
        .map_err(|e| PlatformError::io(format!("opening archive {}", archive.display()), e))?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(dest)
        .map_err(|e| PlatformError::io(format!("extracting {}", archive.display()), e))?;
    debug!("Extracted {} into {}", archive.display(), dest.display());
    Ok(())
}

/// Fail with `DirectoryNotWritable` unless files can be created in `dir`
pub fn ensure_writable(dir: &Path) -> PlatformResult<()> {
    if !dir.is_dir() {
        return Err(PlatformError::DirectoryNotWritable(dir.to_path_buf()));
    }
    tempfile::tempfile_in(dir)
        .map(|_| ())
        .map_err(|_| PlatformError::DirectoryNotWritable(dir.to_path_buf()))
}

/// Build a glob set from patterns
pub fn glob_set(patterns: &[String]) -> PlatformResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PlatformError::invalid_config(format!("invalid pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PlatformError::invalid_config(e.to_string()))
}

/// Mirror `src` into `dest`.
///
/// Top-level entries whose names match `skip` are left out. Existing files
/// in `dest` are replaced; symlinks are recreated as symlinks.
pub fn mirror(src: &Path, dest: &Path, placement: Placement, skip: &GlobSet) -> PlatformResult<()> {
    fs::create_dir_all(dest)
        .map_err(|e| PlatformError::io(format!("creating directory {}", dest.display()), e))?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || !skip.is_match(entry.file_name()));

    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| PlatformError::Internal(format!("path escaped {}", src.display())))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| PlatformError::io(format!("creating directory {}", target.display()), e))?;
            continue;
        }

        if fs::symlink_metadata(&target).is_ok() {
            remove_path(&target)?;
        }

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| PlatformError::io(format!("reading link {}", entry.path().display()), e))?;
            create_symlink(&link, &target)?;
        } else if placement == Placement::HardLink && fs::hard_link(entry.path(), &target).is_ok() {
            continue;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| PlatformError::io(format!("copying {}", entry.path().display()), e))?;
        }
    }
    Ok(())
}

/// Give every hard-linked regular file below `dir` an inode of its own.
///
/// Files placed with [`Placement::HardLink`] share their inode with the
/// source, so writing through them would change the source file.
/// Returns the number of files copied.
pub fn detach_hard_links(dir: &Path) -> PlatformResult<usize> {
    let mut shared = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && is_shared(&entry.metadata()?) {
            shared.push(entry.into_path());
        }
    }

    for path in &shared {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let staged = path.with_file_name(format!(".{}.detach", name));
        fs::copy(path, &staged)
            .map_err(|e| PlatformError::io(format!("copying {}", path.display()), e))?;
        fs::rename(&staged, path)
            .map_err(|e| PlatformError::io(format!("replacing {}", path.display()), e))?;
    }
    Ok(shared.len())
}

#[cfg(unix)]
fn is_shared(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.nlink() > 1
}

#[cfg(not(unix))]
fn is_shared(_meta: &fs::Metadata) -> bool {
    true
}

/// Remove a file, symlink or directory tree. Missing paths are ignored.
pub fn remove_path(path: &Path) -> PlatformResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(()),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| PlatformError::io(format!("removing {}", path.display()), e))
}

/// Create a symlink at `link` pointing to `target`
pub fn create_symlink(target: &Path, link: &Path) -> PlatformResult<()> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let result = if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    };
    result.map_err(|e| PlatformError::io(format!("symlinking {}", link.display()), e))
}

/// Point `link` at `target`, replacing whatever is there.
///
/// The new link is created beside the old one and renamed over it, so
/// readers see either the old or the new target.
pub fn replace_symlink(target: &Path, link: &Path, absolute: bool) -> PlatformResult<()> {
    let parent = link
        .parent()
        .ok_or_else(|| PlatformError::Internal(format!("link has no parent: {}", link.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| PlatformError::io(format!("creating directory {}", parent.display()), e))?;

    let pointee = if absolute {
        target.to_path_buf()
    } else {
        relative_path(parent, target)
    };

    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));
    remove_path(&staging)?;
    create_symlink(&pointee, &staging)?;

    // rename() cannot replace a real directory
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.is_dir() {
            warn!("Replacing directory {} with a symlink", link.display());
            remove_path(link)?;
        }
    }

    fs::rename(&staging, link)
        .map_err(|e| PlatformError::io(format!("moving symlink into {}", link.display()), e))
}

/// Express `target` relative to the directory `base`
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().collect();
    let target_components: Vec<Component> = target.components().collect();

    let common = base
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && base.first() != target_components.first() {
        return target.to_path_buf();
    }

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target_components[common..] {
        rel.push(component.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}
