//! Removal of old builds and full-build archives

use super::CleanSummary;
use crate::config::Config;
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Suffix of build directories still being written
pub const TMP_SUFFIX: &str = "-tmp";

/// Cleans the local build directories of one project
pub struct Cleaner<'a> {
    config: &'a Config,
    project_root: &'a Path,
    destination: PathBuf,
}

impl<'a> Cleaner<'a> {
    /// `destination` is the web root whose links mark builds as active
    pub fn new(config: &'a Config, project_root: &'a Path, destination: Option<PathBuf>) -> Self {
        Self {
            config,
            project_root,
            destination: destination.unwrap_or_else(|| config.web_root(project_root)),
        }
    }

    /// Remove old builds, keeping the newest `keep` and any active build.
    ///
    /// Unfinished (`-tmp`) builds are always removed.
    pub fn clean_builds(
        &self,
        keep: usize,
        max_age: Option<Duration>,
        include_active: bool,
    ) -> PlatformResult<CleanSummary> {
        let builds_dir = self.config.builds_dir(self.project_root);
        let exclude = if include_active {
            Vec::new()
        } else {
            self.active_builds()
        };
        clean_directory(&builds_dir, keep, max_age, &exclude, |path| {
            path.is_dir()
        })
    }

    /// Remove old full-build archives, keeping the newest `keep`
    pub fn clean_archives(&self, keep: usize, max_age: Option<Duration>) -> PlatformResult<CleanSummary> {
        let archives_dir = self.config.archives_dir(self.project_root);
        clean_directory(&archives_dir, keep, max_age, &[], |path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".tar.gz"))
        })
    }

    /// Build directories that the web root links point into
    pub fn active_builds(&self) -> Vec<PathBuf> {
        let builds_dir = self.config.builds_dir(self.project_root);
        let Ok(builds_dir) = builds_dir.canonicalize() else {
            return Vec::new();
        };

        let mut links = vec![self.destination.clone()];
        let is_link = fs::symlink_metadata(&self.destination)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link && self.destination.is_dir() {
            if let Ok(entries) = fs::read_dir(&self.destination) {
                links.extend(entries.flatten().map(|e| e.path()));
            }
        }

        let mut active = Vec::new();
        for link in links {
            let Ok(meta) = fs::symlink_metadata(&link) else {
                continue;
            };
            if !meta.file_type().is_symlink() {
                continue;
            }
            let Ok(target) = link.canonicalize() else {
                continue;
            };
            // The build is the ancestor directly below the builds directory
            let build = target
                .ancestors()
                .find(|p| p.parent() == Some(builds_dir.as_path()))
                .map(Path::to_path_buf);
            if let Some(build) = build {
                debug!("Active build: {}", build.display());
                active.push(build);
            }
        }
        active
    }
}

fn clean_directory(
    dir: &Path,
    keep: usize,
    max_age: Option<Duration>,
    exclude: &[PathBuf],
    include: impl Fn(&Path) -> bool,
) -> PlatformResult<CleanSummary> {
    let mut summary = CleanSummary::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(summary);
    };

    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !include(&path) {
            continue;
        }
        let unfinished = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with(TMP_SUFFIX));
        if unfinished {
            remove(&path, &mut summary);
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path));
    }
    // Newest first
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let now = SystemTime::now();
    for (modified, path) in candidates {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if exclude.iter().any(|e| *e == canonical || *e == path) {
            summary.kept += 1;
            continue;
        }
        let too_old = max_age.is_some_and(|age| {
            now.duration_since(modified).unwrap_or_default() > age
        });
        if summary.kept >= keep || too_old {
            remove(&path, &mut summary);
        } else {
            summary.kept += 1;
        }
    }
    Ok(summary)
}

fn remove(path: &Path, summary: &mut CleanSummary) {
    match fsutil::remove_path(path) {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            summary.deleted += 1;
        }
        Err(PlatformError::Io { source, .. }) => {
            warn!("Failed to delete {}: {}", path.display(), source);
        }
        Err(err) => warn!("Failed to delete {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn make_build(builds: &Path, name: &str, secs_ago: u64) -> PathBuf {
        let dir = builds.join(name);
        fs::create_dir_all(&dir).unwrap();
        let marker = dir.join("index.html");
        fs::write(&marker, name).unwrap();
        let time = SystemTime::now() - Duration::from_secs(secs_ago);
        File::open(&dir).unwrap().set_modified(time).unwrap();
        dir
    }

    #[test]
    fn keeps_newest_and_removes_unfinished() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let builds = config.builds_dir(temp.path());
        let old = make_build(&builds, "1000", 300);
        let mid = make_build(&builds, "2000", 200);
        let new = make_build(&builds, "3000", 100);
        let tmp = make_build(&builds, "4000-tmp", 10);

        let cleaner = Cleaner::new(&config, temp.path(), None);
        let summary = cleaner.clean_builds(2, None, false).unwrap();
        assert_eq!(summary, CleanSummary { deleted: 2, kept: 2 });
        assert!(!old.exists());
        assert!(mid.exists());
        assert!(new.exists());
        assert!(!tmp.exists());
    }

    #[cfg(unix)]
    #[test]
    fn active_build_is_kept() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let builds = config.builds_dir(temp.path());
        let active = make_build(&builds, "1000", 300);
        make_build(&builds, "2000", 100);
        fs::create_dir_all(active.join("public")).unwrap();
        std::os::unix::fs::symlink(active.join("public"), temp.path().join("_www")).unwrap();

        let cleaner = Cleaner::new(&config, temp.path(), None);
        assert_eq!(cleaner.active_builds(), vec![active.canonicalize().unwrap()]);

        let summary = cleaner.clean_builds(0, None, false).unwrap();
        assert_eq!(summary, CleanSummary { deleted: 1, kept: 1 });
        assert!(active.exists());

        let summary = cleaner.clean_builds(0, None, true).unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(!active.exists());
    }

    #[test]
    fn max_age_removes_old_archives() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let archives = config.archives_dir(temp.path());
        fs::create_dir_all(&archives).unwrap();
        for (name, age) in [("a.tar.gz", 7200u64), ("b.tar.gz", 60), ("notes.txt", 7200)] {
            let path = archives.join(name);
            fs::write(&path, "x").unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(age))
                .unwrap();
        }

        let cleaner = Cleaner::new(&config, temp.path(), None);
        let summary = cleaner
            .clean_archives(10, Some(Duration::from_secs(3600)))
            .unwrap();
        assert_eq!(summary, CleanSummary { deleted: 1, kept: 1 });
        assert!(archives.join("notes.txt").exists());
    }
}
