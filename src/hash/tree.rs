//! Tree ID computation
//!
//! In a Git working copy the ID combines the staged index (`ls-files -s`,
//! which carries mode, blob hash and path for every tracked file) with the
//! contents of modified and untracked files. Outside Git every file is
//! hashed by path, mode and content, in sorted path order.

use super::{file_mode, hash_bytes, hash_file};
use crate::error::{PlatformError, PlatformResult};
use crate::process;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Bumped when the build output format changes, invalidating old archives
pub const BUILD_VERSION: u32 = 3;

/// Options affecting what a Tree ID covers
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Paths relative to the source directory that are never hashed
    pub excluded: Vec<String>,
    /// Include untracked files of a Git working copy
    pub include_untracked: bool,
    /// Build flags that change the build output
    pub flags: BTreeMap<String, String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            excluded: Vec::new(),
            include_untracked: true,
            flags: BTreeMap::new(),
        }
    }
}

impl TreeOptions {
    /// Exclude a relative path (and everything below it)
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.excluded.push(path.into().trim_matches('/').to_string());
        self
    }

    /// Record a build flag
    pub fn flag(mut self, name: &str, value: impl ToString) -> Self {
        self.flags.insert(name.to_string(), value.to_string());
        self
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        if rel.components().any(|c| c.as_os_str() == ".git") {
            return true;
        }
        self.excluded
            .iter()
            .filter(|e| !e.is_empty())
            .any(|e| rel.starts_with(e))
    }
}

/// Computes Tree IDs for source directories
pub struct ContentHasher;

impl ContentHasher {
    /// Compute the Tree ID of `source_dir`. Never modifies the tree.
    pub fn tree_id(source_dir: &Path, options: &TreeOptions) -> PlatformResult<String> {
        if !source_dir.is_dir() {
            return Err(PlatformError::NotADirectory(source_dir.to_path_buf()));
        }

        let mut parts = match Self::git_parts(source_dir, options)? {
            Some(parts) => parts,
            None => {
                debug!("{} is not a Git working copy, hashing contents", source_dir.display());
                Self::content_parts(source_dir, options)?
            }
        };

        for (name, value) in &options.flags {
            parts.push(format!("flag {}={}", name, value));
        }
        parts.push(format!("version {}", BUILD_VERSION));

        Ok(hash_bytes(parts.join("\n").as_bytes()))
    }

    /// Whether `dir` is inside a Git working copy
    pub fn is_git_working_copy(dir: &Path) -> bool {
        process::capture("git", &["rev-parse", "--is-inside-work-tree"], dir).as_deref()
            == Some("true")
    }

    fn git_parts(source_dir: &Path, options: &TreeOptions) -> PlatformResult<Option<Vec<String>>> {
        if !Self::is_git_working_copy(source_dir) {
            return Ok(None);
        }

        let Some(staged) = process::capture("git", &["ls-files", "-s", "-z", "--", "."], source_dir)
        else {
            return Ok(None);
        };

        let mut index_lines = Vec::new();
        for record in staged.split('\0').filter(|r| !r.is_empty()) {
            let path = record.split_once('\t').map(|(_, p)| p).unwrap_or(record);
            if !options.is_excluded(Path::new(path)) {
                index_lines.push(record.to_string());
            }
        }
        index_lines.sort();

        let mut args = vec!["ls-files", "-z", "--modified"];
        if options.include_untracked {
            args.extend(["--others", "--exclude-standard"]);
        }
        args.extend(["--", "."]);
        let Some(changed) = process::capture("git", &args, source_dir) else {
            return Ok(None);
        };

        let mut changed_paths: Vec<PathBuf> = changed
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .filter(|p| !options.is_excluded(p))
            .collect();
        changed_paths.sort();
        changed_paths.dedup();

        let mut parts = vec![format!("index {}", hash_bytes(index_lines.join("\n").as_bytes()))];
        for rel in changed_paths {
            let abs = source_dir.join(&rel);
            let meta = fs::symlink_metadata(&abs);
            let entry = match meta {
                Ok(m) if m.file_type().is_symlink() => {
                    let target = fs::read_link(&abs)
                        .map_err(|e| PlatformError::io(format!("reading link {}", abs.display()), e))?;
                    format!("link {} {}", rel.display(), target.display())
                }
                Ok(m) if m.is_file() => {
                    format!("file {} {} {}", rel.display(), file_mode(&abs)?, hash_file(&abs)?)
                }
                Ok(_) => continue,
                Err(_) => format!("deleted {}", rel.display()),
            };
            parts.push(entry);
        }
        Ok(Some(parts))
    }

    fn content_parts(source_dir: &Path, options: &TreeOptions) -> PlatformResult<Vec<String>> {
        let mut parts = Vec::new();
        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(source_dir)
                    .map(|rel| !options.is_excluded(rel))
                    .unwrap_or(false)
            });

        for entry in walker {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(|_| PlatformError::Internal("walk escaped source dir".to_string()))?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                let target = fs::read_link(entry.path()).map_err(|e| {
                    PlatformError::io(format!("reading link {}", entry.path().display()), e)
                })?;
                parts.push(format!("link {} {}", rel.display(), target.display()));
            } else if file_type.is_file() {
                parts.push(format!(
                    "file {} {} {}",
                    rel.display(),
                    file_mode(entry.path())?,
                    hash_file(entry.path())?
                ));
            }
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn git_available() -> bool {
        process::command_exists("git")
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "core.fileMode", "true"]);
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", "initial"]);
    }

    #[test]
    fn missing_dir_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let err = ContentHasher::tree_id(&temp.path().join("nope"), &TreeOptions::default())
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotADirectory(_)));
    }

    #[test]
    fn content_hash_is_deterministic() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        // Written in different orders
        write(one.path(), "b.txt", "b");
        write(one.path(), "a/x.txt", "x");
        write(two.path(), "a/x.txt", "x");
        write(two.path(), "b.txt", "b");

        let opts = TreeOptions::default();
        let id1 = ContentHasher::tree_id(one.path(), &opts).unwrap();
        let id2 = ContentHasher::tree_id(two.path(), &opts).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1, ContentHasher::tree_id(one.path(), &opts).unwrap());
    }

    #[test]
    fn content_change_changes_id() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.php", "one");
        let opts = TreeOptions::default();
        let before = ContentHasher::tree_id(temp.path(), &opts).unwrap();
        write(temp.path(), "index.php", "two");
        assert_ne!(before, ContentHasher::tree_id(temp.path(), &opts).unwrap());
    }

    #[test]
    fn excluded_paths_and_vcs_metadata_are_ignored() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.php", "one");
        let opts = TreeOptions::default().exclude(".platform/local").exclude("_www");
        let before = ContentHasher::tree_id(temp.path(), &opts).unwrap();

        write(temp.path(), ".platform/local/builds/x/file", "built");
        write(temp.path(), "_www/index.html", "served");
        write(temp.path(), "vendor/.git/HEAD", "ref");
        assert_eq!(before, ContentHasher::tree_id(temp.path(), &opts).unwrap());
    }

    #[test]
    fn flags_change_id() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.php", "one");
        let plain = ContentHasher::tree_id(temp.path(), &TreeOptions::default()).unwrap();
        let cloned =
            ContentHasher::tree_id(temp.path(), &TreeOptions::default().flag("clone", true)).unwrap();
        assert_ne!(plain, cloned);
    }

    #[cfg(unix)]
    #[test]
    fn content_hash_touch_keeps_id_chmod_changes_it() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        write(temp.path(), "run.sh", "echo hi");
        let path = temp.path().join("run.sh");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let opts = TreeOptions::default();
        let before = ContentHasher::tree_id(temp.path(), &opts).unwrap();

        // Rewriting identical content only moves the timestamp
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&path, "echo hi").unwrap();
        assert_eq!(before, ContentHasher::tree_id(temp.path(), &opts).unwrap());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        assert_ne!(before, ContentHasher::tree_id(temp.path(), &opts).unwrap());
    }

    #[test]
    fn git_clean_tree_is_stable() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.php", "<?php echo 1;");
        init_repo(temp.path());
        assert!(ContentHasher::is_git_working_copy(temp.path()));

        let opts = TreeOptions::default();
        let first = ContentHasher::tree_id(temp.path(), &opts).unwrap();
        let second = ContentHasher::tree_id(temp.path(), &opts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn git_untracked_and_modified_files_change_id() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.php", "<?php echo 1;");
        init_repo(temp.path());
        let opts = TreeOptions::default();
        let clean = ContentHasher::tree_id(temp.path(), &opts).unwrap();

        write(temp.path(), "new.txt", "untracked");
        let untracked = ContentHasher::tree_id(temp.path(), &opts).unwrap();
        assert_ne!(clean, untracked);

        let without_untracked = TreeOptions {
            include_untracked: false,
            ..TreeOptions::default()
        };
        assert_eq!(
            ContentHasher::tree_id(temp.path(), &without_untracked).unwrap(),
            {
                fs::remove_file(temp.path().join("new.txt")).unwrap();
                let id = ContentHasher::tree_id(temp.path(), &without_untracked).unwrap();
                write(temp.path(), "new.txt", "untracked");
                id
            }
        );

        write(temp.path(), "index.php", "<?php echo 2;");
        assert_ne!(untracked, ContentHasher::tree_id(temp.path(), &opts).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn git_touch_keeps_id_chmod_changes_it() {
        use std::os::unix::fs::PermissionsExt;
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        write(temp.path(), "run.sh", "echo hi");
        let path = temp.path().join("run.sh");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        init_repo(temp.path());
        let opts = TreeOptions::default();
        let clean = ContentHasher::tree_id(temp.path(), &opts).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&path, "echo hi").unwrap();
        assert_eq!(clean, ContentHasher::tree_id(temp.path(), &opts).unwrap());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        assert_ne!(clean, ContentHasher::tree_id(temp.path(), &opts).unwrap());
    }
}
