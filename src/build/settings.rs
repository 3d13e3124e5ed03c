//! Options for one local build

use std::collections::BTreeMap;
use std::path::PathBuf;

/// How application source is placed into the build directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Hard-link files (copying where linking fails). Linked files are
    /// copied before any command runs in the build directory.
    Link,
    /// Deep copy
    Copy,
    /// Export the committed tree via Git
    Clone,
}

/// Options controlling a local build
#[derive(Debug, Clone, Default)]
pub struct BuildSettings {
    /// Keep old builds and archives
    pub no_clean: bool,
    /// Skip build dependencies
    pub no_deps: bool,
    /// Skip `hooks.build`
    pub no_build_hooks: bool,
    /// Disable package manager caches and full-build archives
    pub no_cache: bool,
    /// Neither use nor create full-build archives
    pub no_archive: bool,
    /// Copy files instead of hard-linking them
    pub copy: bool,
    /// Build from the committed tree only
    pub clone: bool,
    /// Use absolute symlink targets
    pub abslinks: bool,
    /// Treat a dependency install failure as a build failure
    pub deps_required: bool,
    /// Run `hooks.deploy` and `hooks.post_deploy` after building
    pub run_deploy_hooks: bool,
    /// Only build these applications (all when empty)
    pub apps: Vec<String>,
    /// Web root location (default: the configured web root in the project)
    pub destination: Option<PathBuf>,
}

impl BuildSettings {
    pub fn placement(&self) -> PlacementMode {
        if self.clone {
            PlacementMode::Clone
        } else if self.copy {
            PlacementMode::Copy
        } else {
            PlacementMode::Link
        }
    }

    /// Whether a full-build archive may be used or created
    pub fn uses_archive(&self) -> bool {
        !self.no_archive && !self.no_cache
    }

    /// Settings that change build output, folded into the Tree ID
    pub fn tree_flags(&self) -> BTreeMap<String, String> {
        let mut flags = BTreeMap::new();
        flags.insert("abslinks".to_string(), self.abslinks.to_string());
        // clone implies copy
        flags.insert("copy".to_string(), (self.copy || self.clone).to_string());
        flags.insert("clone".to_string(), self.clone.to_string());
        flags.insert("no-cache".to_string(), self.no_cache.to_string());
        flags.insert("no-deps".to_string(), self.no_deps.to_string());
        flags.insert("no-build-hooks".to_string(), self.no_build_hooks.to_string());
        let mut apps = self.apps.clone();
        apps.sort();
        apps.dedup();
        flags.insert("apps".to_string(), apps.join(","));
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_wins_over_copy() {
        let settings = BuildSettings {
            copy: true,
            clone: true,
            ..Default::default()
        };
        assert_eq!(settings.placement(), PlacementMode::Clone);
        assert_eq!(BuildSettings::default().placement(), PlacementMode::Link);
    }

    #[test]
    fn tree_flags_ignore_app_order() {
        let a = BuildSettings {
            apps: vec!["web".into(), "api".into()],
            ..Default::default()
        };
        let b = BuildSettings {
            apps: vec!["api".into(), "web".into()],
            ..Default::default()
        };
        assert_eq!(a.tree_flags(), b.tree_flags());
        assert_ne!(a.tree_flags(), BuildSettings::default().tree_flags());
    }

    #[test]
    fn archive_disabled_by_no_cache() {
        let settings = BuildSettings {
            no_cache: true,
            ..Default::default()
        };
        assert!(!settings.uses_archive());
        assert!(BuildSettings::default().uses_archive());
    }
}
