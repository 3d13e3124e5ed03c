//! Build dependency installation
//!
//! Applications can declare tools needed at build time per stack:
//!
//! ```yaml
//! dependencies:
//!   nodejs:
//!     sass: "^1.70"
//!   python3:
//!     pipenv: "*"
//! ```
//!
//! Each stack is installed into its own prefix below the local
//! dependencies directory. Commands that run later in the build see the
//! installed tools through the environment returned by
//! [`DependencyInstaller::environment`].

mod managers;

pub use managers::{Bundler, Composer, Npm, Pip};

use crate::error::{PlatformError, PlatformResult};
use crate::process::{self, BuildEnv};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Packages of one stack, mapped to version constraints
pub type Packages = BTreeMap<String, String>;

/// A package manager able to install one stack's dependencies
pub trait DependencyManager {
    /// Stack name as declared by the application
    fn stack(&self) -> &str;

    /// Executable used to install
    fn command_name(&self) -> String;

    /// How to obtain the manager when it is missing
    fn install_help(&self) -> &'static str;

    /// Directories with executables installed under `prefix`
    fn bin_paths(&self, prefix: &Path) -> Vec<PathBuf>;

    /// Extra environment variables needed to use the installed packages
    fn env_vars(&self, _prefix: &Path) -> BuildEnv {
        BuildEnv::new()
    }

    /// Install `packages` into `prefix`
    fn install(&self, prefix: &Path, packages: &Packages, env: &BuildEnv) -> PlatformResult<()>;

    /// Whether the manager's executable is on PATH
    fn is_available(&self) -> bool {
        process::command_exists(&self.command_name())
    }
}

/// Find the manager for a stack
pub fn manager_for(stack: &str) -> PlatformResult<Box<dyn DependencyManager>> {
    // python, python2 and python3 all use pip
    if stack.starts_with("python") {
        return Ok(Box::new(Pip::new(stack)));
    }
    match stack {
        "nodejs" => Ok(Box::new(Npm)),
        "ruby" => Ok(Box::new(Bundler)),
        "php" => Ok(Box::new(Composer)),
        other => Err(PlatformError::invalid_config(format!(
            "unknown dependencies stack: {}",
            other
        ))),
    }
}

/// Run a manager command, turning failure into a dependency error
pub(crate) fn run_manager(
    stack: &str,
    program: &str,
    args: &[&str],
    dir: &Path,
    env: &BuildEnv,
) -> PlatformResult<()> {
    let command = format!("{} {}", program, args.join(" "));
    let output = process::run(program, args, dir, env)?;
    if output.success() {
        Ok(())
    } else {
        Err(PlatformError::DependencyInstall {
            stack: stack.to_string(),
            command,
            code: output.code,
            output: output.output,
        })
    }
}

/// Installs build dependencies into per-stack prefixes
pub struct DependencyInstaller {
    root: PathBuf,
}

impl DependencyInstaller {
    /// Install below `root` (one subdirectory per stack)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Prefix for one stack
    pub fn prefix(&self, stack: &str) -> PathBuf {
        self.root.join(stack)
    }

    /// Install every declared stack, stopping at the first failure
    pub fn install(
        &self,
        dependencies: &BTreeMap<String, Packages>,
        env: &BuildEnv,
    ) -> PlatformResult<()> {
        for (stack, packages) in dependencies {
            if packages.is_empty() {
                continue;
            }
            let manager = manager_for(stack)?;
            let names: Vec<&str> = packages.keys().map(String::as_str).collect();
            info!(
                "Installing {} dependencies with '{}': {}",
                stack,
                manager.command_name(),
                names.join(", ")
            );

            if !manager.is_available() {
                warn!("'{}' is not installed", manager.command_name());
                return Err(PlatformError::DependencyInstall {
                    stack: stack.clone(),
                    command: manager.command_name(),
                    code: 127,
                    output: manager.install_help().to_string(),
                });
            }

            let prefix = self.prefix(stack);
            fs::create_dir_all(&prefix)
                .map_err(|e| PlatformError::io(format!("creating directory {}", prefix.display()), e))?;
            manager.install(&prefix, packages, env)?;
        }
        Ok(())
    }

    /// Environment exposing installed dependencies, layered over `base`.
    ///
    /// Existing bin directories are prepended to `PATH`.
    pub fn environment(
        &self,
        dependencies: &BTreeMap<String, Packages>,
        base: &BuildEnv,
    ) -> PlatformResult<BuildEnv> {
        let mut env = base.clone();
        let mut paths = Vec::new();
        for stack in dependencies.keys() {
            let manager = manager_for(stack)?;
            let prefix = self.prefix(stack);
            paths.extend(manager.bin_paths(&prefix).into_iter().filter(|p| p.is_dir()));
            env.extend(manager.env_vars(&prefix));
        }

        if !paths.is_empty() {
            let inherited = env
                .get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok());
            let mut entries: Vec<PathBuf> = paths;
            if let Some(inherited) = inherited {
                entries.extend(std::env::split_paths(&inherited));
            }
            let joined = std::env::join_paths(entries)
                .map_err(|e| PlatformError::Internal(format!("invalid PATH entry: {}", e)))?;
            env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        }
        Ok(env)
    }
}
