//! Build flavors
//!
//! A flavor is the build strategy for one kind of application. Every
//! flavor shares the same build sequence:
//!
//! 1. place the source into the app's build directory
//! 2. install build dependencies
//! 3. run the flavor's package manager
//! 4. run `hooks.build`
//!
//! and, once the build directory has reached its final location, an install
//! step that links shared file mounts. Flavors override the steps they
//! need.

mod drupal;
mod generic;
mod placement;
mod resolver;

pub use drupal::Drupal;
pub use generic::{Composer, NoBuild, NodeJs};
pub use placement::place_source;
pub use resolver::{all_flavors, resolve};

use crate::app::Application;
use crate::build::{BuildSettings, PlacementMode};
use crate::config::Config;
use crate::deps::DependencyInstaller;
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil;
use crate::process::{self, BuildEnv};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything a flavor needs to build one application
pub struct BuildContext<'a> {
    pub app: &'a Application,
    pub config: &'a Config,
    pub settings: &'a BuildSettings,
    /// Project source directory
    pub source_dir: &'a Path,
    /// Where web roots are linked
    pub destination: &'a Path,
    /// This application's directory inside the build
    pub app_dir: PathBuf,
    /// Whether this is the project's only application
    pub single: bool,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        app: &'a Application,
        config: &'a Config,
        settings: &'a BuildSettings,
        source_dir: &'a Path,
        destination: &'a Path,
        app_dir: PathBuf,
        single: bool,
    ) -> Self {
        Self {
            app,
            config,
            settings,
            source_dir,
            destination,
            app_dir,
            single,
        }
    }

    /// Same context for a different app directory
    pub fn with_app_dir(&self, app_dir: PathBuf) -> Self {
        Self { app_dir, ..*self }
    }

    /// Directory the source is placed in
    pub fn placed_dir(&self) -> PathBuf {
        if self.app.moves_to_web_root() {
            self.web_root()
        } else {
            self.app_dir.clone()
        }
    }

    /// The app's document root inside its build directory
    pub fn web_root(&self) -> PathBuf {
        self.app.web_root_in(&self.app_dir)
    }

    /// Whether build steps will run commands inside the app directory
    pub fn runs_commands(&self, package_manager: bool) -> bool {
        let hooks = &self.app.config().hooks;
        package_manager
            || (hooks.build.is_some() && !self.settings.no_build_hooks)
            || (self.settings.run_deploy_hooks && (hooks.deploy.is_some() || hooks.post_deploy.is_some()))
    }

    /// Files shared between builds of this app
    pub fn shared_dir(&self) -> PathBuf {
        let shared = self.config.shared_dir(self.source_dir);
        if self.single {
            shared
        } else {
            shared.join(self.app.build_dir_name())
        }
    }
}

/// Output of an application build
#[derive(Debug, Default)]
pub struct BuildLog {
    lines: Vec<String>,
    incomplete: bool,
}

impl BuildLog {
    /// Mark the build as usable but not reproducible from its inputs
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    /// Whether a step was skipped after failing, e.g. a dependency install
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Append captured process output
    pub fn append(&mut self, output: &str) {
        self.lines.extend(output.lines().map(str::to_string));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_text(self) -> String {
        self.lines.join("\n")
    }
}

/// A build strategy
pub trait BuildFlavor: Send + Sync {
    /// Name shown to users
    fn name(&self) -> &'static str;

    /// Values of `build.flavor` selecting this flavor
    fn keys(&self) -> &'static [&'static str];

    /// Runtime types this flavor supports (empty for any)
    fn stacks(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether this flavor handles `key` for runtime type `stack`
    fn supports(&self, key: &str, stack: Option<&str>) -> bool {
        let stack_ok = self.stacks().is_empty()
            || stack.is_some_and(|s| self.stacks().contains(&s));
        stack_ok && self.keys().contains(&key)
    }

    /// Whether [`BuildFlavor::run_package_manager`] does anything
    fn has_package_manager(&self) -> bool {
        false
    }

    /// Run the ecosystem's package manager in `dir`
    fn run_package_manager(
        &self,
        _ctx: &BuildContext<'_>,
        _dir: &Path,
        _env: &BuildEnv,
        _log: &mut BuildLog,
    ) -> PlatformResult<()> {
        Ok(())
    }

    /// Build the application into `ctx.app_dir`
    fn build(&self, ctx: &BuildContext<'_>) -> PlatformResult<BuildLog> {
        let mut log = BuildLog::default();
        fs::create_dir_all(&ctx.app_dir).map_err(|e| {
            PlatformError::io(format!("creating directory {}", ctx.app_dir.display()), e)
        })?;

        let placed = place_source(ctx)?;
        log.push(format!("Placed source in {}", placed.display()));
        if ctx.settings.placement() == PlacementMode::Link && ctx.runs_commands(self.has_package_manager()) {
            let detached = fsutil::detach_hard_links(&ctx.app_dir)?;
            debug!("Copied {} hard-linked file(s) of {} before running commands", detached, ctx.app.id());
        }

        let env = install_dependencies(ctx, &mut log)?;
        self.run_package_manager(ctx, &placed, &env, &mut log)?;
        run_build_hook(ctx, &env, &mut log)?;
        Ok(log)
    }

    /// Finish a build in its final location
    fn install(&self, ctx: &BuildContext<'_>) -> PlatformResult<()> {
        link_shared_mounts(ctx)
    }
}

/// Install declared dependencies and return the build environment
fn install_dependencies(ctx: &BuildContext<'_>, log: &mut BuildLog) -> PlatformResult<BuildEnv> {
    let dependencies = &ctx.app.config().dependencies;
    let base = BuildEnv::new();
    if dependencies.is_empty() {
        return Ok(base);
    }

    let installer = DependencyInstaller::new(ctx.config.dependencies_dir(ctx.source_dir));
    if ctx.settings.no_deps {
        log.push("Skipping build dependencies");
    } else if let Err(err) = installer.install(dependencies, &base) {
        if ctx.settings.deps_required || !err.is_per_app() {
            return Err(err);
        }
        warn!("Dependencies for {} failed to install: {}", ctx.app.id(), err);
        log.push(format!("Warning: {}", err));
        log.mark_incomplete();
        if let Some(output) = err.captured_output() {
            log.append(output);
        }
    }
    installer.environment(dependencies, &base)
}

fn run_build_hook(ctx: &BuildContext<'_>, env: &BuildEnv, log: &mut BuildLog) -> PlatformResult<()> {
    let Some(hook) = ctx.app.config().hooks.build.as_deref() else {
        return Ok(());
    };
    if ctx.settings.no_build_hooks {
        log.push("Skipping post-build hooks");
        return Ok(());
    }
    info!("Running build hook for {}", ctx.app.id());
    run_hook("build", hook, &ctx.app_dir, env, log)
}

/// Run a hook script, failing with its captured output on non-zero exit
pub fn run_hook(name: &str, script: &str, dir: &Path, env: &BuildEnv, log: &mut BuildLog) -> PlatformResult<()> {
    log.push(format!("Running {} hook", name));
    let output = process::run_script(script, dir, env)?;
    log.append(&output.output);
    if output.success() {
        Ok(())
    } else {
        Err(PlatformError::BuildHookFailed {
            hook: name.to_string(),
            command: script.to_string(),
            code: output.code,
            output: output.output,
        })
    }
}

/// Symlink each shared file mount to its directory in the shared dir
pub fn link_shared_mounts(ctx: &BuildContext<'_>) -> PlatformResult<()> {
    let mounts = &ctx.app.config().mounts;
    if mounts.is_empty() {
        return Ok(());
    }
    let shared = ctx.shared_dir();
    for mount in mounts {
        let target = shared.join(&mount.source_path);
        fs::create_dir_all(&target)
            .map_err(|e| PlatformError::io(format!("creating directory {}", target.display()), e))?;
        let link = ctx.app_dir.join(&mount.path);
        if let Ok(meta) = fs::symlink_metadata(&link) {
            if !meta.file_type().is_symlink() {
                info!("Removing existing file {}", mount.path);
            }
        }
        fsutil::replace_symlink(&target, &link, ctx.settings.abslinks)?;
        info!("Symlinked {} to {}", mount.path, target.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppConfig;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn app(root: &Path, yaml: &str) -> Application {
        let config = AppConfig::from_value(serde_yaml::from_str(yaml).unwrap()).unwrap();
        Application::new("app", root.to_path_buf(), PathBuf::new(), root.join(".platform.app.yaml"), config)
    }

    #[test]
    fn build_runs_hook_in_app_dir() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "hi");
        let app = app(&source, "hooks:\n  build: echo built > built.txt\n");
        let config = Config::default();
        let settings = BuildSettings::default();
        let destination = source.join("_www");
        let app_dir = temp.path().join("build/default");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, app_dir.clone(), true);

        let log = NoBuild.build(&ctx).unwrap();
        assert_eq!(fs::read_to_string(app_dir.join("built.txt")).unwrap().trim(), "built");
        assert!(log.lines().iter().any(|l| l.contains("Running build hook")));
        assert!(!source.join("built.txt").exists());
    }

    #[test]
    fn hook_writing_placed_file_leaves_source_alone() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "orig\n");
        let app = app(&source, "hooks:\n  build: echo appended >> public/index.html\n");
        let config = Config::default();
        let settings = BuildSettings::default();
        assert_eq!(settings.placement(), PlacementMode::Link);
        let destination = source.join("_www");
        let app_dir = temp.path().join("build/default");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, app_dir.clone(), true);

        NoBuild.build(&ctx).unwrap();
        assert_eq!(
            fs::read_to_string(app_dir.join("public/index.html")).unwrap(),
            "orig\nappended\n"
        );
        assert_eq!(fs::read_to_string(source.join("public/index.html")).unwrap(), "orig\n");
    }

    #[test]
    fn failing_hook_reports_output() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "hi");
        let app = app(&source, "hooks:\n  build: |\n    echo compiling\n    exit 4\n");
        let config = Config::default();
        let settings = BuildSettings::default();
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, temp.path().join("b"), true);

        match NoBuild.build(&ctx).unwrap_err() {
            PlatformError::BuildHookFailed { hook, code, output, .. } => {
                assert_eq!(hook, "build");
                assert_eq!(code, 4);
                assert!(output.contains("compiling"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hooks_can_be_skipped() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "hi");
        let app = app(&source, "hooks:\n  build: exit 1\n");
        let config = Config::default();
        let settings = BuildSettings {
            no_build_hooks: true,
            ..Default::default()
        };
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, temp.path().join("b"), true);
        NoBuild.build(&ctx).unwrap();
    }

    #[test]
    fn unknown_dependency_stack_fails_app() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "hi");
        let app = app(&source, "dependencies:\n  cobol:\n    compiler: '*'\n");
        let config = Config::default();
        let settings = BuildSettings::default();
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, temp.path().join("b"), true);

        let err = NoBuild.build(&ctx).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidConfig(_)));
    }

    #[cfg(unix)]
    #[test]
    fn shared_mounts_are_symlinked() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("public/index.html"), "hi");
        let app = app(&source, "mounts:\n  'public/files':\n    source: local\n    source_path: files\n");
        let config = Config::default();
        let settings = BuildSettings::default();
        let destination = source.join("_www");
        let app_dir = temp.path().join("build/default");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, app_dir.clone(), true);

        NoBuild.build(&ctx).unwrap();
        NoBuild.install(&ctx).unwrap();
        let link = app_dir.join("public/files");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(source.join(".platform/local/shared/files").is_dir());
        assert_eq!(ctx.shared_dir(), source.join(".platform/local/shared"));
    }
}
