//! Local build orchestration
//!
//! A build moves through fixed stages:
//!
//! ```text
//! Init -> Discover -> ResolveFullCache -> Extract | BuildEach -> Archive -> Symlink -> Done
//! ```
//!
//! All work happens in `<builds>/<name>-tmp`, which is renamed to its final
//! name only once every application has been built. Web-root links are
//! switched after that, so a failed or interrupted build never changes what
//! is being served.

use super::clean::{Cleaner, TMP_SUFFIX};
use super::{BuildReport, BuildResult, BuildSettings};
use crate::app::{dir_name, Application, ApplicationFinder, InvalidApp};
use crate::cache::{BuildCacheCollection, BuildCacheStore};
use crate::config::Config;
use crate::deps::DependencyInstaller;
use crate::error::{PlatformError, PlatformResult};
use crate::flavor::{self, run_hook, BuildContext, BuildFlavor, BuildLog};
use crate::fsutil;
use crate::hash::{ContentHasher, TreeOptions};
use crate::process::{self, BuildEnv};
use chrono::Utc;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Directory name of the only application of a project
const SINGLE_APP_DIR: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Discover,
    ResolveFullCache,
    Extract,
    BuildEach,
    Archive,
    Symlink,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Discover => "discover",
            Self::ResolveFullCache => "resolve-full-cache",
            Self::Extract => "extract",
            Self::BuildEach => "build-each",
            Self::Archive => "archive",
            Self::Symlink => "symlink",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage) {
    debug!(stage = %stage, "Entering build stage");
}

/// Per-application state carried between stages
struct AppRun {
    flavor: Option<Box<dyn BuildFlavor>>,
    result: BuildResult,
}

/// Builds every application of a project into a local web root
pub struct LocalBuild<'a> {
    config: &'a Config,
    settings: &'a BuildSettings,
}

impl<'a> LocalBuild<'a> {
    pub fn new(config: &'a Config, settings: &'a BuildSettings) -> Self {
        Self { config, settings }
    }

    /// Where web roots are linked for `source_dir`
    pub fn destination(&self, source_dir: &Path) -> PathBuf {
        self.settings
            .destination
            .clone()
            .unwrap_or_else(|| self.config.web_root(source_dir))
    }

    /// Build the project in `source_dir`.
    ///
    /// Per-application failures are recorded in the report; only errors
    /// that prevent building anything are returned as `Err`.
    pub fn run(&self, source_dir: &Path) -> PlatformResult<BuildReport> {
        enter(Stage::Init);
        let destination = self.init(source_dir)?;

        enter(Stage::Discover);
        let mut report = BuildReport::default();
        let mut registry = ApplicationFinder::new(self.config).find_applications(source_dir)?;
        if !self.settings.apps.is_empty() {
            report.missing_apps = registry.retain_named(&self.settings.apps);
            for name in &report.missing_apps {
                warn!("Application not found: {}", name);
            }
        }
        let invalid = registry.take_invalid();
        if registry.is_empty() {
            if invalid.is_empty() {
                warn!("No applications found in {}", source_dir.display());
            } else {
                report.results = invalid.into_iter().map(|app| invalid_result(app, None)).collect();
            }
            enter(Stage::Done);
            return Ok(report);
        }
        info!("Building {} application(s)", registry.len());

        enter(Stage::ResolveFullCache);
        let excluded = self.excluded_paths(source_dir, &destination);
        let archive = if self.settings.uses_archive() {
            self.resolve_archive(source_dir, &excluded, &mut report)
        } else {
            None
        };

        let builds_dir = self.config.builds_dir(source_dir);
        let build_name = match &report.tree_id {
            Some(tree_id) => format!("{}-{}", Utc::now().timestamp_millis(), short_id(tree_id)),
            None => Utc::now().timestamp_millis().to_string(),
        };
        let final_dir = builds_dir.join(&build_name);
        let tmp_dir = builds_dir.join(format!("{}{}", build_name, TMP_SUFFIX));
        fresh_dir(&tmp_dir)?;

        let extracted = match &archive {
            Some(archive) if archive.is_file() => {
                enter(Stage::Extract);
                match fsutil::extract_archive(archive, &tmp_dir) {
                    Ok(()) => {
                        info!("Extracted build from archive {}", archive.display());
                        true
                    }
                    Err(err) => {
                        warn!("Ignoring unreadable archive {}: {}", archive.display(), err);
                        fresh_dir(&tmp_dir)?;
                        false
                    }
                }
            }
            _ => false,
        };
        report.from_archive = extracted;

        let single = registry.is_single() && invalid.is_empty();
        let store = BuildCacheStore::new(self.config.cache_dir(source_dir), excluded);
        if !extracted {
            enter(Stage::BuildEach);
        }
        let mut runs = Vec::with_capacity(registry.len());
        for (_, app) in registry.iter() {
            let app_dir = app_dir_in(&tmp_dir, app, single);
            let ctx = BuildContext::new(app, self.config, self.settings, source_dir, &destination, app_dir.clone(), single);
            let mut run = AppRun {
                flavor: None,
                result: BuildResult::new(app.id(), app_dir),
            };
            if extracted {
                run.result.log.push("Extracted from the build archive".to_string());
                match flavor::resolve(app.config()) {
                    Ok(found) => {
                        run.result.flavor = Some(found.name());
                        run.flavor = Some(found);
                    }
                    Err(err) => run.result.fail(err),
                }
            } else {
                run.flavor = self.build_app(&ctx, &store, &mut run.result)?;
            }
            runs.push(run);
        }

        let all_built = invalid.is_empty() && runs.iter().all(|run| run.result.archivable());
        if !extracted && !all_built && archive.is_some() {
            for run in runs.iter().filter(|run| run.result.success() && run.result.incomplete) {
                info!("Not archiving the build: {} skipped a failed step", run.result.app);
            }
        }
        if let Some(archive) = archive.filter(|_| all_built && !extracted) {
            enter(Stage::Archive);
            match fsutil::archive_dir(&tmp_dir, &archive) {
                Ok(()) => {
                    info!("Saved build archive {}", archive.display());
                    report.archived = Some(archive);
                }
                Err(err) => warn!("Failed to archive the build: {}", err),
            }
        }

        fsutil::remove_path(&final_dir)?;
        fs::rename(&tmp_dir, &final_dir).map_err(|e| {
            PlatformError::io(format!("moving build into {}", final_dir.display()), e)
        })?;
        report.build_dir = Some(final_dir.clone());

        for ((_, app), run) in registry.iter().zip(runs.iter_mut()) {
            let app_dir = app_dir_in(&final_dir, app, single);
            run.result.output_dir = app_dir.clone();
            let Some(flavor) = run.flavor.as_ref().filter(|_| run.result.success()) else {
                continue;
            };
            let ctx = BuildContext::new(app, self.config, self.settings, source_dir, &destination, app_dir, single);
            if let Err(err) = flavor.install(&ctx) {
                per_app(err, &mut run.result)?;
            }
        }

        enter(Stage::Symlink);
        if !single {
            prepare_link_dir(&destination)?;
        }
        for ((_, app), run) in registry.iter().zip(runs.iter_mut()) {
            if !run.result.success() {
                continue;
            }
            let web_root = app.web_root_in(&run.result.output_dir);
            if !web_root.is_dir() {
                run.result.fail(PlatformError::WebRootNotFound(web_root));
                continue;
            }
            let link = if single {
                destination.clone()
            } else {
                destination.join(app.build_dir_name())
            };
            if let Err(err) = fsutil::replace_symlink(&web_root, &link, self.settings.abslinks) {
                per_app(err, &mut run.result)?;
                continue;
            }
            info!("Symlinked {} to {}", link.display(), web_root.display());
            run.result.web_link = Some(link);
        }

        if self.settings.run_deploy_hooks {
            for ((_, app), run) in registry.iter().zip(runs.iter_mut()) {
                if run.result.success() {
                    self.run_deploy_hooks(source_dir, app, &mut run.result)?;
                }
            }
        }

        let mut ordered: Vec<(PathBuf, BuildResult)> = registry
            .iter()
            .zip(runs)
            .map(|((_, app), run)| (app.relative_root().to_path_buf(), run.result))
            .collect();
        for app in invalid {
            ordered.push((app.relative.clone(), invalid_result(app, Some(&final_dir))));
        }
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        report.results = ordered.into_iter().map(|(_, result)| result).collect();

        if !self.settings.no_clean {
            let cleaner = Cleaner::new(self.config, source_dir, Some(destination.clone()));
            report.cleaned_builds = Some(cleaner.clean_builds(self.config.build.keep_builds, None, false)?);
            report.cleaned_archives = Some(cleaner.clean_archives(self.config.build.keep_archives, None)?);
        }

        enter(Stage::Done);
        Ok(report)
    }

    /// Validate the source, prepare local directories, return the destination
    fn init(&self, source_dir: &Path) -> PlatformResult<PathBuf> {
        if !source_dir.is_dir() {
            return Err(PlatformError::NotADirectory(source_dir.to_path_buf()));
        }
        let destination = self.destination(source_dir);
        if source_dir.starts_with(&destination) {
            return Err(PlatformError::User(format!(
                "The destination {} contains the source directory",
                destination.display()
            )));
        }

        for dir in [
            self.config.builds_dir(source_dir),
            self.config.archives_dir(source_dir),
            self.config.cache_dir(source_dir),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| PlatformError::io(format!("creating directory {}", dir.display()), e))?;
        }
        fsutil::ensure_writable(&self.config.builds_dir(source_dir))?;

        if let Err(err) = self.exclude_from_git(source_dir, &destination) {
            warn!("Could not update .git/info/exclude: {}", err);
        }
        Ok(destination)
    }

    /// Source-relative paths that are never part of the build input
    fn excluded_paths(&self, source_dir: &Path, destination: &Path) -> Vec<String> {
        let mut excluded = self.config.excluded_source_paths();
        if let Ok(rel) = destination.strip_prefix(source_dir) {
            let rel = rel.to_string_lossy().into_owned();
            if !rel.is_empty() && !excluded.contains(&rel) {
                excluded.push(rel);
            }
        }
        excluded
    }

    /// Compute the Tree ID and the archive it maps to
    fn resolve_archive(&self, source_dir: &Path, excluded: &[String], report: &mut BuildReport) -> Option<PathBuf> {
        let options = TreeOptions {
            excluded: excluded.to_vec(),
            flags: self.settings.tree_flags(),
            ..Default::default()
        };
        match ContentHasher::tree_id(source_dir, &options) {
            Ok(tree_id) => {
                debug!("Tree ID: {}", tree_id);
                let archive = self
                    .config
                    .archives_dir(source_dir)
                    .join(format!("{}.tar.gz", tree_id));
                report.tree_id = Some(tree_id);
                Some(archive)
            }
            Err(err) => {
                warn!("Could not compute the tree ID, not using build archives: {}", err);
                None
            }
        }
    }

    /// Append the local dir and web root to the repository's exclude file
    fn exclude_from_git(&self, source_dir: &Path, destination: &Path) -> PlatformResult<()> {
        let git_dir = source_dir.join(".git");
        if !git_dir.is_dir() {
            return Ok(());
        }
        let mut wanted = vec![format!("/{}", self.config.local.local_dir.trim_matches('/'))];
        if let Ok(rel) = destination.strip_prefix(source_dir) {
            wanted.push(format!("/{}", rel.to_string_lossy().trim_matches('/')));
        }

        let exclude = git_dir.join("info").join("exclude");
        let existing = fs::read_to_string(&exclude).unwrap_or_default();
        let missing: Vec<&String> = wanted
            .iter()
            .filter(|line| !existing.lines().any(|l| l.trim() == line.as_str()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(git_dir.join("info"))
            .map_err(|e| PlatformError::io("creating .git/info", e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&exclude)
            .map_err(|e| PlatformError::io(format!("opening {}", exclude.display()), e))?;
        let mut text = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            text.push('\n');
        }
        for line in missing {
            text.push_str(line);
            text.push('\n');
        }
        file.write_all(text.as_bytes())
            .map_err(|e| PlatformError::io(format!("writing {}", exclude.display()), e))?;
        debug!("Updated {}", exclude.display());
        Ok(())
    }

    /// Build one application, recording per-app failures in `result`
    fn build_app(
        &self,
        ctx: &BuildContext<'_>,
        store: &BuildCacheStore,
        result: &mut BuildResult,
    ) -> PlatformResult<Option<Box<dyn BuildFlavor>>> {
        match self.try_build_app(ctx, store, result) {
            Ok(flavor) => Ok(Some(flavor)),
            Err(err) => {
                per_app(err, result)?;
                Ok(None)
            }
        }
    }

    fn try_build_app(
        &self,
        ctx: &BuildContext<'_>,
        store: &BuildCacheStore,
        result: &mut BuildResult,
    ) -> PlatformResult<Box<dyn BuildFlavor>> {
        let app = ctx.app;
        let flavor = flavor::resolve(app.config())?;
        result.flavor = Some(flavor.name());
        info!("Building application {} using the {} flavor", app.id(), flavor.name());
        warn_on_php_version(app);

        let caches = if self.settings.no_cache {
            BuildCacheCollection::default()
        } else {
            BuildCacheCollection::from_app_config(app.id(), &app.config().caches)?
        };

        fs::create_dir_all(&ctx.app_dir)
            .map_err(|e| PlatformError::io(format!("creating directory {}", ctx.app_dir.display()), e))?;
        for cache in &caches {
            match store.restore(cache, app.root(), &ctx.app_dir, None) {
                Ok(true) => result.log.push(format!("Restored cache '{}'", cache.name())),
                Ok(false) => {}
                Err(err) => {
                    warn!("Failed to restore cache '{}' of {}: {}", cache.name(), app.id(), err);
                    result.log.push(format!("Warning: {}", err));
                }
            }
        }

        let log = flavor.build(ctx)?;
        result.log.extend(log.lines().iter().cloned());
        result.incomplete = log.is_incomplete();

        for cache in &caches {
            match store.save(cache, app.root(), &ctx.app_dir) {
                Ok(_) => result.log.push(format!("Saved cache '{}'", cache.name())),
                Err(err) => {
                    warn!("Failed to save cache '{}' of {}: {}", cache.name(), app.id(), err);
                    result.log.push(format!("Warning: {}", err));
                }
            }
        }
        Ok(flavor)
    }

    /// Run `hooks.deploy`, then `hooks.post_deploy`, in the final app dir
    fn run_deploy_hooks(&self, source_dir: &Path, app: &Application, result: &mut BuildResult) -> PlatformResult<()> {
        let hooks = &app.config().hooks;
        let env = self.app_environment(source_dir, app);
        let mut log = BuildLog::default();
        let mut outcome = Ok(());
        for (name, script) in [("deploy", &hooks.deploy), ("post_deploy", &hooks.post_deploy)] {
            let Some(script) = script.as_deref() else {
                continue;
            };
            info!("Running {} hook for {}", name, app.id());
            outcome = run_hook(name, script, &result.output_dir, &env, &mut log);
            if outcome.is_err() {
                break;
            }
        }
        result.log.extend(log.lines().iter().cloned());
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => per_app(err, result),
        }
    }

    /// Environment exposing the app's installed dependencies
    fn app_environment(&self, source_dir: &Path, app: &Application) -> BuildEnv {
        let dependencies = &app.config().dependencies;
        if dependencies.is_empty() {
            return BuildEnv::new();
        }
        DependencyInstaller::new(self.config.dependencies_dir(source_dir))
            .environment(dependencies, &BuildEnv::new())
            .unwrap_or_default()
    }
}

/// Failed result for an application whose configuration did not load
fn invalid_result(app: InvalidApp, build_dir: Option<&Path>) -> BuildResult {
    let output_dir = build_dir.map(|dir| dir.join(dir_name(&app.id))).unwrap_or_default();
    let mut result = BuildResult::new(app.id, output_dir);
    result.log.push(format!("Invalid configuration in {}", app.config_file.display()));
    error!("Application {} failed: {}", result.app, app.error);
    result.fail(app.error);
    result
}

/// Record a per-app error, or propagate one that ends the whole run
fn per_app(err: PlatformError, result: &mut BuildResult) -> PlatformResult<()> {
    if !err.is_per_app() {
        return Err(err);
    }
    error!("Application {} failed: {}", result.app, err);
    result.fail(err);
    Ok(())
}

fn app_dir_in(build_dir: &Path, app: &Application, single: bool) -> PathBuf {
    if single {
        build_dir.join(SINGLE_APP_DIR)
    } else {
        build_dir.join(app.build_dir_name())
    }
}

fn short_id(tree_id: &str) -> &str {
    tree_id.get(..12).unwrap_or(tree_id)
}

fn fresh_dir(dir: &Path) -> PlatformResult<()> {
    fsutil::remove_path(dir)?;
    fs::create_dir_all(dir).map_err(|e| PlatformError::io(format!("creating directory {}", dir.display()), e))
}

/// Turn the destination into a directory of per-app links
fn prepare_link_dir(destination: &Path) -> PlatformResult<()> {
    if let Ok(meta) = fs::symlink_metadata(destination) {
        if meta.file_type().is_symlink() || !meta.is_dir() {
            fsutil::remove_path(destination)?;
        }
    }
    fs::create_dir_all(destination)
        .map_err(|e| PlatformError::io(format!("creating directory {}", destination.display()), e))
}

/// Warn when a PHP app asks for a newer PHP than the local one
fn warn_on_php_version(app: &Application) {
    let config = app.config();
    if config.stack_type() != Some("php") {
        return;
    }
    let Some(wanted) = config.stack_version().and_then(loose_version) else {
        return;
    };
    let Some(local) = process::capture("php", &["-r", "echo PHP_VERSION;"], app.root()) else {
        return;
    };
    let Some(installed) = loose_version(&local) else {
        return;
    };
    if (wanted.major, wanted.minor) > (installed.major, installed.minor) {
        warn!(
            "Application {} requires PHP {}, but the local version is {}",
            app.id(),
            wanted,
            installed
        );
    }
}

/// Parse versions like `8.2` or `8.1.27-dev`
fn loose_version(raw: &str) -> Option<semver::Version> {
    let numeric: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).take(3).collect();
    if parts.is_empty() {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    semver::Version::parse(&parts.join(".")).ok()
}
