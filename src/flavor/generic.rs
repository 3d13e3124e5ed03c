//! Flavors driven by a single package manager

use super::{BuildContext, BuildFlavor, BuildLog};
use crate::deps::run_manager;
use crate::error::{PlatformError, PlatformResult};
use crate::process::BuildEnv;
use std::path::Path;
use tracing::info;

/// Placement only
pub struct NoBuild;

impl BuildFlavor for NoBuild {
    fn name(&self) -> &'static str {
        "none"
    }

    fn keys(&self) -> &'static [&'static str] {
        &["none", "default"]
    }
}

/// PHP applications built with Composer
pub struct Composer;

impl Composer {
    pub(crate) fn composer_install(ctx: &BuildContext<'_>, dir: &Path, env: &BuildEnv, log: &mut BuildLog) -> PlatformResult<()> {
        if !dir.join("composer.json").is_file() {
            log.push("No composer.json found, skipping composer install");
            return Ok(());
        }
        let mut env = env.clone();
        if ctx.settings.no_cache {
            env.insert("COMPOSER_CACHE_DIR".to_string(), "/dev/null".to_string());
        }
        info!("Running composer install for {}", ctx.app.id());
        log.push("Running composer install");
        run_manager(
            "php",
            "composer",
            &[
                "install",
                "--no-progress",
                "--prefer-dist",
                "--optimize-autoloader",
                "--no-interaction",
            ],
            dir,
            &env,
        )
    }
}

impl BuildFlavor for Composer {
    fn name(&self) -> &'static str {
        "composer"
    }

    fn keys(&self) -> &'static [&'static str] {
        &["default", "composer"]
    }

    fn stacks(&self) -> &'static [&'static str] {
        &["php", "hhvm"]
    }

    fn has_package_manager(&self) -> bool {
        true
    }

    fn run_package_manager(
        &self,
        ctx: &BuildContext<'_>,
        dir: &Path,
        env: &BuildEnv,
        log: &mut BuildLog,
    ) -> PlatformResult<()> {
        Self::composer_install(ctx, dir, env, log)
    }
}

/// Node.js applications built with npm
pub struct NodeJs;

impl BuildFlavor for NodeJs {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn keys(&self) -> &'static [&'static str] {
        &["default", "npm"]
    }

    fn stacks(&self) -> &'static [&'static str] {
        &["nodejs"]
    }

    fn has_package_manager(&self) -> bool {
        true
    }

    fn run_package_manager(
        &self,
        ctx: &BuildContext<'_>,
        dir: &Path,
        env: &BuildEnv,
        log: &mut BuildLog,
    ) -> PlatformResult<()> {
        if !dir.join("package.json").is_file() {
            log.push("No package.json found, skipping npm install");
            return Ok(());
        }
        info!("Running npm install for {}", ctx.app.id());
        log.push("Running npm install");

        // Kept alive until npm exits
        let scratch_cache = if ctx.settings.no_cache {
            Some(tempfile::tempdir().map_err(|e| PlatformError::io("creating npm cache directory", e))?)
        } else {
            None
        };
        let cache_arg = scratch_cache
            .as_ref()
            .map(|dir| format!("--cache={}", dir.path().display()));

        let mut args = vec!["install"];
        if let Some(cache_arg) = &cache_arg {
            args.push(cache_arg.as_str());
        }
        run_manager("nodejs", "npm", &args, dir, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppConfig, Application};
    use crate::build::BuildSettings;
    use crate::config::Config;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn keys_and_stacks() {
        assert!(Composer.supports("default", Some("php")));
        assert!(Composer.supports("composer", Some("hhvm")));
        assert!(!Composer.supports("default", Some("nodejs")));
        assert!(NodeJs.supports("npm", Some("nodejs")));
        assert!(NoBuild.supports("none", Some("golang")));
        assert!(NoBuild.supports("default", None));
    }

    #[test]
    fn package_managers_skip_without_manifest() {
        let temp = TempDir::new().unwrap();
        let app = Application::new(
            "app",
            temp.path().to_path_buf(),
            PathBuf::new(),
            temp.path().join(".platform.app.yaml"),
            AppConfig::default(),
        );
        let config = Config::default();
        let settings = BuildSettings::default();
        let destination = temp.path().join("_www");
        let dir = temp.path().join("build");
        fs::create_dir_all(&dir).unwrap();
        let ctx = BuildContext::new(&app, &config, &settings, temp.path(), &destination, dir.clone(), true);

        let mut log = BuildLog::default();
        Composer
            .run_package_manager(&ctx, &dir, &BuildEnv::new(), &mut log)
            .unwrap();
        NodeJs
            .run_package_manager(&ctx, &dir, &BuildEnv::new(), &mut log)
            .unwrap();
        assert_eq!(log.lines().len(), 2);
    }
}
