//! Drupal sites
//!
//! Built like any Composer project. At install time the site's
//! `sites/default` directory gets settings files: `settings.php` and
//! `settings.platformsh.php` when missing, and a `settings.local.php`
//! kept in the shared directory and linked into every build.

use super::{link_shared_mounts, BuildContext, BuildFlavor, BuildLog, Composer};
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil;
use crate::process::BuildEnv;
use std::fs;
use std::path::Path;
use tracing::info;

const SETTINGS_PHP: &str = include_str!("../../resources/drupal/settings.php.dist");
const SETTINGS_PLATFORM_PHP: &str = include_str!("../../resources/drupal/settings.platformsh.php.dist");
const SETTINGS_LOCAL_PHP: &str = include_str!("../../resources/drupal/settings.local.php.dist");

pub struct Drupal;

impl Drupal {
    fn write_if_missing(path: &Path, content: &str) -> PlatformResult<()> {
        if fs::symlink_metadata(path).is_ok() {
            return Ok(());
        }
        info!("Creating file {}", path.display());
        fs::write(path, content).map_err(|e| PlatformError::io(format!("writing {}", path.display()), e))
    }

    fn install_settings_local(ctx: &BuildContext<'_>, sites_default: &Path) -> PlatformResult<()> {
        let settings_local = sites_default.join("settings.local.php");
        if fs::symlink_metadata(&settings_local).is_ok() {
            return Ok(());
        }
        let shared = ctx.shared_dir();
        fs::create_dir_all(&shared)
            .map_err(|e| PlatformError::io(format!("creating directory {}", shared.display()), e))?;
        let shared_settings = shared.join("settings.local.php");
        if !shared_settings.exists() {
            Self::write_if_missing(&shared_settings, SETTINGS_LOCAL_PHP)?;
            info!("Edit {} to add your database credentials", shared_settings.display());
        }
        fsutil::replace_symlink(&shared_settings, &settings_local, ctx.settings.abslinks)
    }
}

impl BuildFlavor for Drupal {
    fn name(&self) -> &'static str {
        "drupal"
    }

    fn keys(&self) -> &'static [&'static str] {
        &["drupal"]
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
        Composer::composer_install(ctx, dir, env, log)
    }

    fn install(&self, ctx: &BuildContext<'_>) -> PlatformResult<()> {
        link_shared_mounts(ctx)?;

        let sites_default = ctx.web_root().join("sites").join("default");
        if !sites_default.is_dir() {
            return Ok(());
        }
        Self::write_if_missing(&sites_default.join("settings.php"), SETTINGS_PHP)?;
        Self::write_if_missing(&sites_default.join("settings.platformsh.php"), SETTINGS_PLATFORM_PHP)?;
        Self::install_settings_local(ctx, &sites_default)
    }
}
