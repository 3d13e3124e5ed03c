//! Placing application source into a build directory

use super::BuildContext;
use crate::build::PlacementMode;
use crate::error::{PlatformError, PlatformResult};
use crate::fsutil::{self, Placement};
use crate::process::{self, BuildEnv};
use globset::GlobSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

/// Files in the app root also placed in the web root
const SPECIAL_DESTINATIONS: &[&str] = &["favicon.ico", "robots.txt"];

/// Top-level entries of the app root that are never placed.
///
/// Hidden files always; the web root and local directory when they are
/// direct children of the app root.
pub fn ignored_entries(ctx: &BuildContext<'_>) -> PlatformResult<GlobSet> {
    let mut patterns = vec![".*".to_string()];
    let app_root = ctx.app.root();
    for excluded in [ctx.destination.to_path_buf(), ctx.config.local_dir(ctx.source_dir)] {
        if excluded.parent() == Some(app_root) {
            if let Some(name) = excluded.file_name() {
                patterns.push(name.to_string_lossy().into_owned());
            }
        }
    }
    fsutil::glob_set(&patterns)
}

/// Place the app's files and return the directory they were placed in
pub fn place_source(ctx: &BuildContext<'_>) -> PlatformResult<PathBuf> {
    let target = ctx.placed_dir();
    let skip = ignored_entries(ctx)?;
    let source = ctx.app.root();

    match ctx.settings.placement() {
        PlacementMode::Link => {
            debug!("Hard-linking {} into {}", source.display(), target.display());
            fsutil::mirror(source, &target, Placement::HardLink, &skip)?;
        }
        PlacementMode::Copy => {
            debug!("Copying {} into {}", source.display(), target.display());
            fsutil::mirror(source, &target, Placement::Copy, &skip)?;
        }
        PlacementMode::Clone => {
            info!("Exporting committed files of {}", ctx.app.id());
            export_head(source, &target, &skip)?;
        }
    }

    if !ctx.app.moves_to_web_root() {
        place_special_destinations(ctx, &target)?;
    }
    Ok(target)
}

/// Export the committed tree of `source` (a Git working copy) into `target`
fn export_head(source: &Path, target: &Path, skip: &GlobSet) -> PlatformResult<()> {
    let prefix = process::capture("git", &["rev-parse", "--show-prefix"], source).ok_or_else(|| {
        PlatformError::invalid_config(format!(
            "cannot clone {}: not a Git working copy",
            source.display()
        ))
    })?;
    let tree = if prefix.is_empty() {
        "HEAD".to_string()
    } else {
        format!("HEAD:{}", prefix)
    };

    let tarball = tempfile::NamedTempFile::new()
        .map_err(|e| PlatformError::io("creating temporary file", e))?;
    let tarball_path = tarball.path().to_string_lossy().into_owned();
    let output = process::run(
        "git",
        &["archive", "--format=tar", "-o", &tarball_path, &tree],
        source,
        &BuildEnv::new(),
    )?;
    if !output.success() {
        return Err(PlatformError::BuildHookFailed {
            hook: "clone".to_string(),
            command: format!("git archive {}", tree),
            code: output.code,
            output: output.output,
        });
    }

    fs::create_dir_all(target)
        .map_err(|e| PlatformError::io(format!("creating directory {}", target.display()), e))?;
    let file = File::open(tarball.path())
        .map_err(|e| PlatformError::io(format!("opening {}", tarball.path().display()), e))?;
    let mut archive = Archive::new(file);
    archive.set_preserve_permissions(true);
    archive
        .unpack(target)
        .map_err(|e| PlatformError::io(format!("unpacking into {}", target.display()), e))?;

    let entries = fs::read_dir(target)
        .map_err(|e| PlatformError::io(format!("reading {}", target.display()), e))?;
    for entry in entries.flatten() {
        if skip.is_match(entry.file_name()) {
            fsutil::remove_path(&entry.path())?;
        }
    }
    Ok(())
}

fn place_special_destinations(ctx: &BuildContext<'_>, placed: &Path) -> PlatformResult<()> {
    let web_root = ctx.web_root();
    if web_root == placed {
        return Ok(());
    }
    for name in SPECIAL_DESTINATIONS {
        let source = placed.join(name);
        if !source.is_file() {
            continue;
        }
        fs::create_dir_all(&web_root)
            .map_err(|e| PlatformError::io(format!("creating directory {}", web_root.display()), e))?;
        let destination = web_root.join(name);
        if destination.exists() {
            debug!("Overriding existing path {}", destination.display());
            fsutil::remove_path(&destination)?;
        }
        fs::copy(&source, &destination)
            .map_err(|e| PlatformError::io(format!("copying {}", source.display()), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppConfig, Application};
    use crate::build::BuildSettings;
    use crate::config::Config;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn app(root: &Path, yaml: &str) -> Application {
        let config = AppConfig::from_value(serde_yaml::from_str(yaml).unwrap()).unwrap();
        Application::new(
            "app",
            root.to_path_buf(),
            PathBuf::new(),
            root.join(".platform.app.yaml"),
            config,
        )
    }

    #[test]
    fn places_visible_files_only() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join(".platform.app.yaml"), "name: app");
        write(&source.join(".env"), "SECRET=1");
        write(&source.join("public/index.php"), "<?php");
        write(&source.join("_www/stale"), "old");
        let app = app(&source, "web: {document_root: public}");
        let config = Config::default();
        let settings = BuildSettings::default();
        let build = temp.path().join("build");
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, build.clone(), true);

        let placed = place_source(&ctx).unwrap();
        assert_eq!(placed, build);
        assert!(build.join("public/index.php").is_file());
        assert!(!build.join(".env").exists());
        assert!(!build.join(".platform.app.yaml").exists());
        assert!(!build.join("_www").exists());
    }

    #[test]
    fn moves_app_into_default_web_root() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("index.html"), "<h1>hi</h1>");
        let app = app(&source, "{}");
        let config = Config::default();
        let settings = BuildSettings {
            copy: true,
            ..Default::default()
        };
        let build = temp.path().join("build");
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, build.clone(), true);

        let placed = place_source(&ctx).unwrap();
        assert_eq!(placed, build.join("public"));
        assert!(build.join("public/index.html").is_file());
    }

    #[test]
    fn robots_txt_is_copied_to_web_root() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        write(&source.join("robots.txt"), "User-agent: *");
        write(&source.join("web/index.php"), "<?php");
        let app = app(&source, "web: {locations: {'/': {root: web}}}");
        let config = Config::default();
        let settings = BuildSettings::default();
        let build = temp.path().join("build");
        let destination = source.join("_www");
        let ctx = BuildContext::new(&app, &config, &settings, &source, &destination, build.clone(), true);

        place_source(&ctx).unwrap();
        assert_eq!(
            fs::read_to_string(build.join("web/robots.txt")).unwrap(),
            "User-agent: *"
        );
    }
}
