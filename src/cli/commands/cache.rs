//! Cache command - manage build caches

use super::project_root;
use crate::app::ApplicationFinder;
use crate::cache::{BuildCache, BuildCacheCollection, BuildCacheStore, CachedArchive};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{PlatformError, PlatformResult};
use crate::ui::{self, UiContext};
use console::style;
use std::path::Path;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PlatformResult<()> {
    let source = project_root(config, args.source.as_deref())?;
    let store = BuildCacheStore::new(config.cache_dir(&source), config.excluded_source_paths());

    match args.action {
        CacheAction::List { format } => list_caches(&store, format),
        CacheAction::Clear { app, cache, yes } => {
            clear_caches(config, &source, &store, app.as_deref(), cache.as_deref(), yes).await
        }
    }
}

/// List archives in the build cache store
fn list_caches(store: &BuildCacheStore, format: OutputFormat) -> PlatformResult<()> {
    let archives = store.list()?;

    match format {
        OutputFormat::Table => print_cache_table(&archives),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&archives)?),
        OutputFormat::Plain => {
            for archive in &archives {
                println!("{}", archive.path.display());
            }
        }
    }
    Ok(())
}

fn print_cache_table(archives: &[CachedArchive]) {
    if archives.is_empty() {
        println!("No cached archives found.");
        return;
    }

    println!(
        "{:<16} {:<24} {:<14} {:>10} {:<17}",
        "SCOPE", "TARGET", "KEY", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(85));

    for archive in archives {
        let scope = if archive.scope == crate::cache::SHARED_SCOPE {
            style(archive.scope.as_str()).cyan().to_string()
        } else {
            archive.scope.clone()
        };
        println!(
            "{:<16} {:<24} {:<14} {:>10} {:<17}",
            scope,
            archive.target,
            archive.key.get(..12).unwrap_or(&archive.key),
            format_size(archive.size),
            archive.modified.format("%Y-%m-%d %H:%M"),
        );
    }

    let total: u64 = archives.iter().map(|a| a.size).sum();
    println!();
    println!("Total: {} archive(s), {}", archives.len(), format_size(total));
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Caches declared by one application
fn app_caches(config: &Config, source: &Path, app_name: &str) -> PlatformResult<BuildCacheCollection> {
    let mut registry = ApplicationFinder::new(config).find_applications(source)?;
    let Some(id) = registry.find(app_name) else {
        return Err(registry
            .take_invalid()
            .into_iter()
            .find(|app| app.id == app_name)
            .map(|app| app.error)
            .unwrap_or_else(|| PlatformError::User(format!("Application not found: {}", app_name))));
    };
    let app = registry.get(id);
    BuildCacheCollection::from_app_config(app.id(), &app.config().caches)
}

async fn clear_caches(
    config: &Config,
    source: &Path,
    store: &BuildCacheStore,
    app: Option<&str>,
    cache: Option<&str>,
    yes: bool,
) -> PlatformResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let targets: Vec<BuildCache> = match app {
        None => Vec::new(),
        Some(app) => {
            let caches = app_caches(config, source, app)?;
            match cache {
                Some(name) => {
                    let found = caches.get(name).cloned().ok_or_else(|| {
                        PlatformError::User(format!("Cache '{}' not found for {}", name, app))
                    })?;
                    vec![found]
                }
                None => caches.iter().cloned().collect(),
            }
        }
    };

    let description = match (app, targets.len()) {
        (None, _) => format!("all build caches in {}", store.root().display()),
        (Some(app), 0) => {
            ui::step_info(&ctx, &format!("{} declares no build caches", app));
            return Ok(());
        }
        (Some(app), n) => format!("{} build cache(s) of {}", n, app),
    };

    if !ui::confirm(&ctx, &format!("Delete {}?", description), false).await? {
        ui::remark(&ctx, "Aborted");
        return Ok(());
    }

    if targets.is_empty() {
        store.delete_all(None)?;
    } else {
        for cache in &targets {
            debug!("Clearing cache '{}' of {}", cache.name(), cache.app());
            store.delete_all(Some(cache))?;
        }
    }
    ui::step_ok(&ctx, &format!("Deleted {}", description));
    Ok(())
}
