//! Clean command - remove old builds and build archives

use super::{absolute, project_root};
use crate::build::{CleanSummary, Cleaner};
use crate::cli::args::CleanArgs;
use crate::config::Config;
use crate::error::PlatformResult;
use crate::ui::{self, UiContext};
use std::time::Duration;

/// Execute the clean command
pub async fn execute(args: CleanArgs, config: &Config) -> PlatformResult<()> {
    let ctx = UiContext::detect();
    let source = project_root(config, args.source.as_deref())?;
    let destination = args.destination.as_deref().map(absolute).transpose()?;
    let max_age = args.max_age.map(Duration::from_secs);

    let cleaner = Cleaner::new(config, &source, destination);
    let builds = cleaner.clean_builds(args.keep, max_age, args.include_active)?;
    let archives = cleaner.clean_archives(args.keep, max_age)?;

    report(&ctx, "build", builds);
    report(&ctx, "archive", archives);
    Ok(())
}

fn report(ctx: &UiContext, noun: &str, summary: CleanSummary) {
    if summary.deleted == 0 {
        ui::step_info(ctx, &format!("No {}s to delete ({} kept)", noun, summary.kept));
    } else {
        ui::step_ok(
            ctx,
            &format!("Deleted {} {}(s), kept {}", summary.deleted, noun, summary.kept),
        );
    }
}
