//! Build command - build the project into the local web root

use super::{absolute, project_root};
use crate::build::{BuildReport, BuildResult, LocalBuild};
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::{PlatformError, PlatformResult};
use crate::ui::{self, TaskSpinner, UiContext};
use tracing::info;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> PlatformResult<()> {
    let ctx = UiContext::detect();
    let source = project_root(config, args.source.as_deref())?;
    let mut settings = args.settings();
    if let Some(destination) = settings.destination.take() {
        settings.destination = Some(absolute(&destination)?);
    }

    ui::intro(&ctx, &format!("Building {}", source.display()));
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Building applications...");

    // The build is blocking; it keeps running on its thread until the
    // process exits, leaving a `-tmp` build for the next clean.
    let task_config = config.clone();
    let task_source = source.clone();
    let task = tokio::task::spawn_blocking(move || {
        LocalBuild::new(&task_config, &settings).run(&task_source)
    });

    let outcome = tokio::select! {
        joined = task => joined
            .map_err(|e| PlatformError::Internal(format!("build task failed: {}", e)))?,
        _ = tokio::signal::ctrl_c() => {
            spinner.stop_error("Build interrupted");
            return Err(PlatformError::Interrupted);
        }
    };

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            spinner.stop_error("Build failed");
            return Err(err);
        }
    };

    if report.from_archive {
        spinner.stop("Restored build from archive");
    } else {
        spinner.clear();
    }
    render_report(&ctx, &report);

    if report.success() {
        if !report.results.is_empty() {
            ui::outro_success(&ctx, "Build complete");
        }
        Ok(())
    } else {
        let failed = report.failed().count();
        ui::outro_error(&ctx, "Build failed");
        Err(PlatformError::BuildFailed {
            failed,
            total: report.results.len(),
        })
    }
}

fn render_report(ctx: &UiContext, report: &BuildReport) {
    for name in &report.missing_apps {
        ui::step_warn(ctx, &format!("Application not found: {}", name));
    }
    if report.results.is_empty() {
        ui::outro_warn(ctx, "No applications found");
        return;
    }

    for result in &report.results {
        for line in &result.log {
            info!(app = %result.app, "{}", line);
        }
        render_result(ctx, result);
    }

    if let Some(build_dir) = &report.build_dir {
        ui::key_value(ctx, "Build", &build_dir.display().to_string());
    }
    if let Some(tree_id) = &report.tree_id {
        ui::key_value(ctx, "Tree ID", tree_id);
    }
    if let Some(archive) = &report.archived {
        ui::remark(ctx, &format!("Saved build archive {}", archive.display()));
    }
    if let Some(cleaned) = report.cleaned_builds.filter(|c| c.deleted > 0) {
        ui::remark(ctx, &format!("Removed {} old build(s)", cleaned.deleted));
    }
    if let Some(cleaned) = report.cleaned_archives.filter(|c| c.deleted > 0) {
        ui::remark(ctx, &format!("Removed {} old archive(s)", cleaned.deleted));
    }
}

fn render_result(ctx: &UiContext, result: &BuildResult) {
    let label = match result.flavor {
        Some(flavor) => format!("{} ({})", result.app, flavor),
        None => result.app.clone(),
    };

    let Some(err) = &result.error else {
        let target = result.web_link.as_ref().unwrap_or(&result.output_dir);
        ui::step_ok_detail(ctx, &label, &target.display().to_string());
        return;
    };

    ui::step_error_detail(ctx, &label, &err.to_string());
    match err {
        PlatformError::BuildHookFailed { command, code, .. }
        | PlatformError::DependencyInstall { command, code, .. } => {
            ui::key_value(ctx, "Command", command.trim());
            ui::key_value(ctx, "Exit code", &code.to_string());
        }
        _ => {}
    }
    if let Some(output) = err.captured_output().filter(|o| !o.trim().is_empty()) {
        ui::note(ctx, "Output", output.trim_end());
    }
    if let Some(hint) = err.hint() {
        ui::remark(ctx, hint);
    }
}
