//! Confirmation prompts with a non-interactive fallback

use super::context::UiContext;
use crate::error::{PlatformError, PlatformResult};

/// Ask for confirmation.
///
/// Auto-yes answers true; a non-interactive context answers `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> PlatformResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on terminal input
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| PlatformError::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| PlatformError::io("reading confirmation", e))
}
