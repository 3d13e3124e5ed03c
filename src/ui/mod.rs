//! Terminal output for commands
//!
//! Uses `cliclack` log lines and spinners in interactive terminals and
//! falls back to plain `[OK]`/`[FAIL]` lines in CI and when piped. Core
//! modules never print; they log through `tracing` and return reports that
//! commands render here.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, note, outro_error, outro_success, outro_warn, remark, step_error_detail,
    step_info, step_ok, step_ok_detail, step_warn,
};
pub use progress::TaskSpinner;
pub use prompts::confirm;
