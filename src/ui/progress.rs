//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use std::time::Instant;

/// A task spinner that reports elapsed time when it stops
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    started: Option<Instant>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            started: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.started = Some(Instant::now());
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    fn timed(&self, message: &str) -> String {
        match self.started {
            Some(started) => format!("{} ({:.1}s)", message, started.elapsed().as_secs_f64()),
            None => message.to_string(),
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        let message = self.timed(message);
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => println!("{} {}", style("[OK]").green(), message),
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        let message = self.timed(message);
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None => println!("{} {}", style("[FAIL]").red(), message),
        }
    }

    /// Remove the spinner without a message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        assert_eq!(spinner.timed("Done"), "Done");
        spinner.start("Building...");
        assert!(spinner.timed("Done").starts_with("Done ("));
        spinner.stop("Done");
        spinner.clear();
    }
}
