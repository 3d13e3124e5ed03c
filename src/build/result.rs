//! Outcomes of a local build

use crate::error::PlatformError;
use std::path::PathBuf;

/// Outcome for one application
#[derive(Debug)]
pub struct BuildResult {
    /// Application name
    pub app: String,
    /// Flavor used (None when it could not be resolved)
    pub flavor: Option<&'static str>,
    /// The app's directory inside the build
    pub output_dir: PathBuf,
    /// Where the app's web root was linked
    pub web_link: Option<PathBuf>,
    /// Accumulated build output
    pub log: Vec<String>,
    /// Why the build failed
    pub error: Option<PlatformError>,
    /// Built, but with a failed step tolerated (kept out of build archives)
    pub incomplete: bool,
}

impl BuildResult {
    pub fn new(app: impl Into<String>, output_dir: PathBuf) -> Self {
        Self {
            app: app.into(),
            flavor: None,
            output_dir,
            web_link: None,
            log: Vec::new(),
            error: None,
            incomplete: false,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this result may be stored in a full-build archive
    pub fn archivable(&self) -> bool {
        self.success() && !self.incomplete
    }

    /// Record a failure, keeping the first one
    pub fn fail(&mut self, error: PlatformError) {
        if self.error.is_none() {
            self.error = Some(error);
        } else {
            self.log.push(format!("Additionally: {}", error));
        }
    }
}

/// Counts from cleaning a directory of builds or archives
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanSummary {
    pub deleted: usize,
    pub kept: usize,
}

/// Outcome of a whole build run
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Per-application results, in build order
    pub results: Vec<BuildResult>,
    /// Requested applications that do not exist
    pub missing_apps: Vec<String>,
    /// Final build directory, when one was created
    pub build_dir: Option<PathBuf>,
    pub tree_id: Option<String>,
    /// Whether the build came from a full-build archive
    pub from_archive: bool,
    /// Full-build archive written by this run
    pub archived: Option<PathBuf>,
    pub cleaned_builds: Option<CleanSummary>,
    pub cleaned_archives: Option<CleanSummary>,
}

impl BuildReport {
    /// True when every application succeeded
    pub fn success(&self) -> bool {
        self.results.iter().all(BuildResult::success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.iter().filter(|r| !r.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_success_is_and_of_results() {
        let mut report = BuildReport::default();
        assert!(report.success());

        report.results.push(BuildResult::new("a", PathBuf::from("a")));
        let mut failed = BuildResult::new("b", PathBuf::from("b"));
        failed.fail(PlatformError::Internal("boom".to_string()));
        failed.fail(PlatformError::Internal("second".to_string()));
        report.results.push(failed);

        assert!(!report.success());
        let failures: Vec<_> = report.failed().map(|r| r.app.as_str()).collect();
        assert_eq!(failures, vec!["b"]);
        assert!(report.results[1].error.as_ref().unwrap().to_string().contains("boom"));
        assert_eq!(report.results[1].log.len(), 1);
    }
}
