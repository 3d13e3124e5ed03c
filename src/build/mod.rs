//! Local builds
//!
//! [`LocalBuild`] discovers a project's applications and builds them into
//! `<local>/builds`, reusing a whole-project archive keyed by Tree ID when
//! one exists, then links each app's document root into the web root.

mod clean;
mod orchestrator;
mod result;
mod settings;

pub use clean::Cleaner;
pub use orchestrator::LocalBuild;
pub use result::{BuildReport, BuildResult, CleanSummary};
pub use settings::{BuildSettings, PlacementMode};
