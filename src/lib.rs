//! Platform CLI - local builds for hosted-platform projects
//!
//! Discovers the applications of a project, builds each one with the
//! flavor matching its runtime, caches build output by content and links
//! the results into a local web root.

pub mod app;
pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod flavor;
pub mod fsutil;
pub mod hash;
pub mod process;
pub mod ui;

pub use error::{PlatformError, PlatformResult};
