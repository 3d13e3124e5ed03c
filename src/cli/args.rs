//! CLI argument definitions using clap derive

use crate::build::BuildSettings;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Platform CLI
///
/// Builds hosted-platform projects locally: discovers applications, runs
/// their build flavors and links the results into a local web root.
#[derive(Parser, Debug)]
#[command(name = "platform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PLATFORM_CLI_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the current project locally
    Build(BuildArgs),

    /// Remove old builds and build archives
    Clean(CleanArgs),

    /// Manage build caches
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug, Default)]
pub struct BuildArgs {
    /// Applications to build (all when omitted)
    pub apps: Vec<String>,

    /// Project source directory (defaults to the enclosing project)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Web root location (defaults to _www in the project)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Keep old builds and archives
    #[arg(long)]
    pub no_clean: bool,

    /// Do not install build dependencies
    #[arg(long)]
    pub no_deps: bool,

    /// Do not run post-build hooks
    #[arg(long)]
    pub no_build_hooks: bool,

    /// Disable package manager caches and build archives
    #[arg(long)]
    pub no_cache: bool,

    /// Neither use nor create a build archive
    #[arg(long)]
    pub no_archive: bool,

    /// Copy files instead of hard-linking them
    #[arg(long)]
    pub copy: bool,

    /// Build from the committed files only
    #[arg(long)]
    pub clone: bool,

    /// Use absolute symlink targets
    #[arg(long)]
    pub abslinks: bool,

    /// Fail the build when dependencies cannot be installed
    #[arg(long)]
    pub deps_required: bool,

    /// Run deploy and post_deploy hooks after building
    #[arg(long)]
    pub run_deploy_hooks: bool,
}

impl BuildArgs {
    pub fn settings(&self) -> BuildSettings {
        BuildSettings {
            no_clean: self.no_clean,
            no_deps: self.no_deps,
            no_build_hooks: self.no_build_hooks,
            no_cache: self.no_cache,
            no_archive: self.no_archive,
            copy: self.copy,
            clone: self.clone,
            abslinks: self.abslinks,
            deps_required: self.deps_required,
            run_deploy_hooks: self.run_deploy_hooks,
            apps: self.apps.clone(),
            destination: self.destination.clone(),
        }
    }
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Project source directory (defaults to the enclosing project)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Number of builds and archives to keep
    #[arg(short, long, default_value = "5")]
    pub keep: usize,

    /// Delete anything older than this many seconds
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Also delete builds the web root currently points to
    #[arg(long)]
    pub include_active: bool,

    /// Web root location (defaults to _www in the project)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,

    /// Project source directory (defaults to the enclosing project)
    #[arg(short, long, global = true)]
    pub source: Option<PathBuf>,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached archives
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete cached archives
    Clear {
        /// Only clear caches of this application
        #[arg(long)]
        app: Option<String>,

        /// Only clear this cache (requires --app)
        #[arg(long, requires = "app")]
        cache: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
