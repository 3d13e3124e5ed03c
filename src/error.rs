//! Error types for the platform CLI
//!
//! All modules use `PlatformResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for platform CLI operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// All errors that can occur in the platform CLI
#[derive(Error, Debug)]
pub enum PlatformError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("An application named {name} is already defined ({first} and {second})")]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Build flavor not found: {flavor} (runtime type: {stack})")]
    UnsupportedFlavor { flavor: String, stack: String },

    #[error("Invalid CLI configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Resource errors
    #[error("Directory is not writable: {0}")]
    DirectoryNotWritable(PathBuf),

    #[error("Build output not found: {0}")]
    MissingBuildOutput(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Web root not found: {0}")]
    WebRootNotFound(PathBuf),

    #[error("Project root not found")]
    ProjectRootNotFound,

    // Execution errors
    #[error("The {hook} hook failed with exit code {code}")]
    BuildHookFailed {
        hook: String,
        command: String,
        code: i32,
        output: String,
    },

    #[error("Failed to install {stack} dependencies with '{command}' (exit code {code})")]
    DependencyInstall {
        stack: String,
        command: String,
        code: i32,
        output: String,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {total} application(s) failed to build")]
    BuildFailed { failed: usize, total: usize },

    #[error("Build interrupted")]
    Interrupted,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PlatformError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Whether the error is scoped to one application.
    ///
    /// These become a failure marker for that app; anything else aborts
    /// the whole run.
    pub fn is_per_app(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnsupportedFlavor { .. }
                | Self::DirectoryNotWritable(_)
                | Self::MissingBuildOutput(_)
                | Self::NotADirectory(_)
                | Self::WebRootNotFound(_)
                | Self::BuildHookFailed { .. }
                | Self::DependencyInstall { .. }
                | Self::CommandFailed { .. }
                | Self::Io { .. }
                | Self::Walk(_)
        )
    }

    /// Captured process output, for errors that carry one
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::BuildHookFailed { output, .. } | Self::DependencyInstall { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ProjectRootNotFound => {
                Some("Run from inside a project, or pass --source and --destination")
            }
            Self::DuplicateName { .. } => Some("Give each application a unique `name`"),
            Self::UnsupportedFlavor { .. } => {
                Some("Supported flavors: none, composer, nodejs, drupal")
            }
            Self::DirectoryNotWritable(_) => Some("Check the directory permissions"),
            Self::BuildFailed { .. } => Some("Run with -v for the full build log"),
            Self::Interrupted => Some("Partial builds are removed by the next build or `clean`"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlatformError::UnsupportedFlavor {
            flavor: "rails".to_string(),
            stack: "ruby".to_string(),
        };
        assert!(err.to_string().contains("Build flavor not found: rails"));
    }

    #[test]
    fn error_hint() {
        let err = PlatformError::ProjectRootNotFound;
        assert!(err.hint().unwrap().contains("--source"));
        assert_eq!(PlatformError::Internal("x".into()).hint(), None);
    }

    #[test]
    fn hook_failure_is_per_app_and_keeps_output() {
        let err = PlatformError::BuildHookFailed {
            hook: "build".to_string(),
            command: "make".to_string(),
            code: 2,
            output: "make: *** No targets".to_string(),
        };
        assert!(err.is_per_app());
        assert_eq!(err.captured_output(), Some("make: *** No targets"));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn duplicate_name_is_structural() {
        let err = PlatformError::DuplicateName {
            name: "app".to_string(),
            first: PathBuf::from("a"),
            second: PathBuf::from("b"),
        };
        assert!(!err.is_per_app());
    }
}
