//! Unified error types for the wsman application.

use std::path::PathBuf;
use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Clean error: {0}")]
    Clean(#[from] CleanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Terminal error: {0}")]
    Terminal(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to save configuration to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace scanning errors
///
/// Only conditions that make the whole scan impossible live here; a bad
/// manifest is a [`crate::services::ScanWarning`], not an error.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Workspace root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Workspace root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Errors of operations on the workspace as a whole
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Cannot switch workspace while a build is running")]
    BuildActive,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Manifest parsing errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed manifest: {0}")]
    Malformed(#[from] quick_xml::DeError),

    #[error("Manifest has no package name")]
    MissingName,
}

/// Build orchestration errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("A build is already running")]
    AlreadyRunning,

    #[error("The workspace is busy with a clean")]
    Busy,

    #[error("No packages selected for build")]
    NothingToBuild,

    #[error("Failed to spawn build process: {0}")]
    Spawn(String),

    #[error("Invalid build command template: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace clean errors
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Cannot clean while a build is running")]
    BuildActive,

    #[error("A clean is already running")]
    InProgress,

    #[error("Clean finished with {} failed entries", failures.len())]
    PartialFailure {
        failures: Vec<crate::services::CleanFailure>,
    },

    #[error("Clean task failed: {0}")]
    Task(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for build operations
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
