//! Build run entities: options, requests, states and output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// CMake build type handed to the build tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildType {
    #[default]
    Release,
    Debug,
    /// Let each package's own configuration decide
    #[serde(rename = "auto")]
    Unspecified,
}

impl BuildType {
    /// Value substituted for `{build_type}`; `None` when unspecified
    pub fn cmake_value(&self) -> Option<&'static str> {
        match self {
            Self::Release => Some("Release"),
            Self::Debug => Some("Debug"),
            Self::Unspecified => None,
        }
    }

    /// Next build type in the UI cycle
    pub fn cycle(self) -> Self {
        match self {
            Self::Release => Self::Debug,
            Self::Debug => Self::Unspecified,
            Self::Unspecified => Self::Release,
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "Release"),
            Self::Debug => write!(f, "Debug"),
            Self::Unspecified => write!(f, "auto"),
        }
    }
}

/// Operator-controlled build options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub build_type: BuildType,
    pub symlink_install: bool,
    pub parallel_workers: usize,
    /// Add transitive dependencies of the selection to the build
    pub include_dependencies: bool,
}

impl BuildOptions {
    /// Adjust the worker count by `delta`, never going below one
    pub fn adjust_workers(&mut self, delta: isize) {
        let workers = self.parallel_workers as isize + delta;
        self.parallel_workers = workers.max(1) as usize;
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            build_type: BuildType::default(),
            symlink_install: true,
            parallel_workers: num_cpus::get().max(1),
            include_dependencies: false,
        }
    }
}

/// Everything needed to launch one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Packages to build, sorted by name
    pub packages: Vec<String>,
    pub options: BuildOptions,
}

impl BuildRequest {
    pub fn new<I, S>(packages: I, options: BuildOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut packages: Vec<String> = packages.into_iter().map(Into::into).collect();
        packages.sort();
        packages.dedup();
        Self { packages, options }
    }
}

/// Identifier of a build run, monotonic per orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { exit_code: i32 },
    Cancelled,
}

impl RunOutcome {
    /// Map a process exit code to an outcome
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            Self::Succeeded
        } else {
            Self::Failed { exit_code }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { exit_code } => write!(f, "failed (exit code {})", exit_code),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Orchestrator state as published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed {
        exit_code: i32,
    },
    Cancelled,
}

impl BuildState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the state ends a run (succeeded, failed or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Cancelled
        )
    }

    /// Get status indicator for UI
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Idle => "·",
            Self::Running => "🔄",
            Self::Succeeded => "✓",
            Self::Failed { .. } => "✗",
            Self::Cancelled => "⊘",
        }
    }
}

impl From<RunOutcome> for BuildState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Succeeded => Self::Succeeded,
            RunOutcome::Failed { exit_code } => Self::Failed { exit_code },
            RunOutcome::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { exit_code } => write!(f, "failed (exit code {})", exit_code),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A line of output from the build process
#[derive(Debug, Clone)]
pub struct OutputLine {
    /// When the line was received
    pub timestamp: Instant,
    /// Content of the line, without the trailing newline
    pub content: String,
    /// Which stream (stdout/stderr) it came from
    pub stream: OutputStream,
}

impl OutputLine {
    pub fn new(content: impl Into<String>, stream: OutputStream) -> Self {
        Self {
            timestamp: Instant::now(),
            content: content.into(),
            stream,
        }
    }
}

/// Output stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Get indicator for UI
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Stdout => "",
            Self::Stderr => "!",
        }
    }
}

/// Record of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: RunId,
    pub packages: Vec<String>,
    pub outcome: RunOutcome,
    pub duration: Duration,
    pub output: Vec<OutputLine>,
    /// Path of the persisted run log, if one was written
    pub log_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        build_type: BuildType,
    }

    #[test]
    fn test_build_type_serialization() {
        let auto = Wrapper {
            build_type: BuildType::Unspecified,
        };
        let text = toml::to_string(&auto).unwrap();
        assert_eq!(text.trim(), r#"build_type = "auto""#);

        let parsed: Wrapper = toml::from_str(r#"build_type = "Debug""#).unwrap();
        assert_eq!(parsed.build_type, BuildType::Debug);
    }

    #[test]
    fn test_build_type_cycle() {
        let start = BuildType::Release;
        assert_eq!(start.cycle(), BuildType::Debug);
        assert_eq!(start.cycle().cycle(), BuildType::Unspecified);
        assert_eq!(start.cycle().cycle().cycle(), start);
        assert_eq!(BuildType::Unspecified.cmake_value(), None);
    }

    #[test]
    fn test_outcome_from_exit_code() {
        assert_eq!(RunOutcome::from_exit_code(0), RunOutcome::Succeeded);
        assert_eq!(
            RunOutcome::from_exit_code(2),
            RunOutcome::Failed { exit_code: 2 }
        );
        assert_eq!(
            BuildState::from(RunOutcome::Cancelled),
            BuildState::Cancelled
        );
        assert!(BuildState::Cancelled.is_terminal());
        assert!(!BuildState::Running.is_terminal());
    }

    #[test]
    fn test_request_sorts_packages() {
        let request = BuildRequest::new(["b", "a", "b"], BuildOptions::default());
        assert_eq!(request.packages, vec!["a", "b"]);
    }

    #[test]
    fn test_adjust_workers() {
        let mut options = BuildOptions {
            parallel_workers: 2,
            ..BuildOptions::default()
        };
        options.adjust_workers(-5);
        assert_eq!(options.parallel_workers, 1);
        options.adjust_workers(3);
        assert_eq!(options.parallel_workers, 4);
    }
}
