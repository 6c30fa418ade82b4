//! Persisted workspace session.

use super::{BuildOptions, BuildType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// State remembered between runs of the tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Last opened workspace root
    pub workspace_path: Option<PathBuf>,
    /// Selected package names, sorted
    pub selected_packages: Vec<String>,
    pub symlink_install: bool,
    pub build_type: BuildType,
    pub parallel_workers: usize,
    pub include_dependencies: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let options = BuildOptions::default();
        Self {
            workspace_path: None,
            selected_packages: Vec::new(),
            symlink_install: options.symlink_install,
            build_type: options.build_type,
            parallel_workers: options.parallel_workers,
            include_dependencies: options.include_dependencies,
        }
    }
}

impl WorkspaceConfig {
    /// Build options recorded in this session
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            build_type: self.build_type,
            symlink_install: self.symlink_install,
            parallel_workers: self.parallel_workers.max(1),
            include_dependencies: self.include_dependencies,
        }
    }

    /// Record build options into this session
    pub fn set_build_options(&mut self, options: &BuildOptions) {
        self.build_type = options.build_type;
        self.symlink_install = options.symlink_install;
        self.parallel_workers = options.parallel_workers;
        self.include_dependencies = options.include_dependencies;
    }

    /// Replace the selected packages, keeping them sorted and unique
    pub fn set_selected<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        self.selected_packages = names;
    }
}
