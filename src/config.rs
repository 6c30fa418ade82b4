//! Configuration management for wsman.
//!
//! Supports layered configuration: defaults → workspace → user → env

use crate::error::ConfigError;
use crate::services::CommandTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-workspace settings file
pub const WORKSPACE_CONFIG_FILE: &str = ".wsman.toml";

/// Platform directories used for the session file, run logs and user config
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "wsman", "wsman")
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub clean: CleanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration with hierarchy: defaults → workspace → user → env
    pub fn load(workspace_root: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            config::File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Workspace-specific config (.wsman.toml in the workspace root)
        if let Some(root) = workspace_root {
            let workspace_config = root.join(WORKSPACE_CONFIG_FILE);
            if workspace_config.exists() {
                builder = builder.add_source(File::from(workspace_config).required(false));
            }
        }

        // 3. User config (~/.config/wsman/config.toml)
        if let Some(dirs) = project_dirs() {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // 4. Environment variables (WSMAN__SECTION__KEY)
        builder = builder.add_source(
            Environment::with_prefix("WSMAN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.manifest_name.trim().is_empty() {
            return Err(ConfigError::Invalid("scan.manifest_name is empty".into()));
        }
        if self.build.command.program.trim().is_empty() {
            return Err(ConfigError::Invalid("build.command.program is empty".into()));
        }
        self.build
            .command
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Package discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory below the workspace root holding the packages
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// File name that marks a package directory
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    /// Maximum directory depth below the source root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Directory names that are never descended into
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    /// Marker file that excludes a directory and everything below it
    #[serde(default = "default_ignore_marker")]
    pub ignore_marker: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            manifest_name: default_manifest_name(),
            max_depth: default_max_depth(),
            skip_dirs: default_skip_dirs(),
            ignore_marker: default_ignore_marker(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_manifest_name() -> String {
    "package.xml".to_string()
}

fn default_max_depth() -> usize {
    10
}

fn default_skip_dirs() -> Vec<String> {
    vec!["build".into(), "install".into(), "log".into()]
}

fn default_ignore_marker() -> String {
    "COLCON_IGNORE".to_string()
}

/// Build tool invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub command: CommandTemplate,
    /// Time between the graceful stop signal and the forced kill
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl BuildConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: CommandTemplate::default(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

fn default_grace_period_ms() -> u64 {
    5000
}

/// Selective clean settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Artifact trees below the workspace root that get cleaned
    #[serde(default = "default_clean_targets")]
    pub targets: Vec<String>,
    /// Paths relative to each target root that survive a clean
    #[serde(default = "default_preserve")]
    pub preserve: BTreeMap<String, Vec<PathBuf>>,
}

impl CleanConfig {
    /// Allow-list for one target tree
    pub fn preserved_in(&self, target: &str) -> &[PathBuf] {
        self.preserve.get(target).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            targets: default_clean_targets(),
            preserve: default_preserve(),
        }
    }
}

fn default_clean_targets() -> Vec<String> {
    vec!["build".into(), "install".into()]
}

fn default_preserve() -> BTreeMap<String, Vec<PathBuf>> {
    let mut preserve = BTreeMap::new();
    preserve.insert(
        "build".to_string(),
        [
            ".cache",
            ".idea",
            "COLCON_IGNORE",
            "compile_commands.json",
            ".built_by",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect(),
    );
    preserve.insert("install".to_string(), vec![PathBuf::from("COLCON_IGNORE")]);
    preserve
}

/// Run log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for per-run build logs; defaults to the data directory
    #[serde(default)]
    pub run_log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolved run log directory, if any can be determined
    pub fn run_log_dir(&self) -> Option<PathBuf> {
        self.run_log_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("logs")))
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// UI refresh rate in milliseconds
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u64,
    /// Enable vim-style navigation (j/k)
    #[serde(default = "default_vim_navigation")]
    pub vim_navigation: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: default_refresh_rate_ms(),
            vim_navigation: default_vim_navigation(),
        }
    }
}

fn default_refresh_rate_ms() -> u64 {
    100
}

fn default_vim_navigation() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scan.source_dir, PathBuf::from("src"));
        assert_eq!(config.scan.max_depth, 10);
        assert_eq!(config.scan.ignore_marker, "COLCON_IGNORE");
        assert_eq!(config.build.grace_period(), Duration::from_secs(5));
        assert_eq!(config.build.command.program, "colcon");
        assert_eq!(config.clean.targets, vec!["build", "install"]);
        assert_eq!(config.clean.preserved_in("build").len(), 5);
        assert_eq!(
            config.clean.preserved_in("install"),
            &[PathBuf::from("COLCON_IGNORE")]
        );
        assert!(config.clean.preserved_in("log").is_empty());
        assert_eq!(config.ui.refresh_rate_ms, 100);
        assert!(config.ui.vim_navigation);
    }

    #[test]
    fn test_embedded_defaults_match_code_defaults() {
        let embedded: AppConfig = toml::from_str(include_str!("../default_config.toml")).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(embedded.scan.skip_dirs, defaults.scan.skip_dirs);
        assert_eq!(embedded.build.command, defaults.build.command);
        assert_eq!(embedded.build.grace_period_ms, defaults.build.grace_period_ms);
        assert_eq!(embedded.clean.preserve, defaults.clean.preserve);
    }

    #[test]
    fn test_workspace_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(WORKSPACE_CONFIG_FILE),
            "[scan]\nmax_depth = 3\n\n[build]\ngrace_period_ms = 250\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(temp.path())).unwrap();

        assert_eq!(config.scan.max_depth, 3);
        assert_eq!(config.build.grace_period_ms, 250);
        assert_eq!(config.scan.manifest_name, "package.xml");
    }

    #[test]
    fn test_invalid_workspace_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(WORKSPACE_CONFIG_FILE),
            "[build.command]\nprogram = \"\"\n",
        )
        .unwrap();

        let result = AppConfig::load(Some(temp.path()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
