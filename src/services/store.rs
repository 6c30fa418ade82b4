//! Persistence of the workspace session.

use crate::config::project_dirs;
use crate::domain::WorkspaceConfig;
use crate::error::{ConfigError, ConfigResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the session inside the data directory
pub const SESSION_FILE: &str = "session.toml";

/// Reads and writes the persisted [`WorkspaceConfig`]
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by an explicit file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory, if one can be determined
    pub fn default_location() -> Option<Self> {
        project_dirs().map(|dirs| Self::new(dirs.data_dir().join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session.
    ///
    /// A missing file yields the default session. A file that cannot be read
    /// or parsed also yields the default, with a warning.
    pub fn load(&self) -> WorkspaceConfig {
        match self.try_load() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => WorkspaceConfig::default(),
            Err(e) => {
                tracing::warn!(
                    "Ignoring corrupt session file {}: {}",
                    self.path.display(),
                    e
                );
                WorkspaceConfig::default()
            }
        }
    }

    /// Load the stored session, reporting every problem
    pub fn try_load(&self) -> ConfigResult<WorkspaceConfig> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write the session atomically (temp file in the same directory, then rename)
    pub fn save(&self, config: &WorkspaceConfig) -> ConfigResult<()> {
        let text = toml::to_string_pretty(config)?;
        self.write_atomic(text.as_bytes())
            .map_err(|source| ConfigError::Save {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    fn write_atomic(&self, data: &[u8]) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(data)?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BuildType;
    use tempfile::TempDir;

    fn sample() -> WorkspaceConfig {
        WorkspaceConfig {
            workspace_path: Some(PathBuf::from("/home/dev/ros2_ws")),
            selected_packages: vec!["nav_core".into(), "nav_planner".into()],
            symlink_install: false,
            build_type: BuildType::Unspecified,
            parallel_workers: 6,
            include_dependencies: true,
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("session.toml"));

        assert_eq!(store.load(), WorkspaceConfig::default());
        assert!(matches!(store.try_load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("nested/dir/session.toml"));

        store.save(&sample()).unwrap();

        assert_eq!(store.try_load().unwrap(), sample());
    }

    #[test]
    fn test_save_of_load_is_stable() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("session.toml"));
        store.save(&sample()).unwrap();
        let first = fs::read(store.path()).unwrap();

        store.save(&store.load()).unwrap();

        assert_eq!(fs::read(store.path()).unwrap(), first);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("session.toml"));
        fs::write(store.path(), "selected_packages = [unterminated").unwrap();

        assert!(matches!(store.try_load(), Err(ConfigError::Parse(_))));
        assert_eq!(store.load(), WorkspaceConfig::default());
    }

    #[test]
    fn test_save_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let store = ConfigStore::new(blocker.join("session.toml"));

        assert!(matches!(
            store.save(&sample()),
            Err(ConfigError::Save { .. })
        ));
    }
}
