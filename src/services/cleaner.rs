//! Selective removal of build artifacts.
//!
//! Everything below each target tree is deleted except the entries on that
//! tree's allow-list. Allow-listed directories are not entered at all.

use crate::config::CleanConfig;
use crate::error::CleanError;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An entry that could not be read or removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanFailure {
    pub path: PathBuf,
    pub error: String,
}

impl fmt::Display for CleanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Outcome of one clean
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Allow-listed entries that were left in place
    pub preserved: Vec<PathBuf>,
    /// Targets that did not exist
    pub skipped_targets: Vec<String>,
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of removed entries
    pub fn removed(&self) -> usize {
        self.removed_files + self.removed_dirs
    }

    /// Turn a report with failures into an error
    pub fn into_result(self) -> Result<Self, CleanError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CleanError::PartialFailure {
                failures: self.failures,
            })
        }
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} files and {} directories, preserved {}",
            self.removed_files,
            self.removed_dirs,
            self.preserved.len()
        )?;
        if !self.failures.is_empty() {
            write!(f, ", {} failed", self.failures.len())?;
        }
        Ok(())
    }
}

/// Service deleting artifact trees below a workspace root
pub struct WorkspaceCleaner {
    config: CleanConfig,
}

impl WorkspaceCleaner {
    pub fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    /// Clean every configured target below `root`
    pub fn clean(&self, root: &Path) -> CleanReport {
        let mut report = CleanReport::default();

        for target in &self.config.targets {
            let tree = root.join(target);
            if !tree.is_dir() {
                tracing::debug!("Nothing to clean at {}", tree.display());
                report.skipped_targets.push(target.clone());
                continue;
            }
            self.clean_tree(&tree, self.config.preserved_in(target), &mut report);
        }

        for failure in &report.failures {
            tracing::warn!("Clean failed for {}", failure);
        }
        tracing::info!("Clean of {} finished: {}", root.display(), report);
        report
    }

    fn clean_tree(&self, tree: &Path, allow_list: &[PathBuf], report: &mut CleanReport) {
        let mut preserved: Vec<PathBuf> = Vec::new();
        let mut entries: Vec<(PathBuf, bool)> = Vec::new();
        let mut blocked: HashSet<PathBuf> = HashSet::new();
        let mut failures: Vec<CleanFailure> = Vec::new();

        let walker = WalkDir::new(tree)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let relative = e.path().strip_prefix(tree).unwrap_or(e.path());
                if allow_list.iter().any(|allowed| allowed == relative) {
                    preserved.push(e.path().to_path_buf());
                    false
                } else {
                    true
                }
            });

        for entry in walker {
            match entry {
                Ok(entry) => entries.push((entry.path().to_path_buf(), entry.file_type().is_dir())),
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| tree.to_path_buf());
                    failures.push(CleanFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Directories above a kept entry must stay
        for path in preserved.iter().chain(failures.iter().map(|f| &f.path)) {
            block_ancestors(path, tree, &mut blocked);
        }
        // An unreadable directory keeps its own path as well
        for failure in &failures {
            blocked.insert(failure.path.clone());
        }

        // Reverse pre-order visits children before their parent
        for (path, is_dir) in entries.into_iter().rev() {
            if blocked.contains(&path) {
                continue;
            }
            let result = if is_dir {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Removed {}", path.display());
                    if is_dir {
                        report.removed_dirs += 1;
                    } else {
                        report.removed_files += 1;
                    }
                }
                Err(e) => {
                    block_ancestors(&path, tree, &mut blocked);
                    failures.push(CleanFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.preserved.extend(preserved);
        report.failures.extend(failures);
    }
}

/// Mark every directory between `path` and `tree` (both exclusive) as blocked
fn block_ancestors(path: &Path, tree: &Path, blocked: &mut HashSet<PathBuf>) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == tree || !dir.starts_with(tree) {
            break;
        }
        if !blocked.insert(dir.to_path_buf()) {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    fn cleaner() -> WorkspaceCleaner {
        WorkspaceCleaner::new(CleanConfig::default())
    }

    #[test]
    fn test_clean_preserves_allow_list() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("build");

        // 13 entries, 3 of them allow-listed
        touch(&build.join(".cache/clangd/index.idx"));
        touch(&build.join("COLCON_IGNORE"));
        touch(&build.join("compile_commands.json"));
        touch(&build.join("pkg_a/CMakeCache.txt"));
        touch(&build.join("pkg_a/Makefile"));
        touch(&build.join("pkg_a/obj/main.o"));
        touch(&build.join("pkg_b/CMakeCache.txt"));
        touch(&build.join("pkg_b/.cache"));
        touch(&build.join("pkg_b/compile_commands.json"));
        touch(&build.join("colcon_build.rc"));

        let report = cleaner().clean(temp.path());

        assert!(report.is_success());
        assert!(build.join(".cache/clangd/index.idx").exists());
        assert!(build.join("COLCON_IGNORE").exists());
        assert!(build.join("compile_commands.json").exists());
        assert!(!build.join("pkg_a").exists());
        assert!(!build.join("pkg_b").exists());
        assert!(!build.join("colcon_build.rc").exists());
        assert!(build.exists());
        assert_eq!(report.preserved.len(), 3);
        assert_eq!(report.removed_files, 7);
        assert_eq!(report.removed_dirs, 3);
        assert_eq!(report.skipped_targets, vec!["install"]);
    }

    #[test]
    fn test_clean_matches_relative_path_not_name() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("install");
        touch(&install.join("COLCON_IGNORE"));
        touch(&install.join("pkg/COLCON_IGNORE"));
        touch(&install.join("setup.bash"));

        let report = cleaner().clean(temp.path());

        assert!(install.join("COLCON_IGNORE").exists());
        assert!(!install.join("pkg").exists());
        assert!(!install.join("setup.bash").exists());
        assert_eq!(report.removed_files, 2);
        assert_eq!(report.removed_dirs, 1);
    }

    #[test]
    fn test_clean_keeps_parents_of_nested_preserved_entries() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("build");
        touch(&build.join("pkg/keep/me.txt"));
        touch(&build.join("pkg/drop.txt"));
        let cleaner = WorkspaceCleaner::new(CleanConfig {
            targets: vec!["build".into()],
            preserve: [("build".to_string(), vec![PathBuf::from("pkg/keep")])]
                .into_iter()
                .collect(),
        });

        let report = cleaner.clean(temp.path());

        assert!(report.is_success());
        assert!(build.join("pkg/keep/me.txt").exists());
        assert!(!build.join("pkg/drop.txt").exists());
        assert_eq!(report.removed_dirs, 0);
    }

    #[test]
    fn test_clean_missing_trees_is_noop() {
        let temp = TempDir::new().unwrap();

        let report = cleaner().clean(temp.path());

        assert!(report.is_success());
        assert_eq!(report.removed(), 0);
        assert_eq!(report.skipped_targets, vec!["build", "install"]);
        assert!(report.into_result().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_records_failures_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let build = temp.path().join("build");
        touch(&build.join("locked/inner.o"));
        touch(&build.join("other/file.o"));
        let locked = build.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind a privileged user
        if fs::write(locked.join("probe"), "").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = cleaner().clean(temp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!build.join("other").exists());
        assert!(locked.join("inner.o").exists());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, locked.join("inner.o"));
        assert!(matches!(
            report.into_result(),
            Err(CleanError::PartialFailure { failures }) if failures.len() == 1
        ));
    }
}
