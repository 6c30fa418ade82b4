//! Workspace scanning: finds package manifests below the source root.

use super::manifest::read_manifest;
use crate::config::ScanConfig;
use crate::domain::Package;
use crate::error::ScanError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Non-fatal problem found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// Manifest could not be read or parsed
    InvalidManifest { path: PathBuf, reason: String },
    /// A second package claimed a name that was already taken
    DuplicateName {
        name: String,
        path: PathBuf,
        kept: PathBuf,
    },
    /// A directory could not be walked
    Unreadable { path: Option<PathBuf>, reason: String },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidManifest { path, reason } => {
                write!(f, "Skipped {}: {}", path.display(), reason)
            }
            Self::DuplicateName { name, path, kept } => write!(
                f,
                "Package {} at {} ignored, name already used by {}",
                name,
                path.display(),
                kept.display()
            ),
            Self::Unreadable { path: Some(path), reason } => {
                write!(f, "Cannot read {}: {}", path.display(), reason)
            }
            Self::Unreadable { path: None, reason } => write!(f, "Cannot read: {}", reason),
        }
    }
}

/// Result of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Directory the walk started from
    pub source_root: PathBuf,
    /// Packages sorted by manifest path, names unique
    pub packages: Vec<Package>,
    pub warnings: Vec<ScanWarning>,
}

/// Service for package discovery
pub struct PackageScanner {
    config: ScanConfig,
}

impl PackageScanner {
    /// Create a new scanner
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Directory the scan starts from: `<root>/<source_dir>` or the root itself
    pub fn source_root(&self, root: &Path) -> PathBuf {
        let source = root.join(&self.config.source_dir);
        if source.is_dir() {
            source
        } else {
            root.to_path_buf()
        }
    }

    /// Discover all packages below a workspace root
    pub fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        if !root.exists() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let source_root = self.source_root(root);
        let mut found = Vec::new();
        let mut warnings = Vec::new();

        let mut walker = WalkDir::new(&source_root)
            .max_depth(self.config.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_descend(e));

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(ScanWarning::Unreadable {
                        path: e.path().map(Path::to_path_buf),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let manifest = entry.path().join(&self.config.manifest_name);
            if !manifest.is_file() {
                continue;
            }

            // A package's own subdirectories are never searched
            walker.skip_current_dir();

            match read_manifest(&manifest) {
                Ok(package) => found.push(package),
                Err(e) => warnings.push(ScanWarning::InvalidManifest {
                    path: manifest,
                    reason: e.to_string(),
                }),
            }
        }

        found.sort_by(|a, b| a.manifest_path.cmp(&b.manifest_path));

        let mut owners: HashMap<String, PathBuf> = HashMap::new();
        let mut packages = Vec::with_capacity(found.len());
        for package in found {
            if let Some(kept) = owners.get(&package.name) {
                warnings.push(ScanWarning::DuplicateName {
                    name: package.name.clone(),
                    path: package.manifest_path.clone(),
                    kept: kept.clone(),
                });
                continue;
            }
            owners.insert(package.name.clone(), package.manifest_path.clone());
            packages.push(package);
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        tracing::info!(
            "Scanned {}: {} packages, {} warnings",
            source_root.display(),
            packages.len(),
            warnings.len()
        );

        Ok(ScanReport {
            source_root,
            packages,
            warnings,
        })
    }

    /// Check whether the walk may enter this entry
    fn should_descend(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || self.config.skip_dirs.iter().any(|s| s.as_str() == name) {
            return false;
        }

        !entry.path().join(&self.config.ignore_marker).exists()
    }
}
