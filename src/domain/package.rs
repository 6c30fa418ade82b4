//! Package entity discovered from a workspace manifest.

use std::fmt;
use std::path::PathBuf;

/// A buildable package found during a workspace scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Unique package name (unique within one scan)
    pub name: String,
    /// Directory containing the manifest
    pub path: PathBuf,
    /// Path to the manifest file itself
    pub manifest_path: PathBuf,
    /// Declared dependency names in manifest order, without duplicates
    pub dependencies: Vec<String>,
    /// Package version, if declared
    pub version: Option<String>,
    /// Short description, if declared
    pub description: Option<String>,
    /// Build type exported by the manifest (e.g. `ament_cmake`)
    pub build_type: Option<String>,
}

impl Package {
    /// Create a package with only a name, location and dependencies
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, dependencies: Vec<String>) -> Self {
        let path = path.into();
        let manifest_path = path.join("package.xml");
        Self {
            name: name.into(),
            path,
            manifest_path,
            dependencies,
            version: None,
            description: None,
            build_type: None,
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}
