//! `package.xml` manifest parsing.
//!
//! Only the fields the workspace model needs are declared; every other
//! element and attribute in the manifest is ignored.

use crate::domain::Package;
use crate::error::ManifestError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Element whose text content is all we need (attributes are ignored)
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

impl Text {
    fn trimmed(&self) -> Option<String> {
        let value = self.value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Export {
    #[serde(default)]
    build_type: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<Text>,
    #[serde(default)]
    version: Option<Text>,
    #[serde(default)]
    description: Option<Text>,
    #[serde(default)]
    depend: Vec<Text>,
    #[serde(default)]
    build_depend: Vec<Text>,
    #[serde(default)]
    build_export_depend: Vec<Text>,
    #[serde(default)]
    exec_depend: Vec<Text>,
    #[serde(default)]
    run_depend: Vec<Text>,
    #[serde(default)]
    test_depend: Vec<Text>,
    #[serde(default)]
    export: Option<Export>,
}

impl RawManifest {
    /// All dependency declarations, grouped by kind, duplicates removed
    fn dependencies(&self) -> Vec<String> {
        let kinds = [
            &self.depend,
            &self.build_depend,
            &self.build_export_depend,
            &self.exec_depend,
            &self.run_depend,
            &self.test_depend,
        ];

        let mut deps: Vec<String> = Vec::new();
        for dep in kinds.into_iter().flatten() {
            if let Some(name) = dep.trimmed() {
                if !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }
        deps
    }
}

/// Parse manifest text for a package living in `package_dir`
pub fn parse_manifest(xml: &str, package_dir: &Path, manifest_path: &Path) -> Result<Package, ManifestError> {
    let raw: RawManifest = quick_xml::de::from_str(xml)?;

    let name = raw
        .name
        .as_ref()
        .and_then(Text::trimmed)
        .ok_or(ManifestError::MissingName)?;

    Ok(Package {
        name,
        path: package_dir.to_path_buf(),
        manifest_path: manifest_path.to_path_buf(),
        dependencies: raw.dependencies(),
        version: raw.version.as_ref().and_then(Text::trimmed),
        description: raw.description.as_ref().and_then(Text::trimmed),
        build_type: raw
            .export
            .as_ref()
            .and_then(|e| e.build_type.as_ref())
            .and_then(Text::trimmed),
    })
}

/// Read and parse the manifest at `manifest_path`
pub fn read_manifest(manifest_path: &Path) -> Result<Package, ManifestError> {
    let xml = fs::read_to_string(manifest_path)?;
    let package_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    parse_manifest(&xml, package_dir, manifest_path)
}
