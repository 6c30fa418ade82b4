//! On-disk size statistics for a package directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory names left out of a footprint
const SKIPPED_DIRS: &[&str] = &[".git", "__pycache__", ".pytest_cache", "build", ".vscode"];

/// Files above this size are listed individually
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024;

/// How many large files are kept
const LARGE_FILE_LIMIT: usize = 10;

/// A file that stands out in a footprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeFile {
    /// Path relative to the package directory
    pub path: PathBuf,
    pub size: u64,
}

/// Size statistics of one package directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFootprint {
    pub total_size: u64,
    /// Every non-directory entry seen, counted or not
    pub file_count: usize,
    pub regular_files: usize,
    pub regular_size: u64,
    pub symlinks: usize,
    /// Sum of link target lengths
    pub symlink_size: u64,
    /// Entries whose metadata could not be read
    pub skipped_files: usize,
    pub dir_count: usize,
    pub skipped_dirs: usize,
    /// Largest files, biggest first
    pub large_files: Vec<LargeFile>,
}

impl PackageFootprint {
    /// Measure a directory. Links are never followed; hard links count once.
    pub fn measure(path: &Path) -> Self {
        let mut footprint = Self::default();
        let mut seen: HashSet<(u64, u64)> = HashSet::new();

        let walker = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !SKIPPED_DIRS.iter().any(|s| e.file_name() == *s)
            });

        // filter_entry hides skipped directories, so count them separately
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Footprint skipped entry: {}", e);
                    footprint.skipped_files += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                footprint.dir_count += 1;
                footprint.skipped_dirs += count_skipped_children(entry.path());
                continue;
            }

            footprint.file_count += 1;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => {
                    footprint.skipped_files += 1;
                    continue;
                }
            };

            if !seen.insert(file_identity(&metadata)) {
                continue;
            }

            if metadata.file_type().is_symlink() {
                match fs::read_link(entry.path()) {
                    Ok(target) => {
                        let size = target.as_os_str().len() as u64;
                        footprint.symlinks += 1;
                        footprint.symlink_size += size;
                        footprint.total_size += size;
                    }
                    Err(_) => footprint.skipped_files += 1,
                }
            } else if metadata.is_file() {
                let size = metadata.len();
                footprint.regular_files += 1;
                footprint.regular_size += size;
                footprint.total_size += size;
                if size > LARGE_FILE_THRESHOLD {
                    let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                    footprint.large_files.push(LargeFile {
                        path: relative.to_path_buf(),
                        size,
                    });
                }
            }
        }

        footprint
            .large_files
            .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        footprint.large_files.truncate(LARGE_FILE_LIMIT);
        footprint
    }
}

fn count_skipped_children(dir: &Path) -> usize {
    SKIPPED_DIRS
        .iter()
        .filter(|name| {
            fs::symlink_metadata(dir.join(name))
                .map(|m| m.is_dir())
                .unwrap_or(false)
        })
        .count()
}

#[cfg(unix)]
fn file_identity(metadata: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &fs::Metadata) -> (u64, u64) {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    (0, NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Render a byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
