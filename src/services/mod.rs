//! Infrastructure services for wsman.
//!
//! This module contains:
//! - PackageScanner: package discovery and manifest parsing
//! - BuildOrchestrator: supervised build runs over a ProcessLauncher
//! - WorkspaceCleaner: selective removal of build artifacts
//! - ConfigStore: persistence of the workspace session
//! - EventBus: fan-out of workspace events to the UI

mod cleaner;
mod events;
mod footprint;
mod manifest;
mod orchestrator;
pub mod process;
mod scanner;
mod store;

#[cfg(test)]
pub(crate) mod fake;

pub use cleaner::{CleanFailure, CleanReport, WorkspaceCleaner};
pub use events::{EventBus, EventReceiver, WorkspaceEvent};
pub use footprint::{format_size, LargeFile, PackageFootprint};
pub use manifest::{parse_manifest, read_manifest};
pub use orchestrator::{BuildOrchestrator, MaintenanceGuard};
pub use process::{
    BuildProcess, ChildProcess, CommandLauncher, CommandTemplate, ProcessLauncher,
    RenderedCommand, RunLog, Spawned,
};
pub use scanner::{PackageScanner, ScanReport, ScanWarning};
pub use store::{ConfigStore, SESSION_FILE};
