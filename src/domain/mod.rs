//! Domain entities for wsman.
//!
//! This module contains the core entities:
//! - Package: A buildable package found by a scan
//! - DependencyGraph: "depends on" relations between packages
//! - Selection: Which packages the operator wants to build
//! - Build: Build options, requests, run states and output
//! - Session: The persisted workspace configuration

mod build;
mod graph;
mod package;
mod selection;
mod session;

pub use build::{
    BuildOptions, BuildRequest, BuildState, BuildType, OutputLine, OutputStream, RunId,
    RunOutcome, RunSummary,
};
pub use graph::{DependencyGraph, ImpactDirection, UnresolvedEdge};
pub use package::Package;
pub use selection::{Selection, SelectionEntry};
pub use session::WorkspaceConfig;
