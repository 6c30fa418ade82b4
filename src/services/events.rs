//! Workspace events and their fan-out to subscribers.

use super::{CleanReport, ScanWarning};
use crate::domain::{BuildState, OutputLine, RunId};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Events published by a workspace
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    /// A line of build output
    Log { run: RunId, line: OutputLine },
    /// The orchestrator moved to a new state
    StateChanged { run: RunId, state: BuildState },
    /// A clean finished (successfully or not)
    CleanFinished(CleanReport),
    /// A scan replaced the package set
    Scanned {
        packages: usize,
        warnings: Vec<ScanWarning>,
    },
}

impl WorkspaceEvent {
    /// Run this event belongs to, if it is a build event
    pub fn run(&self) -> Option<RunId> {
        match self {
            Self::Log { run, .. } | Self::StateChanged { run, .. } => Some(*run),
            _ => None,
        }
    }

    /// Check if this event ends a build run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StateChanged { state, .. } if state.is_terminal())
    }
}

/// Receiving end of a subscription
pub type EventReceiver = mpsc::UnboundedReceiver<WorkspaceEvent>;

/// Publish/subscribe channel with one unbounded queue per subscriber.
///
/// Nothing is dropped or reordered for a live subscriber; subscribers that
/// went away are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<WorkspaceEvent>>>>,
}

impl EventBus {
    /// Create a bus without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber; it sees every event published from now on
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Send an event to every live subscriber
    pub fn publish(&self, event: WorkspaceEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<WorkspaceEvent>>> {
        // A panic while holding the lock leaves the list itself consistent
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
