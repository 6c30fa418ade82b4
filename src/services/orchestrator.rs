//! Build orchestration: one supervised build run at a time.
//!
//! `start` launches the build tool and returns immediately; a supervisor task
//! owns the process, streams its output as [`WorkspaceEvent::Log`] events and
//! publishes the terminal [`WorkspaceEvent::StateChanged`] after the last line.

use super::{BuildProcess, EventBus, ProcessLauncher, RunLog, Spawned, WorkspaceEvent};
use crate::domain::{BuildRequest, BuildState, OutputLine, RunId, RunOutcome, RunSummary};
use crate::error::{BuildError, BuildResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How long output may keep arriving after the process exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct ActiveRun {
    id: RunId,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<RunSummary>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    active: Option<ActiveRun>,
    maintenance: bool,
    last_run: Option<RunSummary>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Supervises build runs for one workspace
pub struct BuildOrchestrator {
    launcher: Arc<dyn ProcessLauncher>,
    events: EventBus,
    grace_period: Duration,
    log_dir: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
}

impl BuildOrchestrator {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, events: EventBus, grace_period: Duration) -> Self {
        Self {
            launcher,
            events,
            grace_period,
            log_dir: None,
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            })),
        }
    }

    /// Persist each run's output below `dir`
    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// Current state; terminal states are only visible through events
    pub fn state(&self) -> BuildState {
        if lock(&self.inner).active.is_some() {
            BuildState::Running
        } else {
            BuildState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Summary of the most recently finished run
    pub fn last_run(&self) -> Option<RunSummary> {
        lock(&self.inner).last_run.clone()
    }

    /// Launch a build and return as soon as the process is spawned.
    ///
    /// Never queues. An empty package list is rejected with
    /// [`BuildError::NothingToBuild`] before anything is launched, a second
    /// start while running with [`BuildError::AlreadyRunning`], and a start
    /// during a clean with [`BuildError::Busy`].
    pub fn start(&self, request: BuildRequest, cwd: &Path) -> BuildResult<RunId> {
        if request.packages.is_empty() {
            return Err(BuildError::NothingToBuild);
        }

        let mut inner = lock(&self.inner);
        if inner.active.is_some() {
            return Err(BuildError::AlreadyRunning);
        }
        if inner.maintenance {
            return Err(BuildError::Busy);
        }

        let Spawned {
            process,
            output,
            command,
        } = self.launcher.launch(&request, cwd)?;

        let id = RunId(inner.next_id);
        inner.next_id += 1;

        let log = self.log_dir.as_deref().and_then(|dir| {
            RunLog::create(dir, id, &request.packages, &command)
                .map_err(|e| tracing::warn!("Cannot write run log in {}: {}", dir.display(), e))
                .ok()
        });

        tracing::info!(
            "Build {} started for {} packages: {}",
            id,
            request.packages.len(),
            command
        );
        self.events.publish(WorkspaceEvent::StateChanged {
            run: id,
            state: BuildState::Running,
        });

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let supervisor = Supervisor {
            id,
            packages: request.packages,
            process,
            output,
            cancel: cancel_rx,
            grace_period: self.grace_period,
            events: self.events.clone(),
            inner: Arc::clone(&self.inner),
            log,
            lines: Vec::new(),
            started_at: Instant::now(),
        };
        let handle = tokio::spawn(supervisor.run());

        inner.active = Some(ActiveRun {
            id,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        });
        Ok(id)
    }

    /// Request cancellation of the active run.
    ///
    /// Returns `false` when there is nothing to cancel or a cancellation was
    /// already requested.
    pub fn cancel(&self) -> bool {
        let mut inner = lock(&self.inner);
        let Some(sender) = inner.active.as_mut().and_then(|run| run.cancel.take()) else {
            return false;
        };
        tracing::info!("Cancellation requested");
        sender.send(()).is_ok()
    }

    /// Wait for the active run to finish and return its summary.
    ///
    /// Without an active run this returns the last summary, if any.
    pub async fn wait(&self) -> Option<RunSummary> {
        let handle = lock(&self.inner)
            .active
            .as_mut()
            .and_then(|run| run.handle.take());

        match handle {
            Some(handle) => match handle.await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::error!("Build supervisor failed: {}", e);
                    lock(&self.inner).active = None;
                    None
                }
            },
            None => self.last_run(),
        }
    }

    /// Mark the workspace busy so no build can start until the guard drops
    pub fn begin_maintenance(&self) -> BuildResult<MaintenanceGuard> {
        let mut inner = lock(&self.inner);
        if inner.active.is_some() {
            return Err(BuildError::AlreadyRunning);
        }
        if inner.maintenance {
            return Err(BuildError::Busy);
        }
        inner.maintenance = true;
        Ok(MaintenanceGuard {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Exclusive hold on the workspace for destructive maintenance
pub struct MaintenanceGuard {
    inner: Arc<Mutex<Inner>>,
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        lock(&self.inner).maintenance = false;
    }
}

/// Owns one build process from launch to exit
struct Supervisor {
    id: RunId,
    packages: Vec<String>,
    process: Box<dyn BuildProcess>,
    output: mpsc::UnboundedReceiver<OutputLine>,
    cancel: oneshot::Receiver<()>,
    grace_period: Duration,
    events: EventBus,
    inner: Arc<Mutex<Inner>>,
    log: Option<RunLog>,
    lines: Vec<OutputLine>,
    started_at: Instant,
}

impl Supervisor {
    async fn run(mut self) -> RunSummary {
        let mut output_open = true;
        let mut cancel_armed = true;
        let mut cancelled = false;

        let status = loop {
            tokio::select! {
                biased;

                line = self.output.recv(), if output_open => match line {
                    Some(line) => self.forward(line),
                    None => output_open = false,
                },
                request = &mut self.cancel, if cancel_armed => {
                    cancel_armed = false;
                    if request.is_ok() {
                        cancelled = true;
                        break self.stop().await;
                    }
                }
                status = self.process.wait() => break status,
            }
        };

        if output_open {
            self.drain().await;
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else {
            match status {
                Ok(code) => RunOutcome::from_exit_code(code),
                Err(e) => {
                    tracing::warn!("Lost track of build {}: {}", self.id, e);
                    RunOutcome::Failed { exit_code: -1 }
                }
            }
        };

        self.finish(outcome)
    }

    /// Graceful stop, escalated to a kill after the grace period
    async fn stop(&mut self) -> io::Result<i32> {
        if let Err(e) = self.process.terminate() {
            tracing::warn!("Failed to terminate build {}: {}", self.id, e);
        }

        match tokio::time::timeout(self.grace_period, self.process.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(
                    "Build {} still running {:?} after termination, killing",
                    self.id,
                    self.grace_period
                );
                if let Err(e) = self.process.kill() {
                    tracing::warn!("Failed to kill build {}: {}", self.id, e);
                }
                self.process.wait().await
            }
        }
    }

    /// Deliver whatever output is still buffered after exit
    async fn drain(&mut self) {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(line)) => self.forward(line),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Output of build {} still open after exit", self.id);
                    break;
                }
            }
        }
    }

    fn forward(&mut self, line: OutputLine) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.append(&line) {
                tracing::warn!("Run log write failed, disabling it: {}", e);
                self.log = None;
            }
        }
        self.events.publish(WorkspaceEvent::Log {
            run: self.id,
            line: line.clone(),
        });
        self.lines.push(line);
    }

    fn finish(mut self, outcome: RunOutcome) -> RunSummary {
        let log_path = self.log.take().and_then(|log| {
            log.finish(&outcome.to_string())
                .map_err(|e| tracing::warn!("Cannot finish run log: {}", e))
                .ok()
        });

        let summary = RunSummary {
            id: self.id,
            packages: std::mem::take(&mut self.packages),
            outcome,
            duration: self.started_at.elapsed(),
            output: std::mem::take(&mut self.lines),
            log_path,
        };

        {
            let mut inner = lock(&self.inner);
            if inner.active.as_ref().map(|run| run.id) == Some(self.id) {
                inner.active = None;
            }
            inner.last_run = Some(summary.clone());
            self.events.publish(WorkspaceEvent::StateChanged {
                run: self.id,
                state: outcome.into(),
            });
        }

        tracing::info!(
            "Build {} {} after {:.1}s",
            self.id,
            outcome,
            summary.duration.as_secs_f64()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildOptions, OutputStream};
    use crate::services::fake::FakeLauncher;
    use crate::services::EventReceiver;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn request(packages: &[&str]) -> BuildRequest {
        BuildRequest::new(packages.iter().copied(), BuildOptions::default())
    }

    fn orchestrator(launcher: &Arc<FakeLauncher>, grace: Duration) -> (BuildOrchestrator, EventReceiver) {
        let events = EventBus::new();
        let rx = events.subscribe();
        let launcher: Arc<dyn ProcessLauncher> = launcher.clone();
        (BuildOrchestrator::new(launcher, events, grace), rx)
    }

    async fn next(rx: &mut EventReceiver) -> WorkspaceEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed")
    }

    /// Collect events until the run's terminal state
    async fn until_terminal(rx: &mut EventReceiver) -> (Vec<String>, BuildState) {
        let mut lines = Vec::new();
        loop {
            match next(rx).await {
                WorkspaceEvent::Log { line, .. } => lines.push(line.content),
                WorkspaceEvent::StateChanged { state, .. } if state.is_terminal() => {
                    return (lines, state)
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_run_streams_output_then_terminal_state() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        let id = assert_ok!(orch.start(request(&["b", "a"]), Path::new("/ws")));
        assert!(matches!(
            next(&mut rx).await,
            WorkspaceEvent::StateChanged { state: BuildState::Running, run } if run == id
        ));
        assert_eq!(orch.state(), BuildState::Running);

        let fake = launcher.handle(0);
        fake.line("Starting >>> a");
        fake.emit("warning", OutputStream::Stderr);
        fake.line("Finished <<< a");
        fake.exit(0);

        let (lines, state) = until_terminal(&mut rx).await;
        assert_eq!(lines, vec!["Starting >>> a", "warning", "Finished <<< a"]);
        assert_eq!(state, BuildState::Succeeded);
        assert_eq!(orch.state(), BuildState::Idle);

        let summary = orch.last_run().unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.packages, vec!["a", "b"]);
        assert_eq!(summary.outcome, RunOutcome::Succeeded);
        assert_eq!(summary.output.len(), 3);
        assert_eq!(launcher.request(0).1, PathBuf::from("/ws"));
    }

    #[tokio::test]
    async fn test_rejects_second_start_and_empty_request() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, _rx) = orchestrator(&launcher, Duration::from_secs(5));

        assert!(matches!(
            orch.start(request(&[]), Path::new(".")),
            Err(BuildError::NothingToBuild)
        ));

        assert_ok!(orch.start(request(&["a"]), Path::new(".")));
        let err = assert_err!(orch.start(request(&["b"]), Path::new(".")));
        assert!(matches!(err, BuildError::AlreadyRunning));
        assert_eq!(launcher.launches(), 1);

        launcher.handle(0).exit(0);
        orch.wait().await.unwrap();
        assert_ok!(orch.start(request(&["b"]), Path::new(".")));
    }

    #[tokio::test]
    async fn test_failed_exit_code() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        launcher.handle(0).exit(2);

        let (_, state) = until_terminal(&mut rx).await;
        assert_eq!(state, BuildState::Failed { exit_code: 2 });
        assert_eq!(
            orch.wait().await.unwrap().outcome,
            RunOutcome::Failed { exit_code: 2 }
        );
    }

    #[tokio::test]
    async fn test_cancel_terminates_gracefully() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        launcher.handle(0).line("compiling");
        assert!(orch.cancel());
        assert!(!orch.cancel());

        let (lines, state) = until_terminal(&mut rx).await;
        assert_eq!(lines, vec!["compiling"]);
        assert_eq!(state, BuildState::Cancelled);
        assert!(launcher.handle(0).was_terminated());
        assert!(!launcher.handle(0).was_killed());
        assert_eq!(orch.last_run().unwrap().outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_escalates_to_kill() {
        let launcher = Arc::new(FakeLauncher::stubborn());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_millis(50));

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        assert!(orch.cancel());

        let (_, state) = until_terminal(&mut rx).await;
        assert_eq!(state, BuildState::Cancelled);
        assert!(launcher.handle(0).was_terminated());
        assert!(launcher.handle(0).was_killed());
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        assert!(!orch.cancel());

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        launcher.handle(0).exit(0);
        until_terminal(&mut rx).await;

        assert!(!orch.cancel());
        assert_eq!(orch.last_run().unwrap().outcome, RunOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_subscriber_can_restart_on_terminal_event() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        launcher.handle(0).exit(1);
        until_terminal(&mut rx).await;

        let second = assert_ok!(orch.start(request(&["a"]), Path::new(".")));
        assert_eq!(second, RunId(2));
    }

    #[tokio::test]
    async fn test_maintenance_excludes_builds() {
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, _rx) = orchestrator(&launcher, Duration::from_secs(5));

        let guard = assert_ok!(orch.begin_maintenance());
        assert!(matches!(
            orch.start(request(&["a"]), Path::new(".")),
            Err(BuildError::Busy)
        ));
        drop(guard);

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        assert!(matches!(
            orch.begin_maintenance(),
            Err(BuildError::AlreadyRunning)
        ));
        launcher.handle(0).exit(0);
        orch.wait().await.unwrap();
        assert_ok!(orch.begin_maintenance());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_idle() {
        let launcher = Arc::new(FakeLauncher::broken());
        let (orch, mut rx) = orchestrator(&launcher, Duration::from_secs(5));

        let err = assert_err!(orch.start(request(&["a"]), Path::new(".")));
        assert!(matches!(err, BuildError::Spawn(_)));
        assert_eq!(orch.state(), BuildState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_log_is_written() {
        let temp = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::new());
        let (orch, _rx) = orchestrator(&launcher, Duration::from_secs(5));
        let orch = orch.with_log_dir(Some(temp.path().to_path_buf()));

        orch.start(request(&["a"]), Path::new(".")).unwrap();
        launcher.handle(0).line("hello");
        launcher.handle(0).exit(0);
        let summary = orch.wait().await.unwrap();

        let path = summary.log_path.expect("log path");
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("# Command: fake-build a"));
        assert!(text.contains("[OUT] hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_real_process() {
        use crate::services::{CommandLauncher, CommandTemplate};

        let temp = TempDir::new().unwrap();
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(CommandLauncher::new(CommandTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), "echo started; sleep 30; echo never".into()],
            symlink_install_args: vec![],
            parallel_args: vec![],
            build_type_args: vec![],
            package_args: vec![],
        }));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let orch = BuildOrchestrator::new(launcher, events, Duration::from_secs(5));

        orch.start(request(&["a"]), temp.path()).unwrap();
        loop {
            if let WorkspaceEvent::Log { line, .. } = next(&mut rx).await {
                assert_eq!(line.content, "started");
                break;
            }
        }
        let begun = Instant::now();
        assert!(orch.cancel());

        let (lines, state) = until_terminal(&mut rx).await;
        assert!(lines.is_empty());
        assert_eq!(state, BuildState::Cancelled);
        assert!(begun.elapsed() < Duration::from_secs(5));
    }
}
