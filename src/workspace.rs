//! The workspace context: one source workspace and everything that acts on it.
//!
//! A [`Workspace`] owns the scanned packages, their dependency graph, the
//! operator's selection and build options, the event bus and the build
//! orchestrator. Every operation goes through it; there is no global state.

use crate::config::AppConfig;
use crate::domain::{
    BuildOptions, BuildRequest, BuildState, DependencyGraph, Package, RunId, RunSummary,
    Selection, WorkspaceConfig,
};
use crate::error::{BuildError, BuildResult, CleanError, ScanError, WorkspaceError};
use crate::services::{
    BuildOrchestrator, CleanReport, EventBus, EventReceiver, PackageFootprint, PackageScanner,
    ProcessLauncher, ScanReport, ScanWarning, WorkspaceCleaner, WorkspaceEvent,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Workspace {
    root: PathBuf,
    config: AppConfig,
    scanner: PackageScanner,
    report: ScanReport,
    graph: DependencyGraph,
    selection: Selection,
    options: BuildOptions,
    events: EventBus,
    orchestrator: BuildOrchestrator,
    footprints: HashMap<String, PackageFootprint>,
}

impl Workspace {
    /// Open a workspace and scan it
    pub fn open(
        root: impl Into<PathBuf>,
        config: AppConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self, ScanError> {
        let root = absolute_root(root.into())?;
        let scanner = PackageScanner::new(config.scan.clone());
        let report = scanner.scan(&root)?;

        let events = EventBus::new();
        let orchestrator =
            BuildOrchestrator::new(launcher, events.clone(), config.build.grace_period())
                .with_log_dir(config.logging.run_log_dir());

        let mut workspace = Self {
            root,
            config,
            scanner,
            report: ScanReport::default(),
            graph: DependencyGraph::new(),
            selection: Selection::default(),
            options: BuildOptions::default(),
            events,
            orchestrator,
            footprints: HashMap::new(),
        };
        workspace.apply_scan(report);
        Ok(workspace)
    }

    /// Scan the workspace again, keeping the still-known selection
    pub fn rescan(&mut self) -> Result<&ScanReport, ScanError> {
        let report = self.scanner.scan(&self.root)?;
        self.apply_scan(report);
        Ok(&self.report)
    }

    /// Switch to another workspace root.
    ///
    /// Refused while a build runs. The current workspace stays in place when
    /// the new root cannot be scanned.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) -> Result<(), WorkspaceError> {
        if self.orchestrator.is_running() {
            return Err(WorkspaceError::BuildActive);
        }
        let root = absolute_root(root.into())?;
        let report = self.scanner.scan(&root)?;
        tracing::info!("Switching workspace to {}", root.display());
        self.root = root;
        self.apply_scan(report);
        Ok(())
    }

    fn apply_scan(&mut self, report: ScanReport) {
        self.graph = DependencyGraph::build(&report.packages);

        let dropped = self.selection.rebase(self.graph.node_names());
        for name in &dropped {
            tracing::warn!("Package {} disappeared, removed from selection", name);
        }
        for cycle in self.graph.cycles() {
            tracing::warn!("Dependency cycle: {}", cycle.join(" -> "));
        }
        for edge in self.graph.unresolved() {
            tracing::debug!("{} depends on {} outside the workspace", edge.package, edge.dependency);
        }

        self.footprints.clear();
        self.events.publish(WorkspaceEvent::Scanned {
            packages: report.packages.len(),
            warnings: report.warnings.clone(),
        });
        self.report = report;
    }

    /// Apply a persisted session. Returns the selected names that no longer
    /// exist in this workspace.
    pub fn restore(&mut self, session: &WorkspaceConfig) -> Vec<String> {
        self.options = session.build_options();
        let pruned = self.selection.restore(&session.selected_packages);
        for name in &pruned {
            tracing::warn!("Ignoring unknown package {} from saved session", name);
        }
        pruned
    }

    /// Snapshot of the state worth persisting
    pub fn session(&self) -> WorkspaceConfig {
        let mut session = WorkspaceConfig {
            workspace_path: Some(self.root.clone()),
            ..WorkspaceConfig::default()
        };
        session.set_selected(self.selection.selected().iter().cloned());
        session.set_build_options(&self.options);
        session
    }

    /// Packages the next build would receive, sorted
    pub fn effective_build_set(&self) -> Vec<String> {
        self.selection
            .effective_build_set(&self.graph, self.options.include_dependencies)
            .into_iter()
            .collect()
    }

    /// Effective build set with dependencies ahead of their dependents
    pub fn build_order(&self) -> Vec<String> {
        self.graph.build_order(self.effective_build_set())
    }

    /// Start a build of the effective build set
    pub fn build(&self) -> BuildResult<RunId> {
        let packages = self.effective_build_set();
        if packages.is_empty() {
            return Err(BuildError::NothingToBuild);
        }
        let request = BuildRequest::new(packages, self.options.clone());
        self.orchestrator.start(request, &self.root)
    }

    /// Cancel the active build, if any
    pub fn cancel(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Wait for the active build to finish
    pub async fn wait(&self) -> Option<RunSummary> {
        self.orchestrator.wait().await
    }

    /// Remove build artifacts. Refused while a build runs.
    pub async fn clean(&self) -> Result<CleanReport, CleanError> {
        let _guard = self.orchestrator.begin_maintenance().map_err(|e| match e {
            BuildError::Busy => CleanError::InProgress,
            _ => CleanError::BuildActive,
        })?;

        let cleaner = WorkspaceCleaner::new(self.config.clean.clone());
        let root = self.root.clone();
        let report = tokio::task::spawn_blocking(move || cleaner.clean(&root))
            .await
            .map_err(|e| CleanError::Task(e.to_string()))?;

        self.events
            .publish(WorkspaceEvent::CleanFinished(report.clone()));
        Ok(report)
    }

    /// Subscribe to this workspace's events
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Size statistics of a package, measured on first use
    pub fn footprint(&mut self, name: &str) -> Option<&PackageFootprint> {
        if !self.footprints.contains_key(name) {
            let path = self.package(name)?.path.clone();
            self.footprints
                .insert(name.to_string(), PackageFootprint::measure(&path));
        }
        self.footprints.get(name)
    }

    /// Size statistics of a package, if already measured
    pub fn cached_footprint(&self, name: &str) -> Option<&PackageFootprint> {
        self.footprints.get(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Packages sorted by manifest path
    pub fn packages(&self) -> &[Package] {
        &self.report.packages
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.report.packages.iter().find(|p| p.name == name)
    }

    pub fn source_root(&self) -> &Path {
        &self.report.source_root
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.report.warnings
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    /// Select `name` and everything it depends on. Returns how many packages
    /// were newly selected.
    pub fn select_with_dependencies(&mut self, name: &str) -> usize {
        self.selection.select_with_dependencies(&self.graph, name)
    }

    /// Deselect `name` and everything that depends on it
    pub fn deselect_with_dependents(&mut self, name: &str) -> usize {
        self.selection.deselect_with_dependents(&self.graph, name)
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut BuildOptions {
        &mut self.options
    }

    pub fn build_state(&self) -> BuildState {
        self.orchestrator.state()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.orchestrator.last_run()
    }
}

/// Resolve a root to an absolute path without `.` or `..` parts
fn absolute_root(root: PathBuf) -> Result<PathBuf, ScanError> {
    root.canonicalize().map_err(|e| {
        tracing::debug!("Cannot resolve {}: {}", root.display(), e);
        ScanError::RootNotFound(root)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunOutcome;
    use crate::services::fake::FakeLauncher;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn add_package(root: &Path, dir: &str, name: &str, deps: &[&str]) {
        let dir = root.join("src").join(dir);
        fs::create_dir_all(&dir).unwrap();
        let deps: String = deps
            .iter()
            .map(|d| format!("  <depend>{}</depend>\n", d))
            .collect();
        fs::write(
            dir.join("package.xml"),
            format!(
                "<?xml version=\"1.0\"?>\n<package format=\"3\">\n  <name>{}</name>\n  <version>0.1.0</version>\n{}</package>\n",
                name, deps
            ),
        )
        .unwrap();
    }

    /// Workspace with A, B (depends on A) and C (depends on B)
    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        add_package(temp.path(), "a", "A", &[]);
        add_package(temp.path(), "b", "B", &["A"]);
        add_package(temp.path(), "c", "C", &["B", "rclcpp"]);
        temp
    }

    fn open(temp: &TempDir, launcher: &Arc<FakeLauncher>) -> Workspace {
        let mut config = AppConfig::default();
        config.logging.run_log_dir = Some(temp.path().join("log/wsman"));
        let launcher: Arc<dyn ProcessLauncher> = launcher.clone();
        Workspace::open(temp.path(), config, launcher).unwrap()
    }

    async fn until_terminal(rx: &mut EventReceiver) -> BuildState {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event bus closed");
            if let WorkspaceEvent::StateChanged { state, .. } = event {
                if state.is_terminal() {
                    return state;
                }
            }
        }
    }

    #[test]
    fn test_effective_build_set_follows_dependencies() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));

        assert_eq!(workspace.packages().len(), 3);
        assert!(workspace.selection_mut().toggle("C"));

        assert_eq!(workspace.effective_build_set(), vec!["C"]);
        workspace.options_mut().include_dependencies = true;
        assert_eq!(workspace.effective_build_set(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_cascading_selection() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));

        assert_eq!(workspace.select_with_dependencies("C"), 3);
        assert_eq!(workspace.deselect_with_dependents("B"), 2);
        assert_eq!(
            workspace.selection().selected().iter().collect::<Vec<_>>(),
            vec!["A"]
        );
    }

    #[test]
    fn test_open_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(FakeLauncher::new());

        let result = Workspace::open(temp.path().join("nope"), AppConfig::default(), launcher);

        assert!(matches!(result, Err(ScanError::RootNotFound(_))));
    }

    #[tokio::test]
    async fn test_build_runs_in_workspace_root() {
        let temp = fixture();
        let launcher = Arc::new(FakeLauncher::new());
        let mut workspace = open(&temp, &launcher);
        let mut rx = workspace.subscribe();
        workspace.selection_mut().toggle("B");
        workspace.options_mut().include_dependencies = true;

        assert_ok!(workspace.build());
        assert!(workspace.build_state().is_running());
        launcher.handle(0).exit(0);

        assert_eq!(until_terminal(&mut rx).await, BuildState::Succeeded);
        let (request, cwd) = launcher.request(0);
        assert_eq!(request.packages, vec!["A", "B"]);
        assert_eq!(cwd, temp.path().canonicalize().unwrap());
        assert_eq!(workspace.last_run().unwrap().outcome, RunOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_build_without_selection() {
        let temp = fixture();
        let launcher = Arc::new(FakeLauncher::new());
        let workspace = open(&temp, &launcher);

        assert!(matches!(workspace.build(), Err(BuildError::NothingToBuild)));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_clean_excludes_build() {
        let temp = fixture();
        fs::create_dir_all(temp.path().join("build/A")).unwrap();
        fs::write(temp.path().join("build/A/CMakeCache.txt"), "x").unwrap();
        fs::write(temp.path().join("build/COLCON_IGNORE"), "").unwrap();

        let launcher = Arc::new(FakeLauncher::new());
        let mut workspace = open(&temp, &launcher);
        let mut rx = workspace.subscribe();
        workspace.selection_mut().toggle("A");

        workspace.build().unwrap();
        assert!(matches!(
            workspace.clean().await,
            Err(CleanError::BuildActive)
        ));
        launcher.handle(0).exit(0);
        until_terminal(&mut rx).await;

        let report = workspace.clean().await.unwrap();
        assert_eq!(report.removed_files, 1);
        assert_eq!(report.removed_dirs, 1);
        assert!(temp.path().join("build/COLCON_IGNORE").exists());
        loop {
            if let WorkspaceEvent::CleanFinished(published) = rx.recv().await.unwrap() {
                assert_eq!(published, report);
                break;
            }
        }
    }

    #[test]
    fn test_session_round_trip() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));

        let session = WorkspaceConfig {
            selected_packages: vec!["A".into(), "C".into(), "gone".into()],
            parallel_workers: 3,
            include_dependencies: true,
            ..WorkspaceConfig::default()
        };
        let pruned = workspace.restore(&session);

        assert_eq!(pruned, vec!["gone"]);
        assert_eq!(workspace.options().parallel_workers, 3);

        let saved = workspace.session();
        assert_eq!(saved.workspace_path, Some(temp.path().canonicalize().unwrap()));
        assert_eq!(saved.selected_packages, vec!["A", "C"]);
        assert!(saved.include_dependencies);
    }

    #[test]
    fn test_rescan_prunes_removed_packages() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));
        let mut rx = workspace.subscribe();
        workspace.selection_mut().select_all();

        fs::remove_dir_all(temp.path().join("src/c")).unwrap();
        let report = workspace.rescan().unwrap();
        assert_eq!(report.packages.len(), 2);

        assert_eq!(workspace.selection().selected_count(), 2);
        assert!(!workspace.graph().has_node("C"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            WorkspaceEvent::Scanned { packages: 2, .. }
        ));
    }

    #[test]
    fn test_set_root_keeps_workspace_on_error() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));

        assert!(matches!(
            workspace.set_root(temp.path().join("missing")),
            Err(WorkspaceError::Scan(ScanError::RootNotFound(_)))
        ));
        assert_eq!(workspace.root(), temp.path().canonicalize().unwrap());
        assert_eq!(workspace.packages().len(), 3);

        let other = TempDir::new().unwrap();
        add_package(other.path(), "x", "X", &[]);
        workspace.set_root(other.path()).unwrap();
        assert_eq!(workspace.graph().node_names(), ["X".to_string()]);
    }

    /// `path` spelled relative to the current directory
    #[cfg(unix)]
    fn relative_to_cwd(path: &Path) -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        let mut relative = PathBuf::from(".");
        for _ in cwd.components().skip(1) {
            relative.push("..");
        }
        relative.push(path.strip_prefix("/").unwrap());
        relative
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_root_is_stored_absolute() {
        let temp = fixture();
        let target = temp.path().canonicalize().unwrap();
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(FakeLauncher::new());

        let relative = relative_to_cwd(&target).join("src/..");
        let mut workspace = Workspace::open(&relative, AppConfig::default(), launcher).unwrap();

        assert_eq!(workspace.root(), target);
        assert_eq!(workspace.session().workspace_path, Some(target));

        let other = TempDir::new().unwrap();
        add_package(other.path(), "x", "X", &[]);
        let other_target = other.path().canonicalize().unwrap();
        workspace.set_root(relative_to_cwd(&other_target)).unwrap();

        let saved = workspace.session().workspace_path.unwrap();
        assert!(saved.is_absolute());
        assert_eq!(saved, other_target);
    }

    #[tokio::test]
    async fn test_set_root_refused_while_building() {
        let temp = fixture();
        let launcher = Arc::new(FakeLauncher::new());
        let mut workspace = open(&temp, &launcher);
        let mut rx = workspace.subscribe();
        workspace.selection_mut().toggle("A");
        workspace.build().unwrap();

        let other = TempDir::new().unwrap();
        add_package(other.path(), "x", "X", &[]);
        assert!(matches!(
            workspace.set_root(other.path()),
            Err(WorkspaceError::BuildActive)
        ));
        assert_eq!(workspace.root(), temp.path().canonicalize().unwrap());
        assert!(workspace.graph().has_node("A"));

        launcher.handle(0).exit(0);
        until_terminal(&mut rx).await;
        assert_ok!(workspace.set_root(other.path()));
        assert_eq!(workspace.graph().node_names(), ["X".to_string()]);
    }

    #[test]
    fn test_build_order_puts_dependencies_first() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));
        workspace.selection_mut().toggle("C");
        workspace.selection_mut().toggle("A");

        assert_eq!(workspace.build_order(), vec!["A", "C"]);
        workspace.options_mut().include_dependencies = true;
        assert_eq!(workspace.build_order(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_footprint_is_cached() {
        let temp = fixture();
        let mut workspace = open(&temp, &Arc::new(FakeLauncher::new()));

        assert!(workspace.cached_footprint("A").is_none());
        let footprint = workspace.footprint("A").unwrap().clone();
        assert_eq!(footprint.regular_files, 1);
        assert_eq!(workspace.cached_footprint("A"), Some(&footprint));
        assert!(workspace.footprint("missing").is_none());
    }
}
