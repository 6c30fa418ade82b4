//! Application state and main event loop.

use crate::domain::BuildState;
use crate::error::{AppError, CleanError, Result};
use crate::services::{ConfigStore, EventReceiver, WorkspaceEvent};
use crate::ui::input::{Action, InputHandler, InputMode};
use crate::ui::widgets::confirm::ConfirmState;
use crate::ui::widgets::dependency_panel::Neighbourhood;
use crate::ui::widgets::help::HelpViewState;
use crate::ui::widgets::output_panel::OutputBuffer;
use crate::ui::widgets::package_list::PackageRow;
use crate::ui::widgets::text_input::{TextInputAction, TextInputState};
use crate::workspace::Workspace;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Rows taken by header, footer and borders around the main panels
const CHROME_HEIGHT: usize = 8;

/// Application view state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppView {
    /// Package list with dependency panel
    #[default]
    Overview,
    /// Streaming build output
    Output,
    /// Help view showing keybindings
    Help,
    /// Details popup for one package
    PackageDetail(String),
    /// Clean confirmation dialog
    ConfirmClean,
    /// Workspace path dialog
    OpenWorkspace,
}

/// Main application state
pub struct App {
    /// The workspace being managed
    pub workspace: Workspace,
    store: Option<ConfigStore>,
    events: EventReceiver,

    // UI State
    /// Current view
    pub view: AppView,
    /// Index of the highlighted row among the visible packages
    pub highlighted: usize,
    /// Current input mode
    pub input_mode: InputMode,
    /// Filter text being edited
    pub filter_input: TextInputState,
    /// Workspace path being edited
    pub path_input: TextInputState,
    /// Why the last workspace path was rejected
    pub path_error: Option<String>,
    /// Answer of the clean confirmation
    pub confirm: ConfirmState,
    /// Output of the current or last build
    pub output_buffer: OutputBuffer,
    /// State for help view (scroll position)
    pub help_view_state: HelpViewState,
    /// Terminal height at the last draw
    pub viewport_height: usize,

    /// Error message to display
    pub error_message: Option<String>,
    /// Non-blocking status line
    pub status_message: Option<String>,

    input_handler: InputHandler,
    /// `q` was pressed once while a build was running
    quit_armed: bool,
    /// Clean confirmed, to be started by the event loop
    clean_requested: bool,

    /// Should quit the application
    pub should_quit: bool,
}

impl App {
    /// Create the application around an opened workspace.
    ///
    /// Without a store the session is not persisted.
    pub fn new(workspace: Workspace, store: Option<ConfigStore>) -> Self {
        let events = workspace.subscribe();
        let input_handler = InputHandler::new(workspace.config().ui.vim_navigation);
        Self {
            workspace,
            store,
            events,
            view: AppView::Overview,
            highlighted: 0,
            input_mode: InputMode::Normal,
            filter_input: TextInputState::new(),
            path_input: TextInputState::new(),
            path_error: None,
            confirm: ConfirmState::default(),
            output_buffer: OutputBuffer::new(),
            help_view_state: HelpViewState::default(),
            viewport_height: 24,
            error_message: None,
            status_message: None,
            input_handler,
            quit_armed: false,
            clean_requested: false,
            should_quit: false,
        }
    }

    /// Visible package names, sorted
    pub fn visible_packages(&self) -> Vec<&str> {
        self.workspace.selection().visible().collect()
    }

    /// Name of the highlighted package
    pub fn highlighted_package(&self) -> Option<String> {
        self.visible_packages()
            .get(self.highlighted)
            .map(|name| name.to_string())
    }

    /// Rows of the package list
    pub fn package_rows(&self) -> Vec<PackageRow<'_>> {
        let effective: BTreeSet<String> = self.workspace.effective_build_set().into_iter().collect();
        let selection = self.workspace.selection();

        self.visible_packages()
            .into_iter()
            .map(|name| {
                let package = self.workspace.package(name);
                PackageRow {
                    name,
                    selected: selection.is_selected(name),
                    pulled_in: effective.contains(name),
                    version: package.and_then(|p| p.version.as_deref()),
                    build_type: package.and_then(|p| p.build_type.as_deref()),
                    size: self
                        .workspace
                        .cached_footprint(name)
                        .map(|f| f.total_size),
                }
            })
            .collect()
    }

    /// Dependency neighbourhood of the highlighted package
    pub fn neighbourhood(&self) -> Option<Neighbourhood> {
        let name = self.highlighted_package()?;
        Neighbourhood::of(self.workspace.graph(), &name)
    }

    /// Whether a build is running
    pub fn is_building(&self) -> bool {
        self.workspace.build_state().is_running()
    }

    fn list_page(&self) -> usize {
        self.viewport_height.saturating_sub(CHROME_HEIGHT).max(1)
    }

    /// Move selection up
    pub fn select_previous(&mut self) {
        self.highlighted = self.highlighted.saturating_sub(1);
    }

    /// Move selection down
    pub fn select_next(&mut self) {
        if self.highlighted + 1 < self.visible_packages().len() {
            self.highlighted += 1;
        }
    }

    /// Keep the highlight inside the visible list
    fn clamp_highlight(&mut self) {
        let visible = self.visible_packages().len();
        self.highlighted = self.highlighted.min(visible.saturating_sub(1));
    }

    /// Apply every pending workspace event
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: WorkspaceEvent) {
        match event {
            WorkspaceEvent::Log { run, line } => self.output_buffer.push(run, line),
            WorkspaceEvent::StateChanged { run, state } if state.is_running() => {
                self.output_buffer.start(run);
                self.output_buffer
                    .note(format!("--- Build order: {} ---", self.workspace.build_order().join(" -> ")));
                self.status_message = Some(format!("Build {} started", run));
            }
            WorkspaceEvent::StateChanged { run, state } => {
                let message = format!("Build {} {}", run, state);
                self.output_buffer.note(format!("--- {} ---", message));
                self.status_message = Some(message);
                self.quit_armed = false;
                if state == BuildState::Succeeded {
                    self.save_session();
                }
            }
            WorkspaceEvent::CleanFinished(report) => {
                if report.is_success() {
                    self.status_message = Some(format!("Clean {}", report));
                } else {
                    let first = report
                        .failures
                        .first()
                        .map(|f| f.to_string())
                        .unwrap_or_default();
                    self.error_message = Some(format!("Clean {}\n\n{}", report, first));
                }
            }
            WorkspaceEvent::Scanned { packages, warnings } => {
                self.clamp_highlight();
                self.status_message = Some(if warnings.is_empty() {
                    format!(
                        "Found {} packages, {} dependencies",
                        packages,
                        self.workspace.graph().edge_count()
                    )
                } else {
                    format!(
                        "Found {} packages, {} dependencies ({} warnings)",
                        packages,
                        self.workspace.graph().edge_count(),
                        warnings.len()
                    )
                });
            }
        }
    }

    /// Persist the session, reporting failures to the operator
    pub fn save_session(&mut self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.save(&self.workspace.session()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save session: {}", e);
                self.error_message = Some(e.to_string());
                false
            }
        }
    }

    /// Build the effective build set
    pub fn start_build(&mut self) {
        self.save_session();
        match self.workspace.build() {
            Ok(run) => {
                tracing::debug!("Started build {}", run);
                self.view = AppView::Output;
            }
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    /// Cancel the running build
    pub fn cancel_build(&mut self) {
        if self.workspace.cancel() {
            self.status_message = Some("Cancelling build...".to_string());
        }
    }

    /// Ask for confirmation before cleaning
    pub fn request_clean(&mut self) {
        if self.is_building() {
            self.error_message = Some(CleanError::BuildActive.to_string());
            return;
        }
        self.confirm = ConfirmState::default();
        self.view = AppView::ConfirmClean;
    }

    /// Run a confirmed clean
    pub async fn run_clean(&mut self) {
        self.clean_requested = false;
        match self.workspace.clean().await {
            // Reported through CleanFinished
            Ok(_) => self.drain_events(),
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    /// Scan the workspace again
    pub fn rescan(&mut self) {
        if let Err(e) = self.workspace.rescan() {
            self.error_message = Some(e.to_string());
        }
    }

    /// Switch to the workspace typed in the path dialog
    pub fn open_workspace(&mut self) {
        let path = expand_home(self.path_input.value().trim());
        match self.workspace.set_root(path) {
            Ok(()) => {
                self.save_session();
                self.highlighted = 0;
                self.path_error = None;
                self.path_input.clear();
                self.input_mode = InputMode::Normal;
                self.view = AppView::Overview;
            }
            Err(e) => self.path_error = Some(e.to_string()),
        }
    }

    fn open_path_dialog(&mut self) {
        self.path_input = TextInputState::with_value(self.workspace.root().display().to_string());
        self.path_error = None;
        self.input_mode = InputMode::Insert;
        self.view = AppView::OpenWorkspace;
    }

    fn open_details(&mut self) {
        if let Some(name) = self.highlighted_package() {
            self.workspace.footprint(&name);
            self.view = AppView::PackageDetail(name);
        }
    }

    /// Measure the highlighted package, once
    fn measure_highlighted(&mut self) {
        if let Some(name) = self.highlighted_package() {
            if self.workspace.cached_footprint(&name).is_none() {
                self.workspace.footprint(&name);
            }
        }
    }

    /// Quit, or arm quitting while a build runs. Returns true to quit.
    fn request_quit(&mut self) -> bool {
        if !self.is_building() {
            return true;
        }
        if self.quit_armed {
            self.workspace.cancel();
            return true;
        }
        self.quit_armed = true;
        self.status_message =
            Some("A build is running: press q again to cancel it and quit".to_string());
        false
    }

    /// Handle keyboard input and return true if should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        // Clear messages on any key press
        self.error_message = None;
        self.status_message = None;

        match &self.view {
            AppView::Overview if self.input_mode == InputMode::Insert => {
                self.handle_filter_key(key);
                false
            }
            AppView::Overview => self.handle_overview_key(key),
            AppView::Output => self.handle_output_key(key),
            AppView::Help => {
                self.handle_help_key(key);
                false
            }
            AppView::PackageDetail(_) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                    self.view = AppView::Overview;
                }
                false
            }
            AppView::ConfirmClean => {
                self.handle_confirm_key(key);
                false
            }
            AppView::OpenWorkspace => {
                self.handle_path_key(key);
                false
            }
        }
    }

    fn handle_overview_key(&mut self, key: KeyEvent) -> bool {
        let Some(action) = self.input_handler.handle_key(key, self.input_mode) else {
            return false;
        };
        if action != Action::Quit {
            self.quit_armed = false;
        }

        match action {
            Action::MoveUp => self.select_previous(),
            Action::MoveDown => self.select_next(),
            Action::PageUp => {
                self.highlighted = self.highlighted.saturating_sub(self.list_page());
            }
            Action::PageDown => {
                self.highlighted += self.list_page();
                self.clamp_highlight();
            }
            Action::Home => self.highlighted = 0,
            Action::End => {
                self.highlighted = usize::MAX;
                self.clamp_highlight();
            }
            Action::Toggle => {
                if let Some(name) = self.highlighted_package() {
                    self.workspace.selection_mut().toggle(&name);
                }
            }
            Action::SelectWithDependencies => {
                if let Some(name) = self.highlighted_package() {
                    let added = self.workspace.select_with_dependencies(&name);
                    self.status_message = Some(format!("Selected {} packages", added));
                }
            }
            Action::DeselectWithDependents => {
                if let Some(name) = self.highlighted_package() {
                    let removed = self.workspace.deselect_with_dependents(&name);
                    self.status_message = Some(format!("Deselected {} packages", removed));
                }
            }
            Action::SelectAll => self.workspace.selection_mut().select_all(),
            Action::SelectNone => self.workspace.selection_mut().select_none(),
            Action::InvertSelection => self.workspace.selection_mut().invert(),
            Action::Filter => {
                let current = self.workspace.selection().filter().to_string();
                self.filter_input = TextInputState::with_value(current);
                self.input_mode = InputMode::Insert;
            }
            Action::Build => self.start_build(),
            Action::Cancel => self.cancel_build(),
            Action::Clean => self.request_clean(),
            Action::CycleBuildType => {
                let options = self.workspace.options_mut();
                options.build_type = options.build_type.cycle();
            }
            Action::ToggleSymlinkInstall => {
                let options = self.workspace.options_mut();
                options.symlink_install = !options.symlink_install;
            }
            Action::ToggleIncludeDependencies => {
                let options = self.workspace.options_mut();
                options.include_dependencies = !options.include_dependencies;
            }
            Action::MoreWorkers => self.workspace.options_mut().adjust_workers(1),
            Action::FewerWorkers => self.workspace.options_mut().adjust_workers(-1),
            Action::ShowOutput => self.view = AppView::Output,
            Action::Details => self.open_details(),
            Action::OpenWorkspace => self.open_path_dialog(),
            Action::Help => {
                self.help_view_state = HelpViewState::open(self.viewport_height.saturating_sub(2));
                self.view = AppView::Help;
            }
            Action::Back => {
                if !self.workspace.selection().filter().is_empty() {
                    self.workspace.selection_mut().set_filter("");
                    self.clamp_highlight();
                }
            }
            Action::Rescan => self.rescan(),
            Action::Save => {
                if self.save_session() {
                    self.status_message = Some("Session saved".to_string());
                }
            }
            Action::Quit => return self.request_quit(),
        }
        false
    }

    /// Handle keys while editing the filter
    fn handle_filter_key(&mut self, key: KeyEvent) {
        if self.input_handler.handle_key(key, InputMode::Insert) == Some(Action::Back) {
            self.filter_input.clear();
            self.workspace.selection_mut().set_filter("");
            self.input_mode = InputMode::Normal;
            return;
        }

        match self.filter_input.handle_key(key) {
            TextInputAction::Changed => {
                let text = self.filter_input.value().to_string();
                self.workspace.selection_mut().set_filter(&text);
                self.clamp_highlight();
            }
            TextInputAction::Submit => self.input_mode = InputMode::Normal,
            TextInputAction::Cancel => {
                self.filter_input.clear();
                self.workspace.selection_mut().set_filter("");
                self.clamp_highlight();
                self.input_mode = InputMode::Normal;
            }
            TextInputAction::None => {}
        }
    }

    /// Handle keys in the build output view
    fn handle_output_key(&mut self, key: KeyEvent) -> bool {
        let visible = self.viewport_height.saturating_sub(CHROME_HEIGHT).max(1);
        match self.input_handler.handle_key(key, InputMode::Normal) {
            Some(Action::Back) | Some(Action::ShowOutput) => self.view = AppView::Overview,
            Some(Action::Cancel) => self.cancel_build(),
            Some(Action::Quit) => return self.request_quit(),
            Some(Action::MoveUp) => self.output_buffer.scroll_up(1, visible),
            Some(Action::MoveDown) => self.output_buffer.scroll_down(1, visible),
            Some(Action::PageUp) => self.output_buffer.scroll_up(visible, visible),
            Some(Action::PageDown) => self.output_buffer.scroll_down(visible, visible),
            Some(Action::Home) => self.output_buffer.scroll_to_top(),
            Some(Action::End) => self.output_buffer.scroll_to_bottom(),
            Some(Action::Build) => self.start_build(),
            _ => {}
        }
        false
    }

    /// Handle keys in help view
    fn handle_help_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                self.view = AppView::Overview;
            }
            KeyCode::Up | KeyCode::Char('k') => self.help_view_state.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.help_view_state.scroll_down(1),
            KeyCode::PageUp => self.help_view_state.page_up(),
            KeyCode::PageDown => self.help_view_state.page_down(),
            _ => {}
        }
    }

    /// Handle keys in the clean confirmation
    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
                self.confirm.toggle();
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.confirm.select_yes();
                self.confirm_clean();
            }
            KeyCode::Enter => self.confirm_clean(),
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Char('q') => {
                self.view = AppView::Overview;
            }
            _ => {}
        }
    }

    fn confirm_clean(&mut self) {
        self.view = AppView::Overview;
        if self.confirm.yes_selected {
            self.clean_requested = true;
            self.status_message = Some("Cleaning build and install...".to_string());
        }
    }

    /// Handle keys in the workspace path dialog
    fn handle_path_key(&mut self, key: KeyEvent) {
        match self.path_input.handle_key(key) {
            TextInputAction::Submit => self.open_workspace(),
            TextInputAction::Cancel => {
                self.input_mode = InputMode::Normal;
                self.view = AppView::Overview;
            }
            TextInputAction::Changed => self.path_error = None,
            TextInputAction::None => {}
        }
    }

    /// Stop a running build and persist the session
    pub async fn shutdown(&mut self) {
        if self.is_building() {
            self.workspace.cancel();
            tracing::info!("Waiting for the cancelled build to exit");
            self.workspace.wait().await;
        }
        self.save_session();
    }

    /// Main event loop
    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let tick_rate = Duration::from_millis(self.workspace.config().ui.refresh_rate_ms);

        loop {
            self.drain_events();
            self.measure_highlighted();

            terminal.draw(|f| {
                self.viewport_height = f.area().height as usize;
                crate::ui::layout::draw(f, self);
            })?;

            // Start the clean after the status line went out
            if self.clean_requested {
                self.run_clean().await;
                continue;
            }

            // Poll faster while output is streaming
            let timeout = if self.is_building() {
                Duration::from_millis(50)
            } else {
                tick_rate
            };

            if event::poll(timeout).map_err(|e| AppError::Terminal(e.to_string()))? {
                match event::read().map_err(|e| AppError::Terminal(e.to_string()))? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            self.should_quit = true;
                        }
                    }
                    Event::Resize(width, height) => {
                        tracing::debug!("Terminal resized to {}x{}", width, height);
                    }
                    _ => {}
                }
            }

            if self.should_quit {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    let home = || directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
