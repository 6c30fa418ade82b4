//! wsman: terminal workspace manager
//!
//! A keyboard-driven TUI for selecting, building and cleaning the packages
//! of a colcon-style source workspace.

use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wsman::domain::WorkspaceConfig;
use wsman::services::{CommandLauncher, ConfigStore, ProcessLauncher};
use wsman::{App, AppConfig, Workspace};

const USAGE: &str = "Usage: wsman [WORKSPACE]\n\n\
Opens WORKSPACE (default: the last opened workspace, else the current directory).";

/// Setup the terminal for TUI mode
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to normal mode
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Initialize logging with RUST_LOG environment variable support
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Install a panic hook that restores the terminal before printing the panic
fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));
}

/// Settings for `root`; broken settings fall back to the defaults
fn load_config(root: &Path) -> AppConfig {
    match AppConfig::load(Some(root)).and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default settings: {}", e);
            AppConfig::default()
        }
    }
}

/// Workspace root: command line, then the saved session, then the current directory
fn workspace_root(arg: Option<String>, session: &WorkspaceConfig) -> PathBuf {
    arg.map(PathBuf::from)
        .or_else(|| session.workspace_path.clone())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let arg = std::env::args().nth(1);
    if matches!(arg.as_deref(), Some("-h") | Some("--help")) {
        println!("{}", USAGE);
        return Ok(());
    }

    init_logging();
    install_panic_hook();

    let store = ConfigStore::default_location();
    if store.is_none() {
        tracing::warn!("No data directory available, the session will not be saved");
    }
    let session = store.as_ref().map(ConfigStore::load).unwrap_or_default();

    let root = workspace_root(arg, &session);
    let config = load_config(&root);
    let launcher: Arc<dyn ProcessLauncher> =
        Arc::new(CommandLauncher::new(config.build.command.clone()));

    tracing::info!("Starting wsman in {:?}", root);
    let mut workspace = Workspace::open(&root, config, launcher)
        .with_context(|| format!("Cannot open workspace {}", root.display()))?;

    // The saved selection only applies to the workspace it was made in
    if session.workspace_path.as_deref() == Some(workspace.root()) {
        workspace.restore(&session);
    } else {
        *workspace.options_mut() = session.build_options();
    }

    let mut terminal = setup_terminal()?;

    let mut app = App::new(workspace, store);
    let finished = tokio::select! {
        res = app.run(&mut terminal) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(res) => res,
        None => {
            tracing::info!("Received Ctrl+C, shutting down gracefully");
            app.shutdown().await;
            Ok(())
        }
    };

    // Restore terminal (always, even on error)
    restore_terminal(&mut terminal)?;

    result?;

    Ok(())
}
