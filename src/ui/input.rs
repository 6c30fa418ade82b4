//! Keyboard input handling with vim-style navigation support.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Standard navigation mode
    #[default]
    Normal,
    /// Text entry (filter, workspace path); keys go to the text field
    Insert,
}

/// Actions that can be triggered by keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // Navigation
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    Home,
    End,

    // Selection
    Toggle,
    SelectWithDependencies,
    DeselectWithDependents,
    SelectAll,
    SelectNone,
    InvertSelection,
    Filter,

    // Build
    Build,
    Cancel,
    Clean,
    CycleBuildType,
    ToggleSymlinkInstall,
    ToggleIncludeDependencies,
    MoreWorkers,
    FewerWorkers,

    // Views
    ShowOutput,
    Details,
    OpenWorkspace,
    Help,
    Back,

    // Misc
    Rescan,
    Save,
    Quit,
}

/// Keyboard bindings configuration
pub struct KeyBindings {
    pub vim_navigation: bool,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            vim_navigation: true,
        }
    }
}

/// Input handler for processing keyboard events
pub struct InputHandler {
    bindings: KeyBindings,
}

impl InputHandler {
    /// Create a new input handler
    pub fn new(vim_navigation: bool) -> Self {
        Self {
            bindings: KeyBindings { vim_navigation },
        }
    }

    /// Handle a key event and return the corresponding action
    pub fn handle_key(&self, key: KeyEvent, mode: InputMode) -> Option<Action> {
        match mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Insert => self.handle_insert_key(key),
        }
    }

    /// Handle key in normal mode
    fn handle_normal_key(&self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Action::Cancel),
                KeyCode::Char('s') => Some(Action::Save),
                _ => None,
            };
        }

        match key.code {
            // Navigation - arrow keys always work
            KeyCode::Up => Some(Action::MoveUp),
            KeyCode::Down => Some(Action::MoveDown),
            KeyCode::PageUp => Some(Action::PageUp),
            KeyCode::PageDown => Some(Action::PageDown),
            KeyCode::Home => Some(Action::Home),
            KeyCode::End => Some(Action::End),

            // Vim-style navigation
            KeyCode::Char('j') if self.bindings.vim_navigation => Some(Action::MoveDown),
            KeyCode::Char('k') if self.bindings.vim_navigation => Some(Action::MoveUp),
            KeyCode::Char('g') if self.bindings.vim_navigation => Some(Action::Home),
            KeyCode::Char('G') if self.bindings.vim_navigation => Some(Action::End),

            // Selection
            KeyCode::Char(' ') => Some(Action::Toggle),
            KeyCode::Char('d') => Some(Action::SelectWithDependencies),
            KeyCode::Char('D') => Some(Action::DeselectWithDependents),
            KeyCode::Char('a') => Some(Action::SelectAll),
            KeyCode::Char('n') => Some(Action::SelectNone),
            KeyCode::Char('i') => Some(Action::InvertSelection),
            KeyCode::Char('/') => Some(Action::Filter),

            // Build
            KeyCode::Char('b') => Some(Action::Build),
            KeyCode::Char('c') => Some(Action::Cancel),
            KeyCode::Char('C') => Some(Action::Clean),
            KeyCode::Char('t') => Some(Action::CycleBuildType),
            KeyCode::Char('s') => Some(Action::ToggleSymlinkInstall),
            KeyCode::Char('p') => Some(Action::ToggleIncludeDependencies),
            KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::MoreWorkers),
            KeyCode::Char('-') => Some(Action::FewerWorkers),

            // Views
            KeyCode::Char('o') => Some(Action::ShowOutput),
            KeyCode::Enter => Some(Action::Details),
            KeyCode::Char('w') => Some(Action::OpenWorkspace),
            KeyCode::Char('?') => Some(Action::Help),
            KeyCode::Esc => Some(Action::Back),

            // Misc
            KeyCode::F(5) => Some(Action::Rescan),
            KeyCode::Char('q') => Some(Action::Quit),

            _ => None,
        }
    }

    /// Handle key in insert mode
    fn handle_insert_key(&self, key: KeyEvent) -> Option<Action> {
        // Ctrl+C leaves the text field like Esc does
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Back);
        }

        // Other keys are handled by the text input widget
        None
    }
}
