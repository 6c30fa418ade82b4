//! Text input widget for single-line text entry.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear},
};

/// Single-line text input widget; always drawn with the cursor visible
pub struct TextInputWidget<'a> {
    value: &'a str,
    /// Cursor position (character index)
    cursor: usize,
    /// Shown dimmed while the value is empty
    placeholder: &'a str,
    title: &'a str,
}

impl<'a> TextInputWidget<'a> {
    pub fn new(value: &'a str, cursor: usize) -> Self {
        Self {
            value,
            cursor,
            placeholder: "",
            title: "Input",
        }
    }

    pub fn placeholder(mut self, placeholder: &'a str) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn title(mut self, title: &'a str) -> Self {
        self.title = title;
        self
    }
}

impl Widget for TextInputWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ", self.title));

        let inner = block.inner(area);
        block.render(area, buf);

        let cursor_style = Style::default().fg(Color::Black).bg(Color::White);

        if self.value.is_empty() {
            buf.set_string(inner.x, inner.y, " ", cursor_style);
            buf.set_string(
                inner.x + 1,
                inner.y,
                self.placeholder,
                Style::default().fg(Color::DarkGray),
            );
            return;
        }

        let before: String = self.value.chars().take(self.cursor).collect();
        let under: String = self.value.chars().skip(self.cursor).take(1).collect();
        let after: String = self.value.chars().skip(self.cursor + 1).collect();

        let mut x = inner.x;
        buf.set_string(x, inner.y, &before, Style::default());
        x += before.chars().count() as u16;

        let under = if under.is_empty() { " " } else { under.as_str() };
        buf.set_string(x, inner.y, under, cursor_style);
        x += 1;

        buf.set_string(x, inner.y, &after, Style::default());
    }
}

/// State for text input
#[derive(Debug, Default, Clone)]
pub struct TextInputState {
    pub value: String,
    /// Cursor position (character index)
    pub cursor: usize,
}

impl TextInputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: String) -> Self {
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    fn byte_offset(&self, cursor: usize) -> usize {
        self.value
            .char_indices()
            .nth(cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }

    fn char_len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> TextInputAction {
        match key.code {
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return TextInputAction::None;
                }
                let at = self.byte_offset(self.cursor);
                self.value.insert(at, c);
                self.cursor += 1;
                TextInputAction::Changed
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_offset(self.cursor);
                    self.value.remove(at);
                    TextInputAction::Changed
                } else {
                    TextInputAction::None
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.char_len() {
                    let at = self.byte_offset(self.cursor);
                    self.value.remove(at);
                    TextInputAction::Changed
                } else {
                    TextInputAction::None
                }
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                TextInputAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.char_len() {
                    self.cursor += 1;
                }
                TextInputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                TextInputAction::None
            }
            KeyCode::End => {
                self.cursor = self.char_len();
                TextInputAction::None
            }
            KeyCode::Enter => TextInputAction::Submit,
            KeyCode::Esc => TextInputAction::Cancel,
            _ => TextInputAction::None,
        }
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Actions that can result from text input handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInputAction {
    /// No action
    None,
    /// Value changed
    Changed,
    /// User submitted (Enter)
    Submit,
    /// User cancelled (Esc)
    Cancel,
}

/// Dialog asking for a new workspace root
pub struct PathDialog<'a> {
    input: &'a TextInputState,
    error: Option<&'a str>,
}

impl<'a> PathDialog<'a> {
    pub fn new(input: &'a TextInputState) -> Self {
        Self { input, error: None }
    }

    pub fn error(mut self, error: Option<&'a str>) -> Self {
        self.error = error;
        self
    }
}

impl Widget for PathDialog<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Open Workspace ");
        let inner = block.inner(area);
        block.render(area, buf);

        buf.set_string(
            inner.x + 1,
            inner.y + 1,
            "Workspace root (the directory holding src/):",
            Style::default().fg(Color::White),
        );

        let input_area = Rect {
            x: inner.x + 1,
            y: inner.y + 3,
            width: inner.width.saturating_sub(2),
            height: 3,
        };
        TextInputWidget::new(&self.input.value, self.input.cursor)
            .title("Path")
            .placeholder("~/ros2_ws")
            .render(input_area, buf);

        if let Some(error) = self.error {
            buf.set_string(inner.x + 1, inner.y + 7, error, Style::default().fg(Color::Red));
        }

        let help_y = inner.y + inner.height.saturating_sub(2);
        buf.set_string(
            inner.x + 1,
            help_y,
            "Enter: Open | Esc: Cancel",
            Style::default().fg(Color::DarkGray),
        );
    }
}
