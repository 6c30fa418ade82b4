//! Yes/No confirmation dialog.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

pub struct ConfirmDialog<'a> {
    title: &'a str,
    message: &'a str,
    /// Whether "Yes" is selected (vs "No")
    yes_selected: bool,
}

impl<'a> ConfirmDialog<'a> {
    pub fn new(title: &'a str, message: &'a str) -> Self {
        Self {
            title,
            message,
            yes_selected: false,
        }
    }

    pub fn yes_selected(mut self, selected: bool) -> Self {
        self.yes_selected = selected;
        self
    }
}

impl Widget for ConfirmDialog<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(format!(" {} ", self.title));
        let inner = block.inner(area);
        block.render(area, buf);

        let message_area = Rect {
            x: inner.x + 1,
            y: inner.y + 1,
            width: inner.width.saturating_sub(2),
            height: inner.height.saturating_sub(4),
        };
        Paragraph::new(self.message)
            .wrap(Wrap { trim: true })
            .render(message_area, buf);

        let buttons_y = inner.y + inner.height.saturating_sub(2);
        let button_width = 10u16;
        let start_x = inner.x + inner.width.saturating_sub(button_width * 2 + 4) / 2;

        let (yes_text, yes_style) = if self.yes_selected {
            (
                "[ Yes ]",
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            ("  Yes  ", Style::default().fg(Color::White))
        };
        buf.set_string(start_x, buttons_y, yes_text, yes_style);

        let (no_text, no_style) = if self.yes_selected {
            ("   No   ", Style::default().fg(Color::White))
        } else {
            (
                "[  No  ]",
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
        };
        buf.set_string(start_x + button_width + 2, buttons_y, no_text, no_style);
    }
}

/// Answer state of an open confirmation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmState {
    pub yes_selected: bool,
}

impl ConfirmState {
    pub fn select_yes(&mut self) {
        self.yes_selected = true;
    }

    pub fn toggle(&mut self) {
        self.yes_selected = !self.yes_selected;
    }
}
