//! Key reference shown by `?`.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};

/// Key bindings grouped by what they act on
const KEY_GROUPS: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("↑/k ↓/j", "Move highlight"),
            ("g/Home G/End", "First / last package"),
            ("PgUp PgDn", "Move by a page"),
            ("Enter", "Package details"),
            ("o", "Build output"),
        ],
    ),
    (
        "Selection",
        &[
            ("Space", "Toggle package"),
            ("d", "Select with dependencies"),
            ("D", "Deselect with dependents"),
            ("a / n / i", "All / none / invert (visible only)"),
            ("/", "Filter by name, Esc clears"),
        ],
    ),
    (
        "Build",
        &[
            ("b", "Build the selection"),
            ("c, Ctrl+C", "Cancel the running build"),
            ("t", "Cycle build type"),
            ("s", "Toggle symlink install"),
            ("p", "Also build dependencies"),
            ("+ / -", "More / fewer workers"),
        ],
    ),
    (
        "Workspace",
        &[
            ("C", "Clean build and install"),
            ("w", "Open another workspace"),
            ("F5", "Re-scan packages"),
            ("Ctrl+S", "Save session"),
            ("?", "This help"),
            ("q", "Quit (twice while building)"),
        ],
    ),
];

/// Width of the key column
const KEY_WIDTH: usize = 16;

/// Scroll position of the help view
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HelpViewState {
    pub offset: usize,
    /// Rows of the viewport the text is shown in
    page: usize,
}

impl HelpViewState {
    /// State for a help view showing `page` rows at a time
    pub fn open(page: usize) -> Self {
        Self {
            offset: 0,
            page: page.max(1),
        }
    }

    fn max_offset(&self) -> usize {
        help_lines().len().saturating_sub(self.page)
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.offset = self.offset.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.max_offset());
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.page.saturating_sub(1).max(1));
    }

    pub fn page_down(&mut self) {
        self.scroll_down(self.page.saturating_sub(1).max(1));
    }
}

fn help_lines() -> Vec<Line<'static>> {
    let heading = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let key = Style::default().fg(Color::Green);

    let mut lines = vec![
        Line::from(Span::styled(
            "Select, build and clean the packages of a source workspace.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];
    for (group, bindings) in KEY_GROUPS {
        lines.push(Line::from(Span::styled(*group, heading)));
        lines.extend(bindings.iter().map(|(keys, action)| {
            Line::from(vec![
                Span::styled(format!("  {:<width$}", keys, width = KEY_WIDTH), key),
                Span::raw(*action),
            ])
        }));
        lines.push(Line::from(""));
    }
    lines
}

/// Help popup scrolled to a fixed offset
pub struct HelpWidget {
    offset: usize,
}

impl HelpWidget {
    pub fn new(state: &HelpViewState) -> Self {
        Self {
            offset: state.offset,
        }
    }
}

impl Widget for HelpWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);

        let lines = help_lines();
        let total = lines.len();
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" wsman keys ")
            .title_bottom(Line::from(" Esc/q/? close ").right_aligned());
        let inner = block.inner(area);

        Paragraph::new(lines)
            .block(block)
            .scroll((self.offset.min(u16::MAX as usize) as u16, 0))
            .render(area, buf);

        if total > inner.height as usize {
            let mut scrollbar = ScrollbarState::new(total.saturating_sub(inner.height as usize))
                .position(self.offset);
            Scrollbar::new(ScrollbarOrientation::VerticalRight).render(
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                buf,
                &mut scrollbar,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    #[test]
    fn test_scroll_stays_in_range() {
        let mut state = HelpViewState::open(10);
        let max = help_lines().len() - 10;

        state.scroll_down(3);
        assert_eq!(state.offset, 3);
        state.scroll_up(10);
        assert_eq!(state.offset, 0);

        state.scroll_down(1000);
        assert_eq!(state.offset, max);
        state.page_up();
        assert_eq!(state.offset, max - 9);
    }

    #[test]
    fn test_tall_viewport_never_scrolls() {
        let mut state = HelpViewState::open(500);
        state.page_down();
        assert_eq!(state.offset, 0);
    }

    #[test]
    fn test_render_lists_every_group() {
        let mut terminal = Terminal::new(TestBackend::new(60, 50)).unwrap();
        terminal
            .draw(|f| f.render_widget(HelpWidget::new(&HelpViewState::open(48)), f.area()))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n");

        for (group, _) in KEY_GROUPS {
            assert!(text.contains(group), "missing {}", group);
        }
        assert!(text.contains("Select with dependencies"));
    }
}
