//! Package list widget for the overview.

use crate::services::format_size;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState},
};

/// One visible row of the package list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow<'a> {
    pub name: &'a str,
    pub selected: bool,
    /// Part of the effective build set without being selected
    pub pulled_in: bool,
    pub version: Option<&'a str>,
    pub build_type: Option<&'a str>,
    /// Measured size, if known yet
    pub size: Option<u64>,
}

/// Widget for displaying the filtered package list
pub struct PackageListWidget<'a> {
    rows: &'a [PackageRow<'a>],
    highlighted: usize,
    total: usize,
    selected: usize,
}

impl<'a> PackageListWidget<'a> {
    /// `total` and `selected` count all packages, visible or not
    pub fn new(rows: &'a [PackageRow<'a>], highlighted: usize, total: usize, selected: usize) -> Self {
        Self {
            rows,
            highlighted,
            total,
            selected,
        }
    }

    fn checkbox(row: &PackageRow<'_>) -> &'static str {
        if row.selected {
            "[x]"
        } else if row.pulled_in {
            "[+]"
        } else {
            "[ ]"
        }
    }

    fn row_color(row: &PackageRow<'_>) -> Color {
        if row.selected {
            Color::Green
        } else if row.pulled_in {
            Color::Cyan
        } else {
            Color::Reset
        }
    }

    fn build_items(&self, name_width: usize) -> Vec<ListItem<'a>> {
        self.rows
            .iter()
            .map(|row| {
                let size = row.size.map(format_size).unwrap_or_else(|| "-".to_string());
                let line = Line::from(vec![
                    Span::styled(
                        format!("{} ", Self::checkbox(row)),
                        Style::default().fg(Self::row_color(row)),
                    ),
                    Span::styled(
                        format!("{:width$} ", row.name, width = name_width),
                        Style::default().fg(Self::row_color(row)),
                    ),
                    Span::styled(
                        format!("{:>9} ", size),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(
                        format!(
                            "{:10} {}",
                            row.version.unwrap_or(""),
                            row.build_type.unwrap_or("")
                        ),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]);
                ListItem::new(line)
            })
            .collect()
    }
}

impl Widget for PackageListWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let name_width = self
            .rows
            .iter()
            .map(|r| r.name.chars().count())
            .max()
            .unwrap_or(0)
            .min(40);
        let items = self.build_items(name_width);

        let mut state = ListState::default();
        if !self.rows.is_empty() {
            state.select(Some(self.highlighted.min(self.rows.len() - 1)));
        }

        let title = format!(
            " Packages ({} shown, {}/{} selected) ",
            self.rows.len(),
            self.selected,
            self.total
        );
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");

        StatefulWidget::render(list, area, buf, &mut state);
    }
}
