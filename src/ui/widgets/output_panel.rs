//! Output panel widget for the streaming build log.

use crate::domain::{BuildState, OutputLine, OutputStream, RunId};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use std::fmt;
use std::time::{Duration, Instant};

/// Maximum number of lines kept on screen
const MAX_OUTPUT_LINES: usize = 5000;

/// Widget for displaying build output
pub struct OutputPanelWidget<'a> {
    buffer: &'a OutputBuffer,
    state: BuildState,
}

impl<'a> OutputPanelWidget<'a> {
    pub fn new(buffer: &'a OutputBuffer, state: BuildState) -> Self {
        Self { buffer, state }
    }

    fn title(&self) -> String {
        match self.buffer.run {
            Some(run) => format!(" {} Build {} - {} ", self.state.indicator(), run, self.state),
            None => " Output ".to_string(),
        }
    }

    fn border_style(&self) -> Style {
        match self.state {
            BuildState::Running => Style::default().fg(Color::Yellow),
            BuildState::Succeeded => Style::default().fg(Color::Green),
            BuildState::Failed { .. } => Style::default().fg(Color::Red),
            BuildState::Cancelled => Style::default().fg(Color::DarkGray),
            BuildState::Idle => Style::default(),
        }
    }

    fn format_lines(&self) -> Vec<Line<'a>> {
        let start = self.buffer.start_time;
        self.buffer
            .lines
            .iter()
            .map(|line| {
                let style = if line.stream == OutputStream::Stderr {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                };
                let offset = start
                    .map(|s| line.timestamp.saturating_duration_since(s))
                    .unwrap_or_default();

                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", format_offset(offset)),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(line.content.as_str(), style),
                ])
            })
            .collect()
    }
}

impl Widget for OutputPanelWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines = self.format_lines();
        let total_lines = lines.len();
        let visible_height = area.height.saturating_sub(2) as usize;

        let scroll = if self.buffer.auto_scroll {
            total_lines.saturating_sub(visible_height)
        } else {
            self.buffer.scroll_offset
        };

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(self.border_style())
                    .title(self.title()),
            )
            .wrap(Wrap { trim: false })
            .scroll((scroll.min(u16::MAX as usize) as u16, 0));

        paragraph.render(area, buf);

        if total_lines > visible_height && area.width > 0 {
            let scrollbar = Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"));

            let mut scrollbar_state = ScrollbarState::new(total_lines)
                .position(scroll)
                .viewport_content_length(visible_height);

            let scrollbar_area = Rect {
                x: area.x + area.width - 1,
                y: area.y + 1,
                width: 1,
                height: area.height.saturating_sub(2),
            };

            scrollbar.render(scrollbar_area, buf, &mut scrollbar_state);
        }
    }
}

/// `mm:ss` since the start of the run
fn format_offset(offset: Duration) -> String {
    let secs = offset.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Lines of the run currently shown
#[derive(Debug)]
pub struct OutputBuffer {
    lines: Vec<OutputLine>,
    run: Option<RunId>,
    start_time: Option<Instant>,
    scroll_offset: usize,
    auto_scroll: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            run: None,
            start_time: None,
            scroll_offset: 0,
            auto_scroll: true,
        }
    }

    /// Start showing a new run
    pub fn start(&mut self, run: RunId) {
        self.lines.clear();
        self.run = Some(run);
        self.start_time = Some(Instant::now());
        self.scroll_offset = 0;
        self.auto_scroll = true;
    }

    /// Run whose output is shown
    pub fn run(&self) -> Option<RunId> {
        self.run
    }

    /// Add a line of the current run; lines of other runs are ignored
    pub fn push(&mut self, run: RunId, line: OutputLine) {
        if self.run != Some(run) {
            return;
        }
        self.lines.push(line);

        if self.lines.len() > MAX_OUTPUT_LINES {
            self.lines.remove(0);
            self.scroll_offset = self.scroll_offset.saturating_sub(1);
        }
    }

    /// Add a line produced by the tool itself rather than the build
    pub fn note(&mut self, content: impl Into<String>) {
        if let Some(run) = self.run {
            self.push(run, OutputLine::new(content, OutputStream::Stdout));
        }
    }

    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn scroll_up(&mut self, amount: usize, visible_height: usize) {
        if self.auto_scroll {
            self.scroll_offset = self.lines.len().saturating_sub(visible_height);
        }
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
        self.auto_scroll = false;
    }

    pub fn scroll_down(&mut self, amount: usize, visible_height: usize) {
        let max_scroll = self.lines.len().saturating_sub(visible_height);
        self.scroll_offset = (self.scroll_offset + amount).min(max_scroll);

        // Back at the bottom: follow new output again
        if self.scroll_offset >= max_scroll {
            self.auto_scroll = true;
        }
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
        self.auto_scroll = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
        self.auto_scroll = true;
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }
}

impl fmt::Display for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content: Vec<_> = self.lines.iter().map(|l| l.content.as_str()).collect();
        write!(f, "{}", content.join("\n"))
    }
}
