//! Main layout rendering for the TUI.

use crate::app::{App, AppView};
use crate::ui::input::InputMode;
use crate::ui::widgets::confirm::ConfirmDialog;
use crate::ui::widgets::dependency_panel::DependencyPanelWidget;
use crate::ui::widgets::help::HelpWidget;
use crate::ui::widgets::output_panel::OutputPanelWidget;
use crate::ui::widgets::package_detail::PackageDetailWidget;
use crate::ui::widgets::package_list::PackageListWidget;
use crate::ui::widgets::text_input::PathDialog;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

/// Draw the main application UI
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match &app.view {
        AppView::Overview => draw_overview(frame, app, area),
        AppView::Output => draw_output(frame, app, area),
        AppView::Help => draw_help(frame, app, area),
        AppView::PackageDetail(name) => draw_package_detail(frame, app, area, name),
        AppView::ConfirmClean => draw_confirm_clean(frame, app, area),
        AppView::OpenWorkspace => draw_open_workspace(frame, app, area),
    }

    // Draw error message overlay if present
    if let Some(ref error) = app.error_message {
        draw_error_overlay(frame, error, area);
    } else if let Some(ref msg) = app.status_message {
        draw_status_message(frame, msg, area);
    }
}

/// Draw a status message at the bottom of the screen
fn draw_status_message(frame: &mut Frame, message: &str, area: Rect) {
    let msg_area = Rect {
        x: area.x + 2,
        y: area.y + area.height.saturating_sub(4),
        width: area
            .width
            .saturating_sub(4)
            .min(message.chars().count() as u16 + 4),
        height: 3.min(area.height),
    };

    frame.render_widget(Clear, msg_area);

    let status = Paragraph::new(message)
        .style(Style::default().fg(Color::Green))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        );

    frame.render_widget(status, msg_area);
}

/// Header lines: workspace root, then build options and state
fn header_lines(app: &App) -> Vec<Line<'static>> {
    let workspace = &app.workspace;
    let options = workspace.options();
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    let state = workspace.build_state();

    vec![
        Line::from(vec![
            Span::styled(
                "wsman ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(workspace.root().display().to_string()),
        ]),
        Line::from(Span::styled(
            format!(
                "{} {} | type: {} | symlink: {} | workers: {} | deps: {} | build set: {}",
                state.indicator(),
                state,
                options.build_type,
                on_off(options.symlink_install),
                options.parallel_workers,
                on_off(options.include_dependencies),
                workspace.effective_build_set().len(),
            ),
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let header = Paragraph::new(header_lines(app)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn draw_footer(frame: &mut Frame, text: &str, area: Rect) {
    let footer = Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, area);
}

/// Draw the main overview with package list and dependency panel
fn draw_overview(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(1), // Filter line
            Constraint::Length(2), // Footer
        ])
        .split(area);

    draw_header(frame, app, chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    if app.workspace.packages().is_empty() {
        let mut text = format!(
            "No packages found under {}.\n\nPress 'w' to open another workspace.",
            app.workspace.source_root().display()
        );
        let warnings = app.workspace.warnings().len();
        if warnings > 0 {
            text.push_str(&format!("\n{} manifests could not be read.", warnings));
        }
        let empty_msg = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(" Packages "))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(empty_msg, main[0]);
    } else {
        let rows = app.package_rows();
        let selection = app.workspace.selection();
        let list = PackageListWidget::new(
            &rows,
            app.highlighted,
            selection.len(),
            selection.selected_count(),
        );
        frame.render_widget(list, main[0]);
    }

    let neighbourhood = app.neighbourhood();
    frame.render_widget(DependencyPanelWidget::new(neighbourhood.as_ref()), main[1]);

    draw_filter_line(frame, app, chunks[2]);

    draw_footer(
        frame,
        " j/k: Move | Space: Toggle | d/D: Cascade | /: Filter | b: Build | c: Cancel | C: Clean | o: Output | ?: Help | q: Quit ",
        chunks[3],
    );
}

/// Filter line below the list, editable in insert mode
fn draw_filter_line(frame: &mut Frame, app: &App, area: Rect) {
    if app.input_mode == InputMode::Insert {
        let input = &app.filter_input;
        let line = Line::from(vec![
            Span::styled(" / ", Style::default().fg(Color::Cyan)),
            Span::raw(input.value().to_string()),
        ]);
        frame.render_widget(Paragraph::new(line), area);

        let before: u16 = input.value().chars().take(input.cursor).count() as u16;
        frame.set_cursor_position(Position::new(area.x + 3 + before, area.y));
        return;
    }

    let filter = app.workspace.selection().filter();
    if !filter.is_empty() {
        let line = Line::from(vec![
            Span::styled(" Filter: ", Style::default().fg(Color::Cyan)),
            Span::raw(filter.to_string()),
            Span::styled("  (Esc clears)", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

/// Draw build output view with streaming output
fn draw_output(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Output panel
            Constraint::Length(2), // Footer
        ])
        .split(area);

    draw_header(frame, app, chunks[0]);

    // The buffer keeps the last run's final state after the orchestrator
    // went back to idle
    let state = if app.is_building() {
        app.workspace.build_state()
    } else {
        app.workspace
            .last_run()
            .filter(|run| Some(run.id) == app.output_buffer.run())
            .map(|run| run.outcome.into())
            .unwrap_or_default()
    };
    frame.render_widget(OutputPanelWidget::new(&app.output_buffer, state), chunks[1]);

    let footer_text = if app.is_building() {
        " c: Cancel | j/k: Scroll | G: Bottom | Esc: Back "
    } else {
        " b: Build again | j/k: Scroll | G: Bottom | Esc: Back "
    };
    draw_footer(frame, footer_text, chunks[2]);
}

/// Draw help view showing all keybindings
fn draw_help(frame: &mut Frame, app: &App, area: Rect) {
    frame.render_widget(HelpWidget::new(&app.help_view_state), area);
}

/// Draw package details over the overview
fn draw_package_detail(frame: &mut Frame, app: &App, area: Rect, name: &str) {
    draw_overview(frame, app, area);

    let Some(package) = app.workspace.package(name) else {
        return;
    };
    let popup_area = centered_rect(70, 70, area);
    let widget = PackageDetailWidget::new(
        package,
        app.workspace.cached_footprint(name),
        app.workspace.source_root(),
    );
    frame.render_widget(widget, popup_area);
}

/// Draw clean confirmation over the overview
fn draw_confirm_clean(frame: &mut Frame, app: &App, area: Rect) {
    draw_overview(frame, app, area);

    let targets = app.workspace.config().clean.targets.join("/ and ");
    let message = format!(
        "Delete everything in {}/ under\n{}\nexcept the preserved entries?",
        targets,
        app.workspace.root().display()
    );
    let popup_area = centered_rect(50, 30, area);
    let dialog = ConfirmDialog::new("Clean Workspace", &message).yes_selected(app.confirm.yes_selected);
    frame.render_widget(dialog, popup_area);
}

/// Draw workspace path dialog over the overview
fn draw_open_workspace(frame: &mut Frame, app: &App, area: Rect) {
    draw_overview(frame, app, area);

    let popup_area = centered_rect(60, 40, area);
    let dialog = PathDialog::new(&app.path_input).error(app.path_error.as_deref());
    frame.render_widget(dialog, popup_area);
}

/// Draw error overlay
fn draw_error_overlay(frame: &mut Frame, error: &str, area: Rect) {
    let popup_area = centered_rect(60, 20, area);

    frame.render_widget(Clear, popup_area);

    let error_widget = Paragraph::new(error)
        .style(Style::default().fg(Color::Red))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title("Error"),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(error_widget, popup_area);
}

/// Create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::fake::FakeLauncher;
    use crate::services::ProcessLauncher;
    use crate::workspace::Workspace;
    use ratatui::backend::TestBackend;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buf = terminal.backend().buffer();
        (0..buf.area.height)
            .map(|y| {
                (0..buf.area.width)
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn app(temp: &TempDir) -> App {
        for (dir, name, deps) in [("a", "nav_msgs", ""), ("b", "nav_core", "<depend>nav_msgs</depend>")] {
            let dir = temp.path().join("src").join(dir);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("package.xml"),
                format!("<package><name>{}</name>{}</package>", name, deps),
            )
            .unwrap();
        }
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(FakeLauncher::new());
        let workspace = Workspace::open(temp.path(), AppConfig::default(), launcher).unwrap();
        App::new(workspace, None)
    }

    #[test]
    fn test_overview_screen() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp);

        let text = screen(&app);

        assert!(text.contains("Packages (2 shown, 0/2 selected)"));
        assert!(text.contains("> [ ] nav_core"));
        assert!(text.contains("Dependencies: nav_core"));
        assert!(text.contains("nav_msgs"));
    }

    #[test]
    fn test_confirm_clean_screen() {
        let temp = TempDir::new().unwrap();
        let mut app = app(&temp);
        app.view = AppView::ConfirmClean;

        let text = screen(&app);

        assert!(text.contains("Clean Workspace"));
        assert!(text.contains("No"));
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 50);
        let popup = centered_rect(50, 40, area);

        assert_eq!(popup.width, 50);
        assert_eq!(popup.height, 20);
        assert_eq!(popup.x, 25);
        assert_eq!(popup.y, 15);
    }
}
