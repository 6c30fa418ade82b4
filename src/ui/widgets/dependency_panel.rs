//! Dependency neighbourhood of the highlighted package.

use crate::domain::{DependencyGraph, ImpactDirection};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

/// Direct and transitive relations of one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbourhood {
    pub package: String,
    /// Direct dependencies inside the workspace
    pub dependencies: Vec<String>,
    /// Direct dependents
    pub dependents: Vec<String>,
    /// Declared dependencies outside the workspace
    pub external: Vec<String>,
    pub transitive_dependencies: usize,
    pub transitive_dependents: usize,
    /// Other packages reachable along edges in either direction
    pub connected: usize,
}

impl Neighbourhood {
    /// Collect the neighbourhood of `name`; `None` for unknown packages
    pub fn of(graph: &DependencyGraph, name: &str) -> Option<Self> {
        if !graph.has_node(name) {
            return None;
        }
        // The impact set includes the package itself
        let transitive = |direction: ImpactDirection| {
            graph.impact_set([name], direction).len().saturating_sub(1)
        };

        Some(Self {
            package: name.to_string(),
            dependencies: graph.neighbors_out(name),
            dependents: graph.neighbors_in(name),
            external: graph
                .unresolved()
                .iter()
                .filter(|edge| edge.package == name)
                .map(|edge| edge.dependency.clone())
                .collect(),
            transitive_dependencies: transitive(ImpactDirection::Dependencies),
            transitive_dependents: transitive(ImpactDirection::Dependents),
            connected: transitive(ImpactDirection::Both),
        })
    }
}

pub struct DependencyPanelWidget<'a> {
    neighbourhood: Option<&'a Neighbourhood>,
}

impl<'a> DependencyPanelWidget<'a> {
    pub fn new(neighbourhood: Option<&'a Neighbourhood>) -> Self {
        Self { neighbourhood }
    }

    fn section(lines: &mut Vec<Line<'a>>, title: String, names: &'a [String]) {
        lines.push(Line::from(Span::styled(
            title,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        if names.is_empty() {
            lines.push(Line::from(Span::styled(
                "  (none)",
                Style::default().fg(Color::DarkGray),
            )));
        }
        for name in names {
            lines.push(Line::from(format!("  {}", name)));
        }
        lines.push(Line::from(""));
    }

    fn build_lines(&self) -> Vec<Line<'a>> {
        let Some(n) = self.neighbourhood else {
            return vec![Line::from(Span::styled(
                "No package highlighted",
                Style::default().fg(Color::DarkGray),
            ))];
        };

        let mut lines = Vec::new();
        Self::section(
            &mut lines,
            format!(
                "Depends on ({} direct, {} total)",
                n.dependencies.len(),
                n.transitive_dependencies
            ),
            &n.dependencies,
        );
        Self::section(
            &mut lines,
            format!(
                "Needed by ({} direct, {} total)",
                n.dependents.len(),
                n.transitive_dependents
            ),
            &n.dependents,
        );
        lines.push(Line::from(Span::styled(
            format!("Connected to {} packages", n.connected),
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(""));
        if !n.external.is_empty() {
            Self::section(
                &mut lines,
                format!("External ({})", n.external.len()),
                &n.external,
            );
        }
        lines
    }
}

impl Widget for DependencyPanelWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = match self.neighbourhood {
            Some(n) => format!(" Dependencies: {} ", n.package),
            None => " Dependencies ".to_string(),
        };
        Paragraph::new(self.build_lines())
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}
