//! Popup with everything known about one package.

use crate::domain::Package;
use crate::services::{format_size, PackageFootprint};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use std::path::Path;

pub struct PackageDetailWidget<'a> {
    package: &'a Package,
    footprint: Option<&'a PackageFootprint>,
    source_root: &'a Path,
}

impl<'a> PackageDetailWidget<'a> {
    pub fn new(package: &'a Package, footprint: Option<&'a PackageFootprint>, source_root: &'a Path) -> Self {
        Self {
            package,
            footprint,
            source_root,
        }
    }

    fn field(label: &str, value: impl Into<String>) -> Line<'static> {
        Line::from(vec![
            Span::styled(format!("{:14}", label), Style::default().fg(Color::Green)),
            Span::raw(value.into()),
        ])
    }

    fn build_lines(&self) -> Vec<Line<'static>> {
        let p = self.package;
        let location = p.path.strip_prefix(self.source_root).unwrap_or(&p.path);

        let mut lines = vec![
            Self::field("Name", p.name.clone()),
            Self::field("Version", p.version.clone().unwrap_or_else(|| "-".into())),
            Self::field("Build type", p.build_type.clone().unwrap_or_else(|| "-".into())),
            Self::field("Location", location.display().to_string()),
            Self::field("Manifest", p.manifest_path.display().to_string()),
        ];
        if let Some(description) = &p.description {
            lines.push(Self::field("Description", description.clone()));
        }
        lines.push(Self::field("Dependencies", p.dependencies.join(", ")));
        lines.push(Line::from(""));

        let Some(fp) = self.footprint else {
            lines.push(Line::from(Span::styled(
                "Size not measured",
                Style::default().fg(Color::DarkGray),
            )));
            return lines;
        };

        lines.push(Line::from(Span::styled(
            "Footprint",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Self::field("Total", format_size(fp.total_size)));
        lines.push(Self::field(
            "Files",
            format!("{} ({})", fp.regular_files, format_size(fp.regular_size)),
        ));
        lines.push(Self::field(
            "Symlinks",
            format!("{} ({})", fp.symlinks, format_size(fp.symlink_size)),
        ));
        lines.push(Self::field("Directories", fp.dir_count.to_string()));
        if fp.skipped_files > 0 || fp.skipped_dirs > 0 {
            lines.push(Self::field(
                "Skipped",
                format!("{} files, {} directories", fp.skipped_files, fp.skipped_dirs),
            ));
        }
        if !fp.large_files.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Largest files",
                Style::default().fg(Color::Yellow),
            )));
            for file in &fp.large_files {
                lines.push(Line::from(format!(
                    "  {:>9}  {}",
                    format_size(file.size),
                    file.path.display()
                )));
            }
        }
        lines
    }
}

impl Widget for PackageDetailWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);
        Paragraph::new(self.build_lines())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan))
                    .title(format!(" {} ", self.package.name)),
            )
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}
