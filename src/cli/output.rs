//! CLI output formatting
//!
//! Colored status lines, a spinner for waits on the collector, and an aligned
//! table for delivery reports.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::status::SyncStatus;

/// Output helper for consistent CLI formatting
pub struct Output;

impl Output {
    pub fn success(message: &str) {
        Self::line("✓".green(), message);
    }

    /// Errors go to stderr
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        Self::line("⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        Self::line("ℹ".blue(), message);
    }

    pub fn header(title: &str) {
        println!("\n{}", title.bold().underline());
    }

    pub fn kv(key: &str, value: &str) {
        println!("  {:<18} {}", format!("{key}:").dimmed(), value);
    }

    fn line(glyph: ColoredString, message: &str) {
        println!("{glyph} {message}");
    }

    /// Spinner with elapsed time, shown while waiting for the collector
    pub fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .expect("hardcoded template must be valid")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn status(status: SyncStatus) -> String {
        let text = status.to_string();
        match status {
            SyncStatus::Success | SyncStatus::Idle => text.green().to_string(),
            SyncStatus::Syncing => text.yellow().to_string(),
            SyncStatus::Error => text.red().to_string(),
            SyncStatus::Disabled => text.dimmed().to_string(),
        }
    }

    /// Show only the first and last characters of a secret
    pub fn mask(secret: &str) -> String {
        let chars: Vec<char> = secret.chars().collect();
        if chars.len() <= 6 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

struct Column {
    title: String,
    align: Align,
    width: usize,
}

/// Aligned report table; numeric columns read best right-aligned
pub struct ReportTable {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, title: &str, align: Align) -> Self {
        self.columns.push(Column {
            title: title.to_string(),
            align,
            width: title.chars().count(),
        });
        self
    }

    /// Cells past the last column are ignored
    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells: Vec<String> = cells
            .into_iter()
            .take(self.columns.len())
            .map(Into::into)
            .collect();
        for (column, cell) in self.columns.iter_mut().zip(&cells) {
            column.width = column.width.max(cell.chars().count());
        }
        self.rows.push(cells);
    }

    fn render_cells(&self, cells: &[String]) -> String {
        self.columns
            .iter()
            .zip(cells)
            .map(|(column, cell)| match column.align {
                Align::Left => format!("{cell:<width$}", width = column.width),
                Align::Right => format!("{cell:>width$}", width = column.width),
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    }

    /// Header, rule and rows as plain text lines
    pub fn render(&self) -> Vec<String> {
        let titles: Vec<String> = self.columns.iter().map(|c| c.title.clone()).collect();
        let rule = self
            .columns
            .iter()
            .map(|c| "─".repeat(c.width))
            .collect::<Vec<_>>()
            .join("  ");

        let mut lines = vec![self.render_cells(&titles), rule];
        lines.extend(self.rows.iter().map(|row| self.render_cells(row)));
        lines
    }

    pub fn print(&self) {
        for (i, line) in self.render().into_iter().enumerate() {
            match i {
                0 => println!("{}", line.bold()),
                1 => println!("{}", line.dimmed()),
                _ => println!("{line}"),
            }
        }
    }
}

impl Default for ReportTable {
    fn default() -> Self {
        Self::new()
    }
}
