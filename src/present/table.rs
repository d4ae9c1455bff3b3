//! The on-screen report: what is currently displayed, and how it is drawn.

use crate::report::{Report, COLUMNS};

/// Holds the report currently on screen.
///
/// Export and email read from here, so they only ever see what the operator
/// is looking at.
#[derive(Debug, Default)]
pub struct ReportView {
    current: Option<Report>,
}

impl ReportView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is displayed with `report`.
    pub fn render(&mut self, report: Report) {
        self.current = Some(report);
    }

    /// Clear header and rows.
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Report> {
        self.current.as_ref()
    }

    /// Displayed report, or an empty one when nothing is shown.
    pub fn report(&self) -> Report {
        self.current.clone().unwrap_or_default()
    }

    pub fn row_count(&self) -> usize {
        self.current.as_ref().map_or(0, Report::len)
    }

    /// Draw the table with aligned columns. Empty when nothing is displayed.
    pub fn draw(&self) -> String {
        let Some(report) = &self.current else {
            return String::new();
        };

        let rows = report.cell_rows();
        let mut widths = COLUMNS.map(|c| c.chars().count());
        for cells in &rows {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(display_width(cell));
            }
        }

        let mut out = String::new();
        out.push_str(&draw_line(&report.header(), &widths));
        out.push_str(&draw_rule(&widths));
        for cells in &rows {
            out.push_str(&draw_line(cells, &widths));
        }
        out
    }
}

/// Line breaks inside cells are flattened for terminal output.
fn flatten(cell: &str) -> String {
    cell.replace(['\r', '\n'], " ")
}

fn display_width(cell: &str) -> usize {
    flatten(cell).chars().count()
}

fn draw_line(cells: &[&str; 4], widths: &[usize; 4]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", flatten(cell), width = *width))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}

fn draw_rule(widths: &[usize; 4]) -> String {
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    format!("{}\n", dashes.join("  "))
}
