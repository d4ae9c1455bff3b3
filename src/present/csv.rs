//! CSV export of the displayed report.

use std::path::Path;
use tracing::info;

use crate::error::ReportError;
use crate::report::Report;

/// Quote a field when it contains a separator, a quote or a line break.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn line<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells.into_iter().map(field).collect::<Vec<_>>().join(",")
}

/// Header line plus one line per row, joined by `\n`.
pub fn to_csv(report: &Report) -> String {
    let mut lines = vec![line(report.header())];
    lines.extend(report.cell_rows().into_iter().map(line));
    lines.join("\n")
}

/// Write the report to `path`. An empty report is rejected and nothing is written.
pub fn export(report: &Report, path: &Path) -> Result<(), ReportError> {
    if report.is_empty() {
        return Err(ReportError::Validation("No data to download.".to_string()));
    }

    std::fs::write(path, to_csv(report))?;
    info!("Exported {} rows to {}", report.len(), path.display());
    Ok(())
}
