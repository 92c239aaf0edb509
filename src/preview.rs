//! Tabular preview of a CSV file: the header plus the first rows.

use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;

/// Number of data rows shown by default.
pub const PREVIEW_ROWS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Reads the header and up to `limit` data rows. Ragged rows are kept as they are.
pub fn preview_bytes(bytes: &[u8], limit: usize) -> Result<Preview> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = rdr.records();

    let headers: Vec<String> = match records.next() {
        Some(first) => first
            .context("failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect(),
        None => bail!("CSV appears empty"),
    };

    let mut rows = Vec::new();
    for record in records.take(limit) {
        rows.push(record.context("failed to read CSV row")?.iter().map(str::to_string).collect());
    }

    Ok(Preview { headers, rows })
}

pub fn preview_path(path: &Path, limit: usize) -> Result<Preview> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    preview_bytes(&bytes, limit)
}

impl Preview {
    /// Renders an aligned plain-text table.
    pub fn render(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; width];
        for row in std::iter::once(&self.headers).chain(self.rows.iter()) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let format_row = |row: &Vec<String>| -> String {
            let cells: Vec<String> = (0..width)
                .map(|i| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{cell:<w$}", w = widths[i])
                })
                .collect();
            cells.join(" | ").trim_end().to_string()
        };

        let mut out = format_row(&self.headers);
        out.push('\n');
        out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&format_row(row));
        }
        out
    }
}
