use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::parser::Table;
use crate::schema::Schema;

/// Summary of one uploaded file, computed once at upload time.
///
/// `averages` holds exactly the schema's numeric columns. A column with no
/// numeric cells (including a file with zero data rows) maps to `None`, which
/// serializes as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_count: usize,
    pub averages: BTreeMap<String, Option<f64>>,
    pub type_distribution: BTreeMap<String, u64>,
}

impl DatasetSummary {
    pub fn from_table(table: &Table, schema: &Schema) -> Self {
        let mut averages = BTreeMap::new();
        for col in schema.numeric {
            let values: Vec<f64> = table
                .column(col)
                .map(|cells| cells.filter_map(parse_number).collect())
                .unwrap_or_default();
            averages.insert(col.to_string(), mean(&values));
        }

        let mut type_distribution: BTreeMap<String, u64> = BTreeMap::new();
        if let Some(cells) = table.column(schema.category) {
            for value in cells.filter(|v| !v.is_empty()) {
                *type_distribution.entry(value.to_string()).or_default() += 1;
            }
        }

        DatasetSummary {
            total_count: table.row_count(),
            averages,
            type_distribution,
        }
    }

    /// Distribution entries, most frequent first; ties by key.
    pub fn distribution_by_count(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .type_distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Parses a cell as a number. Blank, non-numeric and NaN cells count as missing.
fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Computes the arithmetic mean of a slice of values. Returns `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
