//! Required-column check for uploaded tables.

use crate::error::InputError;
use crate::parser::Table;

/// Columns an upload must carry before it can be summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// Averaged columns, in the order they are checked and reported.
    pub numeric: &'static [&'static str],
    /// Column whose distinct values are counted.
    pub category: &'static str,
}

impl Schema {
    /// Equipment sensor readings: `Flowrate`, `Pressure`, `Temperature`, keyed by `Type`.
    pub const EQUIPMENT: Schema = Schema {
        numeric: &["Flowrate", "Pressure", "Temperature"],
        category: "Type",
    };

    /// Checks that every required column is present.
    ///
    /// Numeric columns are checked first, in declaration order, then the
    /// category column. Cell contents are not inspected.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::MissingColumn`] naming the first absent column.
    pub fn validate(&self, table: &Table) -> Result<(), InputError> {
        let missing = self
            .numeric
            .iter()
            .chain(std::iter::once(&self.category))
            .find(|col| !table.has_column(col));

        match missing {
            Some(col) => Err(InputError::MissingColumn(col.to_string())),
            None => Ok(()),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::EQUIPMENT
    }
}
