use std::sync::Arc;

use super::row::{ColumnSet, CustomDbRow, Row};
use crate::config::CharacterSet;
use crate::wire::WireColumn;

/// A materialized result: every row decoded and held in memory.
///
/// Produced by [`RowStream::collect`](super::RowStream::collect), and the shape
/// a [`ResultCache`](crate::executor::ResultCache) stores.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// Number of rows collected
    pub rows_affected: usize,
    columns: Arc<ColumnSet>,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::with_capacity(ColumnSet::shared(Vec::new(), CharacterSet::Utf8), 0)
    }
}

impl ResultSet {
    /// Create an empty result set with a known capacity
    ///
    /// # Arguments
    ///
    /// * `columns` - Column metadata shared by every row
    /// * `capacity` - The initial capacity for the result rows
    ///
    /// # Returns
    ///
    /// A new `ResultSet` instance with preallocated capacity
    #[must_use]
    pub fn with_capacity(columns: Arc<ColumnSet>, capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns,
        }
    }

    /// Column metadata as the server described it
    #[must_use]
    pub fn columns(&self) -> &[WireColumn] {
        self.columns.columns()
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> &Arc<Vec<String>> {
        self.columns.names()
    }

    pub(crate) fn column_set(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    /// Add a row to the result set
    ///
    /// # Arguments
    ///
    /// * `row` - A row read from the same result; every cell is decoded now
    pub fn add_row(&mut self, row: &Row) {
        self.results.push(row.decode_all());
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CustomDbRow> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a CustomDbRow;
    type IntoIter = std::slice::Iter<'a, CustomDbRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
