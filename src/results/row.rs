use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use super::decode::decode_cell;
use crate::config::CharacterSet;
use crate::error::SqlsrvError;
use crate::types::{FromValue, RowValues};
use crate::wire::{WireColumn, WireValue};

/// Column metadata shared by every row of one result.
#[derive(Debug)]
pub struct ColumnSet {
    columns: Vec<WireColumn>,
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    character_set: CharacterSet,
}

impl ColumnSet {
    #[must_use]
    pub fn shared(columns: Vec<WireColumn>, character_set: CharacterSet) -> Arc<Self> {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        // First occurrence wins for duplicated names.
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Arc::new(Self {
            columns,
            names: Arc::new(names),
            index: Arc::new(index),
            character_set,
        })
    }

    #[must_use]
    pub fn columns(&self) -> &[WireColumn] {
        &self.columns
    }

    #[must_use]
    pub fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn character_set(&self) -> CharacterSet {
        self.character_set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A row as read off the wire. Cells are decoded only when asked for.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnSet>,
    cells: Vec<WireValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<ColumnSet>, cells: Vec<WireValue>) -> Self {
        Self { columns, cells }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn columns(&self) -> &[WireColumn] {
        self.columns.columns()
    }

    /// Decode the named column.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<RowValues> {
        self.get_by_index(self.columns.index_of(column_name)?)
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<RowValues> {
        let cell = self.cells.get(index)?;
        let column = self.columns.columns().get(index)?;
        Some(decode_cell(cell, column, self.columns.character_set()))
    }

    /// Decode the named column into `T`.
    ///
    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` for an unknown column or an incompatible value.
    pub fn try_get<T: FromValue>(&self, column_name: &str) -> Result<T, SqlsrvError> {
        let value = self
            .get(column_name)
            .ok_or_else(|| SqlsrvError::DecodeError(format!("no column named {column_name:?}")))?;
        T::from_value(value)
    }

    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` for an out-of-range index or an incompatible value.
    pub fn try_get_by_index<T: FromValue>(&self, index: usize) -> Result<T, SqlsrvError> {
        let value = self
            .get_by_index(index)
            .ok_or_else(|| SqlsrvError::DecodeError(format!("no column at index {index}")))?;
        T::from_value(value)
    }

    /// Decode every cell, in column order.
    #[must_use]
    pub fn decode_all(&self) -> CustomDbRow {
        let values = (0..self.cells.len())
            .map(|i| self.get_by_index(i).unwrap_or(RowValues::Null))
            .collect();
        CustomDbRow {
            column_names: Arc::clone(self.columns.names()),
            rows: values,
            column_index_cache: Arc::clone(&self.columns.index),
        }
    }

    /// Deserialize the row as a JSON object keyed by column name.
    ///
    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` when the row does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, SqlsrvError> {
        let mut object = Map::with_capacity(self.cells.len());
        for (i, name) in self.columns.names().iter().enumerate() {
            let value = self.get_by_index(i).map_or(JsonValue::Null, |v| v.to_json());
            object.entry(name.clone()).or_insert(value);
        }
        serde_json::from_value(JsonValue::Object(object))
            .map_err(|e| SqlsrvError::DecodeError(format!("cannot hydrate row: {e}")))
    }
}

/// A fully decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomDbRow {
    /// Column names, shared across all rows of a result
    pub column_names: Arc<Vec<String>>,
    /// Values in column order
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a decoded row
    ///
    /// # Arguments
    ///
    /// * `column_names` - The column names, usually shared with the other rows of the result
    /// * `rows` - The values, in the same order as `column_names`
    ///
    /// # Returns
    ///
    /// A new `CustomDbRow`. When a name repeats, lookups by name find its first column.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let mut cache = HashMap::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            cache.entry(name.clone()).or_insert(i);
        }
        Self {
            column_names,
            rows,
            column_index_cache: Arc::new(cache),
        }
    }

    /// Get the index of a column by name
    ///
    /// # Returns
    ///
    /// The column's position, or `None` if the row has no such column
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index_cache.get(column_name).copied()
    }

    /// Get a value by column name
    ///
    /// # Arguments
    ///
    /// * `column_name` - The name of the column
    ///
    /// # Returns
    ///
    /// The value, or `None` for an unknown column
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.rows.get(self.get_column_index(column_name)?)
    }

    /// Get a value by position
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Numeric;
    use serde::Deserialize;

    fn sample() -> Row {
        let columns = ColumnSet::shared(
            vec![
                WireColumn::new("id", "int"),
                WireColumn::new("name", "nvarchar"),
                WireColumn::new("price", "decimal"),
            ],
            CharacterSet::Utf8,
        );
        Row::new(
            columns,
            vec![
                WireValue::Int(7),
                WireValue::String("widget".into()),
                WireValue::Numeric(Numeric::new(1999, 2)),
            ],
        )
    }

    #[test]
    fn lookups_by_name_and_index() {
        let row = sample();
        assert_eq!(row.get("id"), Some(RowValues::Int(7)));
        assert_eq!(row.try_get::<String>("name").unwrap(), "widget");
        assert!(row.get("missing").is_none());
        assert!(matches!(row.try_get::<i64>("name"), Err(SqlsrvError::DecodeError(_))));
        assert_eq!(row.try_get_by_index::<Numeric>(2).unwrap().to_string(), "19.99");
    }

    #[test]
    fn decode_all_keeps_column_order() {
        let decoded = sample().decode_all();
        assert_eq!(*decoded.column_names, vec!["id", "name", "price"]);
        assert_eq!(decoded.get("name"), Some(&RowValues::Text("widget".into())));
        assert_eq!(decoded.get_by_index(0), Some(&RowValues::Int(7)));
    }

    #[test]
    fn deserializes_into_struct() {
        #[derive(Deserialize)]
        struct Item {
            id: i64,
            name: String,
            price: String,
        }
        let item: Item = sample().deserialize().unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.name, "widget");
        assert_eq!(item.price, "19.99");
    }
}
