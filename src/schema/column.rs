use std::collections::HashMap;

use serde::Serialize;

use super::types::{PortableType, TypeInfo, TypeMap};
use crate::error::SqlsrvError;
use crate::results::Row;

/// One column as described by `sp_columns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type name as the catalog reports it, e.g. `int identity`.
    pub data_type: String,
    pub type_info: TypeInfo,
    pub nullable: bool,
    pub ordinal_position: u32,
    pub default: Option<String>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    /// Display width of integer columns.
    pub display: Option<i64>,
    pub radix: Option<i64>,
    pub character_maximum_length: Option<i64>,
    pub identity: bool,
    pub remarks: Option<String>,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn portable_type(&self) -> PortableType {
        self.type_info.portable
    }

    /// Build a descriptor from one `sp_columns` row.
    ///
    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` if a catalog column is missing or mistyped.
    pub fn from_catalog_row(row: &Row, types: &TypeMap) -> Result<Self, SqlsrvError> {
        let data_type: String = row.try_get("TYPE_NAME")?;
        let mut type_info = types.lookup(&data_type);
        let precision: Option<i64> = row.try_get("PRECISION")?;
        let length: Option<i64> = row.try_get("LENGTH")?;

        // sp_columns reports (max) columns under the base name with no usable length.
        let variable = matches!(
            TypeMap::normalize(&data_type).as_str(),
            "varchar" | "nvarchar" | "varbinary"
        );
        if variable && precision.is_some_and(|p| p == 0 || p >= i64::from(i32::MAX)) {
            type_info.large_object = true;
        }

        let ordinal: i64 = row.try_get("ORDINAL_POSITION")?;
        let mut descriptor = ColumnDescriptor {
            name: row.try_get("COLUMN_NAME")?,
            identity: TypeMap::is_identity(&data_type),
            data_type,
            type_info,
            nullable: row.try_get::<Option<i64>>("NULLABLE")? == Some(1),
            ordinal_position: u32::try_from(ordinal)
                .map_err(|e| SqlsrvError::DecodeError(format!("ORDINAL_POSITION {ordinal}: {e}")))?,
            default: row.try_get("COLUMN_DEF")?,
            numeric_precision: None,
            numeric_scale: None,
            display: None,
            radix: None,
            character_maximum_length: None,
            remarks: row.try_get("REMARKS")?,
        };

        match type_info.portable {
            PortableType::Float => {
                descriptor.numeric_precision = precision;
                descriptor.numeric_scale = row.try_get("SCALE")?;
            }
            PortableType::Integer => {
                descriptor.display = length;
                descriptor.radix = row.try_get("RADIX")?;
            }
            PortableType::String | PortableType::Binary => {
                descriptor.character_maximum_length = row.try_get("CHAR_OCTET_LENGTH")?;
            }
            PortableType::DateTime | PortableType::OpaqueString => {}
        }
        Ok(descriptor)
    }
}

/// Columns of one table, in ordinal order, addressable by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableColumns {
    columns: Vec<ColumnDescriptor>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl TableColumns {
    #[must_use]
    pub fn new(mut columns: Vec<ColumnDescriptor>) -> Self {
        columns.sort_by_key(|c| c.ordinal_position);
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, by_name }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDescriptor> {
        self.columns.iter()
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

impl<'a> IntoIterator for &'a TableColumns {
    type Item = &'a ColumnDescriptor;
    type IntoIter = std::slice::Iter<'a, ColumnDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl IntoIterator for TableColumns {
    type Item = ColumnDescriptor;
    type IntoIter = std::vec::IntoIter<ColumnDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}
