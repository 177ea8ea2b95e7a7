//! Catalog introspection through `sp_tables` and `sp_columns`, the type map,
//! and identifier quoting.

mod column;
mod quote;
mod types;

pub use column::{ColumnDescriptor, TableColumns};
pub use quote::{IdentifierQuoter, quote_identifier};
pub use types::{PortableType, TypeInfo, TypeMap};

use tracing::debug;

use crate::connection::Connection;
use crate::error::SqlsrvError;
use crate::executor::{Statement, execute};
use crate::types::RowValues;

const LIST_TABLES: &str = "EXEC sp_tables @table_name = ?, @table_type = ?";
const LIST_COLUMNS: &str = "EXEC sp_columns @table_name = ?, @table_owner = ?, @column_name = ?";

fn pattern_param(pattern: Option<&str>) -> RowValues {
    pattern.map_or(RowValues::Null, |p| RowValues::Text(p.to_string()))
}

/// Base table names matching a `LIKE` pattern, or all of them.
///
/// # Errors
///
/// Propagates execution and decode errors.
pub async fn introspect_tables(conn: &Connection, pattern: Option<&str>) -> Result<Vec<String>, SqlsrvError> {
    let statement = Statement::select(LIST_TABLES)
        .bind(pattern_param(pattern))
        .bind(RowValues::Text("'TABLE'".to_string()));
    let mut rows = execute(conn, &statement).await?.into_rows()?;
    let mut tables = Vec::new();
    while let Some(row) = rows.next().await? {
        tables.push(row.try_get::<String>("TABLE_NAME")?);
    }
    debug!(count = tables.len(), pattern, "listed tables");
    Ok(tables)
}

/// Column descriptors of `table`, optionally filtered by a column `LIKE` pattern.
///
/// `table` may be `owner.table`. The connection's table prefix is applied to
/// the table name.
///
/// # Errors
///
/// Propagates execution and decode errors.
pub async fn introspect_columns(
    conn: &Connection,
    table: &str,
    column_pattern: Option<&str>,
) -> Result<TableColumns, SqlsrvError> {
    let (owner, name) = match table.rsplit_once('.') {
        Some((owner, name)) => (Some(owner), name),
        None => (None, table),
    };
    let name = format!("{}{}", conn.info().table_prefix, name);

    let statement = Statement::select(LIST_COLUMNS)
        .bind(RowValues::Text(name))
        .bind(pattern_param(owner))
        .bind(pattern_param(column_pattern));
    let mut rows = execute(conn, &statement).await?.into_rows()?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        columns.push(ColumnDescriptor::from_catalog_row(&row, conn.type_map())?);
    }
    debug!(table, count = columns.len(), "listed columns");
    Ok(TableColumns::new(columns))
}
