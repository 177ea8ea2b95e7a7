//! Convenient imports for common functionality.
//!
//! This module re-exports the types and functions most programs need.

pub use crate::config::{CharacterSet, ConnectionConfig};
pub use crate::connection::{Connection, disconnect};
pub use crate::error::{DriverError, SqlsrvError};
pub use crate::executor::{ExecutionResult, Statement, StatementKind, execute};
#[cfg(feature = "mssql")]
pub use crate::manager::connect;
pub use crate::manager::ConnectionManager;
pub use crate::numeric::Numeric;
pub use crate::results::{CustomDbRow, FromRow, ResultSet, Row, RowStream};
pub use crate::schema::{introspect_columns, introspect_tables};
pub use crate::types::{FromValue, RowValues};
