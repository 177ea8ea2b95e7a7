//! A small SQL Server client core.
//!
//! Open a [`Connection`] from a [`ConnectionConfig`], run [`Statement`]s with
//! framework-style placeholders (`?`, `:name`, `?N`), read SELECT results
//! lazily through a [`RowStream`], get the generated key of an INSERT back in
//! the same round trip, and introspect tables and columns.
//!
//! ```rust,no_run
//! use sqlsrv_core::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlsrvError> {
//! let config = ConnectionConfig::builder("tcp:localhost,1433", "sa", "Passw0rd!")
//!     .database("app")
//!     .finish();
//! let conn = connect(&config).await?;
//!
//! let inserted = execute(
//!     &conn,
//!     &Statement::insert("INSERT INTO people (name) VALUES (:name)").bind(RowValues::Text("Ada".into())),
//! )
//! .await?;
//! println!("new id: {:?}", inserted.generated_key());
//!
//! let mut rows = execute(&conn, &Statement::select("SELECT id, name FROM people")).await?.into_rows()?;
//! while let Some(row) = rows.next().await? {
//!     let name: String = row.try_get("name")?;
//!     println!("{name}");
//! }
//! disconnect(&conn).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod manager;
pub mod numeric;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod schema;
pub mod translation;
pub mod types;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{CharacterSet, ConnectionConfig, ConnectionConfigBuilder, ConnectionIdentity, ConnectionInfo};
pub use connection::{Connection, disconnect};
pub use error::{DriverError, SqlsrvError};
pub use executor::{ExecutionResult, Statement, StatementKind, execute, execute_cached};
#[cfg(feature = "mssql")]
pub use manager::connect;
pub use manager::ConnectionManager;
pub use numeric::Numeric;
pub use results::{CustomDbRow, FromRow, ResultSet, Row, RowStream};
pub use schema::{ColumnDescriptor, TableColumns, introspect_columns, introspect_tables};
pub use types::{FromValue, RowValues};
