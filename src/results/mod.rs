//! Decoding of server results: lazy [`Row`]s read through a [`RowStream`],
//! and materialized [`ResultSet`]s.

mod decode;
mod hydrate;
mod result_set;
mod row;
mod stream;

pub use decode::decode_cell;
pub use hydrate::FromRow;
pub use result_set::ResultSet;
pub use row::{ColumnSet, CustomDbRow, Row};
pub use stream::RowStream;
