use super::row::{CustomDbRow, Row};
use crate::error::SqlsrvError;
use crate::types::FromValue;

/// Build a value from one result row.
///
/// Implement it for your own records, or use [`Row::deserialize`] for any
/// `serde::Deserialize` type:
/// ```rust
/// use sqlsrv_core::prelude::*;
///
/// struct Person {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow for Person {
///     fn from_row(row: &Row) -> Result<Self, SqlsrvError> {
///         Ok(Person {
///             id: row.try_get("id")?,
///             name: row.try_get("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` when the row does not fit.
    fn from_row(row: &Row) -> Result<Self, SqlsrvError>;
}

impl FromRow for CustomDbRow {
    fn from_row(row: &Row) -> Result<Self, SqlsrvError> {
        Ok(row.decode_all())
    }
}

macro_rules! impl_from_row_tuple {
    ($($idx:tt => $ty:ident),+) => {
        impl<$($ty: FromValue),+> FromRow for ($($ty,)+) {
            fn from_row(row: &Row) -> Result<Self, SqlsrvError> {
                Ok(($(row.try_get_by_index::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(0 => A);
impl_from_row_tuple!(0 => A, 1 => B);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
