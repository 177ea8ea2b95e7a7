use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::SqlsrvError;
use crate::numeric::Numeric;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used for bound parameters and decoded cells:
/// ```rust
/// use sqlsrv_core::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Decimal("19.99".parse().unwrap()),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Exact decimal (`decimal`, `numeric`, `money`)
    Decimal(Numeric),
    /// Text/string value
    Text(String),
    /// Boolean value (`bit`)
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Timestamp with offset (`datetimeoffset`)
    TimestampTz(DateTime<FixedOffset>),
    /// Date value
    Date(NaiveDate),
    /// Time-of-day value
    Time(NaiveTime),
    /// NULL value
    Null,
    /// JSON value, bound as text
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::TimestampTz(value) => Some(value.naive_local()),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<&Numeric> {
        if let RowValues::Decimal(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// JSON rendering used by the serde hydration path. Decimals become strings
    /// so no precision is lost; binary becomes an array of bytes.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
            RowValues::Decimal(n) => JsonValue::String(n.to_string()),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Timestamp(dt) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            RowValues::TimestampTz(dt) => JsonValue::String(dt.to_rfc3339()),
            RowValues::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            RowValues::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

/// Typed extraction of a single decoded cell.
pub trait FromValue: Sized {
    /// # Errors
    ///
    /// Returns `SqlsrvError::DecodeError` when the value has an incompatible type.
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError>;
}

fn mismatch(expected: &str, value: &RowValues) -> SqlsrvError {
    SqlsrvError::DecodeError(format!("expected {expected}, found {value:?}"))
}

impl FromValue for RowValues {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        match value {
            RowValues::Int(i) => Ok(i),
            RowValues::Decimal(n) => n.to_i64().ok_or_else(|| mismatch("integer", &value)),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|e| SqlsrvError::DecodeError(format!("{wide} out of range: {e}")))
    }
}

impl FromValue for f64 {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        match value {
            RowValues::Float(f) => Ok(f),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl FromValue for Numeric {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        match value {
            RowValues::Decimal(n) => Ok(n),
            RowValues::Int(i) => Ok(Numeric::new(i128::from(i), 0)),
            other => Err(mismatch("decimal", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        match value {
            RowValues::Text(s) => Ok(s),
            // Character columns read with the binary character set.
            RowValues::Blob(bytes) => String::from_utf8(bytes)
                .map_err(|e| SqlsrvError::DecodeError(format!("expected text, found non-UTF-8 bytes: {e}"))),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        value.as_bool().copied().ok_or_else(|| mismatch("bit", &value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        match value {
            RowValues::Blob(bytes) => Ok(bytes),
            other => Err(mismatch("binary", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        value.as_timestamp().ok_or_else(|| mismatch("timestamp", &value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: RowValues) -> Result<Self, SqlsrvError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
