use crate::config::CharacterSet;
use crate::types::RowValues;
use crate::wire::{WireColumn, WireValue};

/// Decode one wire cell.
///
/// Binary data always decodes to [`RowValues::Blob`]; exact numerics to
/// [`RowValues::Decimal`]. With [`CharacterSet::Binary`] character columns
/// come back as raw bytes too.
#[must_use]
pub fn decode_cell(cell: &WireValue, column: &WireColumn, charset: CharacterSet) -> RowValues {
    match cell {
        WireValue::Null => RowValues::Null,
        WireValue::Bit(b) => RowValues::Bool(*b),
        WireValue::TinyInt(v) => RowValues::Int(i64::from(*v)),
        WireValue::SmallInt(v) => RowValues::Int(i64::from(*v)),
        WireValue::Int(v) => RowValues::Int(i64::from(*v)),
        WireValue::BigInt(v) => RowValues::Int(*v),
        WireValue::Real(v) => RowValues::Float(f64::from(*v)),
        WireValue::Float(v) => RowValues::Float(*v),
        WireValue::Numeric(n) => match column.precision {
            Some(precision) => RowValues::Decimal(n.with_precision(precision)),
            None => RowValues::Decimal(*n),
        },
        WireValue::String(s) | WireValue::Xml(s) => match charset {
            CharacterSet::Utf8 => RowValues::Text(s.clone()),
            CharacterSet::Binary => RowValues::Blob(s.as_bytes().to_vec()),
        },
        WireValue::Guid(g) => RowValues::Text(g.clone()),
        WireValue::Binary(bytes) => RowValues::Blob(bytes.clone()),
        WireValue::Date(d) => RowValues::Date(*d),
        WireValue::Time(t) => RowValues::Time(*t),
        WireValue::DateTime(dt) => RowValues::Timestamp(*dt),
        WireValue::DateTimeOffset(dt) => RowValues::TimestampTz(*dt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Numeric;

    #[test]
    fn binary_never_becomes_text() {
        let col = WireColumn::new("payload", "varbinary");
        let v = decode_cell(&WireValue::Binary(b"abc".to_vec()), &col, CharacterSet::Utf8);
        assert_eq!(v, RowValues::Blob(b"abc".to_vec()));
    }

    #[test]
    fn decimals_stay_exact() {
        let col = WireColumn::new("price", "decimal");
        let v = decode_cell(&WireValue::Numeric(Numeric::new(1999, 2)), &col, CharacterSet::Utf8);
        assert_eq!(v.as_decimal().map(ToString::to_string).as_deref(), Some("19.99"));
    }

    #[test]
    fn binary_charset_returns_bytes_for_text() {
        let col = WireColumn::new("name", "nvarchar");
        let v = decode_cell(&WireValue::String("hé".into()), &col, CharacterSet::Binary);
        assert_eq!(v, RowValues::Blob("hé".as_bytes().to_vec()));
    }
}
