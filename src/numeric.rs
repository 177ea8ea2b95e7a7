use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::SqlsrvError;

/// SQL Server allows at most 38 significant digits in `decimal`/`numeric`.
pub const MAX_PRECISION: u8 = 38;

/// An exact decimal as SQL Server stores it: an integer mantissa and a scale.
///
/// `decimal`, `numeric` and the money types decode into this instead of `f64`,
/// so `19.99` stays `19.99`. Equality is representational: `19.990` and
/// `19.99` differ in scale and compare unequal.
///
/// `decimal` and `numeric` are exact end to end. Money is handed over by the
/// tiberius transport as `f64`, so `money` values with more than 15
/// significant digits lose precision before they get here; cast such columns
/// to `decimal(19, 4)` when every digit matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Numeric {
    value: i128,
    scale: u8,
    precision: u8,
}

impl Numeric {
    #[must_use]
    pub fn new(value: i128, scale: u8) -> Self {
        let digits = digit_count(value.unsigned_abs());
        let precision = digits.max(scale.saturating_add(1)).min(MAX_PRECISION);
        Self {
            value,
            scale,
            precision,
        }
    }

    /// Keep the precision the driver reported for the column.
    #[must_use]
    pub fn with_precision(mut self, precision: u8) -> Self {
        if precision > 0 {
            self.precision = precision.min(MAX_PRECISION);
        }
        self
    }

    #[must_use]
    pub fn value(&self) -> i128 {
        self.value
    }

    #[must_use]
    pub fn scale(&self) -> u8 {
        self.scale
    }

    #[must_use]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The integral value, if the scale is zero or every fractional digit is zero.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        let divisor = 10_i128.checked_pow(u32::from(self.scale))?;
        if self.value % divisor != 0 {
            return None;
        }
        i64::try_from(self.value / divisor).ok()
    }
}

fn digit_count(mut v: u128) -> u8 {
    let mut n = 1;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.value < 0 { "-" } else { "" };
        let digits = self.value.unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Numeric {
    type Err = SqlsrvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SqlsrvError::ParameterError(format!("invalid decimal literal: {s:?}"));
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let significant = int_part.trim_start_matches('0').len() + frac_part.len();
        if significant > usize::from(MAX_PRECISION) {
            return Err(SqlsrvError::ParameterError(format!(
                "decimal literal exceeds {MAX_PRECISION} digits: {s:?}"
            )));
        }
        let scale = u8::try_from(frac_part.len()).map_err(|_| invalid())?;
        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa * 10 + i128::from(b - b'0');
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(Numeric::new(mantissa, scale))
    }
}

impl Serialize for Numeric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_without_float_drift() {
        assert_eq!(Numeric::new(1999, 2).to_string(), "19.99");
        assert_eq!(Numeric::new(5, 2).to_string(), "0.05");
        assert_eq!(Numeric::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Numeric::new(42, 0).to_string(), "42");
    }

    #[test]
    fn parses_literals() {
        let n: Numeric = "19.99".parse().unwrap();
        assert_eq!((n.value(), n.scale(), n.precision()), (1999, 2, 4));
        assert_eq!(n.to_string(), "19.99");

        let n: Numeric = "-0.50".parse().unwrap();
        assert_eq!((n.value(), n.scale()), (-50, 2));
        assert_eq!(n.to_string(), "-0.50");

        assert!("1.2.3".parse::<Numeric>().is_err());
        assert!("".parse::<Numeric>().is_err());
        assert!("12e3".parse::<Numeric>().is_err());
    }

    #[test]
    fn integral_values_convert() {
        assert_eq!(Numeric::new(700, 2).to_i64(), Some(7));
        assert_eq!(Numeric::new(701, 2).to_i64(), None);
        assert_eq!(Numeric::new(12, 0).to_i64(), Some(12));
    }
}
