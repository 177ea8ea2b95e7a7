use std::borrow::Cow;

mod identity;
mod parsers;
mod scanner;

pub use identity::{IDENTITY_COLUMN, inject_identity_output};
pub(crate) use scanner::{SegmentKind, segments};

use parsers::{is_ident_byte, is_ident_start, scan_digits, scan_ident};

use crate::error::SqlsrvError;

/// Placeholder styles accepted in caller SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// `?` and `:name`, numbered left to right, one slot per occurrence.
    Sequential,
    /// `?N` and the native `@PN`; the number is the parameter slot.
    Numbered,
}

/// SQL with every placeholder rewritten to the native `@PN` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSql<'a> {
    pub sql: Cow<'a, str>,
    /// Number of parameter slots the SQL refers to.
    pub marker_count: usize,
    pub style: Option<MarkerStyle>,
}

enum Marker {
    Sequential,
    Numbered(usize),
}

/// Rewrite framework-style placeholders to SQL Server's native `@P1`, `@P2`, ...
///
/// Only code is scanned; string literals, quoted identifiers and comments are
/// copied through untouched. `:name` is a marker only when it is not part of a
/// `::` scope qualifier.
///
/// ```rust
/// use sqlsrv_core::translation::normalize_placeholders;
///
/// let n = normalize_placeholders("select * from t where a = :a and b = '?' and c = ?").unwrap();
/// assert_eq!(n.sql, "select * from t where a = @P1 and b = '?' and c = @P2");
/// assert_eq!(n.marker_count, 2);
/// ```
///
/// # Errors
///
/// Returns `SqlsrvError::ParameterError` when sequential and numbered markers
/// are mixed, or a numbered marker is `0`.
pub fn normalize_placeholders(sql: &str) -> Result<NormalizedSql<'_>, SqlsrvError> {
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut style: Option<MarkerStyle> = None;
    let mut sequential = 0usize;
    let mut highest = 0usize;
    let mut copied_to = 0usize;

    for seg in segments(sql) {
        if seg.kind != SegmentKind::Code {
            continue;
        }
        let mut idx = seg.start;
        while idx < seg.end {
            let Some((marker, marker_end)) = marker_at(bytes, idx, seg.end) else {
                idx += 1;
                continue;
            };

            let this_style = match marker {
                Marker::Sequential => MarkerStyle::Sequential,
                Marker::Numbered(_) => MarkerStyle::Numbered,
            };
            match style {
                Some(existing) if existing != this_style => {
                    return Err(SqlsrvError::ParameterError(format!(
                        "mixed positional and numbered placeholders in [ {sql} ]"
                    )));
                }
                _ => style = Some(this_style),
            }

            let slot = match marker {
                Marker::Sequential => {
                    sequential += 1;
                    sequential
                }
                Marker::Numbered(0) => {
                    return Err(SqlsrvError::ParameterError(format!(
                        "placeholder numbers start at 1 in [ {sql} ]"
                    )));
                }
                Marker::Numbered(n) => {
                    highest = highest.max(n);
                    n
                }
            };

            let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
            buf.push_str(&sql[copied_to..idx]);
            buf.push_str("@P");
            buf.push_str(&slot.to_string());
            copied_to = marker_end;
            idx = marker_end;
        }
    }

    let marker_count = match style {
        Some(MarkerStyle::Sequential) => sequential,
        Some(MarkerStyle::Numbered) => highest,
        None => 0,
    };

    let sql = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    };

    Ok(NormalizedSql {
        sql,
        marker_count,
        style,
    })
}

fn marker_at(bytes: &[u8], idx: usize, end: usize) -> Option<(Marker, usize)> {
    let prev = if idx == 0 { None } else { Some(bytes[idx - 1]) };
    match bytes[idx] {
        b'?' => match scan_digits(&bytes[..end], idx + 1) {
            Some((digits_end, digits)) => {
                let n = digits.parse().ok()?;
                Some((Marker::Numbered(n), digits_end))
            }
            None => Some((Marker::Sequential, idx + 1)),
        },
        b':' => {
            if prev.is_some_and(|p| p == b':' || is_ident_byte(p)) {
                return None;
            }
            let name_start = idx + 1;
            if name_start >= end || !is_ident_start(bytes[name_start]) {
                return None;
            }
            let name_end = scan_ident(&bytes[..end], name_start);
            Some((Marker::Sequential, name_end))
        }
        b'@' => {
            if prev.is_some_and(|p| p == b'@' || is_ident_byte(p)) {
                return None;
            }
            if !matches!(bytes.get(idx + 1), Some(b'P' | b'p')) || idx + 2 >= end {
                return None;
            }
            let (digits_end, digits) = scan_digits(&bytes[..end], idx + 2)?;
            if digits_end < end && is_ident_byte(bytes[digits_end]) {
                return None;
            }
            let n = digits.parse().ok()?;
            Some((Marker::Numbered(n), digits_end))
        }
        _ => None,
    }
}
