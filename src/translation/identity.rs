use super::parsers::{is_ident_byte, keyword_at};
use super::scanner::{SegmentKind, segments};
use crate::error::SqlsrvError;

/// Column alias carrying the generated identity in the OUTPUT row.
pub const IDENTITY_COLUMN: &str = "lastInsertId";

const OUTPUT_CLAUSE: &str = "OUTPUT INSERTED.$IDENTITY AS lastInsertId ";

/// Inject an `OUTPUT INSERTED.$IDENTITY` clause in front of the first
/// top-level `VALUES` keyword of an INSERT.
///
/// "Top-level" means outside string literals, quoted identifiers, comments and
/// parentheses, so a `VALUES` inside `'...'` or a derived table is never
/// touched. Everything after the injection point is preserved verbatim,
/// including further rows of a multi-row VALUES list. `DEFAULT VALUES` gets the
/// clause in front of `DEFAULT`.
///
/// ```rust
/// use sqlsrv_core::translation::inject_identity_output;
///
/// let sql = inject_identity_output("INSERT INTO t (name) VALUES ('VALUES')").unwrap();
/// assert_eq!(sql, "INSERT INTO t (name) OUTPUT INSERTED.$IDENTITY AS lastInsertId VALUES ('VALUES')");
/// ```
///
/// # Errors
///
/// Returns `SqlsrvError::UnsupportedStatementError` when no top-level VALUES is
/// found or the statement already has a top-level OUTPUT clause.
pub fn inject_identity_output(sql: &str) -> Result<String, SqlsrvError> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut values_at = None;

    'scan: for seg in segments(sql) {
        if seg.kind != SegmentKind::Code {
            continue;
        }
        for idx in seg.start..seg.end {
            match bytes[idx] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ if depth == 0 && keyword_at(bytes, idx, "OUTPUT") => {
                    return Err(SqlsrvError::UnsupportedStatementError(sql.to_string()));
                }
                _ if depth == 0 && keyword_at(bytes, idx, "VALUES") => {
                    values_at = Some(idx);
                    break 'scan;
                }
                _ => {}
            }
        }
    }

    let Some(values_at) = values_at else {
        return Err(SqlsrvError::UnsupportedStatementError(sql.to_string()));
    };
    let at = preceding_default(bytes, values_at).unwrap_or(values_at);

    let mut rewritten = String::with_capacity(sql.len() + OUTPUT_CLAUSE.len());
    rewritten.push_str(&sql[..at]);
    rewritten.push_str(OUTPUT_CLAUSE);
    rewritten.push_str(&sql[at..]);
    Ok(rewritten)
}

fn preceding_default(bytes: &[u8], values_at: usize) -> Option<usize> {
    let mut end = values_at;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    (start < end && bytes[start..end].eq_ignore_ascii_case(b"DEFAULT")).then_some(start)
}
