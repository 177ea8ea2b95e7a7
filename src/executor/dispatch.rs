use tracing::debug;

use super::profile::Benchmark;
use super::{ExecutionResult, Statement, StatementKind};
use crate::connection::Connection;
use crate::error::{DriverError, SqlsrvError};
use crate::results::{ColumnSet, RowStream, decode_cell};
use crate::translation::{IDENTITY_COLUMN, inject_identity_output, normalize_placeholders};
use crate::types::RowValues;
use crate::wire::codec;
use crate::wire::{WireColumn, WireRequest, WireResponse};

const NO_IDENTITY: &str = "Unable to get the last inserted row ID from driver";

/// Run a statement on a connection.
///
/// Placeholders are normalized to `@PN` and, for an INSERT, an
/// `OUTPUT INSERTED.$IDENTITY` clause is injected so the generated key comes
/// back in the same round trip. A SELECT returns a [`RowStream`] that holds
/// the connection until it is drained, closed or dropped.
///
/// # Errors
///
/// * `ParameterError` when the placeholder count and the parameter count differ.
/// * `UnsupportedStatementError` for an INSERT without a top-level VALUES.
/// * `ConnectionBusyError` while another statement or stream holds the session.
/// * `QueryError` for server-side failures, `NetworkError` for transport ones.
pub async fn execute<'c>(
    conn: &'c Connection,
    statement: &Statement,
) -> Result<ExecutionResult<'c>, SqlsrvError> {
    let request = prepare(statement)?;
    let guard = conn.acquire()?;

    let benchmark = conn
        .info()
        .profiling
        .then(|| Benchmark::start(format!("Database ({})", conn.info().instance), &request.sql));

    let outcome = dispatch(conn, statement.kind(), request).await;

    match &outcome {
        Ok(ExecutionResult::Rows(stream)) if stream.holds_session() => guard.keep_busy(),
        _ => guard.release(),
    }
    if let Some(benchmark) = benchmark {
        match &outcome {
            Ok(_) => benchmark.stop(conn.profiler()),
            Err(_) => benchmark.delete(conn.profiler()),
        }
    }
    outcome
}

/// Build the request the server sees; the statement itself is untouched.
pub(crate) fn prepare(statement: &Statement) -> Result<WireRequest, SqlsrvError> {
    let normalized = normalize_placeholders(statement.sql())?;
    if normalized.marker_count != statement.params().len() {
        return Err(SqlsrvError::ParameterError(format!(
            "statement has {} placeholder(s) but {} parameter(s) were bound [ {} ]",
            normalized.marker_count,
            statement.params().len(),
            statement.sql()
        )));
    }
    let sql = match statement.kind() {
        StatementKind::Insert => inject_identity_output(&normalized.sql)?,
        StatementKind::Select | StatementKind::Other => normalized.sql.into_owned(),
    };
    Ok(codec::encode_request(
        sql,
        statement.params(),
        statement.kind() != StatementKind::Other,
    ))
}

async fn dispatch<'c>(
    conn: &'c Connection,
    kind: StatementKind,
    request: WireRequest,
) -> Result<ExecutionResult<'c>, SqlsrvError> {
    let sql = request.sql.clone();
    let response = conn.submit(request).await?;
    match (kind, response) {
        (StatementKind::Select, WireResponse::Rows(columns)) => Ok(ExecutionResult::Rows(RowStream::live(
            conn,
            ColumnSet::shared(columns, conn.character_set()),
            sql,
        ))),
        (StatementKind::Select, WireResponse::Done { .. }) => Ok(ExecutionResult::Rows(
            RowStream::materialized(conn, ColumnSet::shared(Vec::new(), conn.character_set()), Vec::new()),
        )),
        (StatementKind::Insert, WireResponse::Rows(columns)) => read_generated_key(conn, &columns, &sql).await,
        (StatementKind::Insert, WireResponse::Done { .. }) => Err(no_identity(&sql)),
        (StatementKind::Other, WireResponse::Done { rows_affected }) => {
            debug!(rows_affected, "statement completed");
            Ok(ExecutionResult::Affected(rows_affected))
        }
        (StatementKind::Other, WireResponse::Rows(_)) => {
            let mut rows = 0;
            while conn.fetch_row(&sql).await?.is_some() {
                rows += 1;
            }
            Ok(ExecutionResult::Affected(rows))
        }
    }
}

/// The first OUTPUT row carries the key; every OUTPUT row is one inserted row.
async fn read_generated_key<'c>(
    conn: &'c Connection,
    columns: &[WireColumn],
    sql: &str,
) -> Result<ExecutionResult<'c>, SqlsrvError> {
    let key_index = columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(IDENTITY_COLUMN))
        .unwrap_or(0);

    let mut generated_key: Option<RowValues> = None;
    let mut rows_affected = 0u64;
    while let Some(row) = conn.fetch_row(sql).await? {
        rows_affected += 1;
        if generated_key.is_none() {
            generated_key = match (row.get(key_index), columns.get(key_index)) {
                (Some(cell), Some(column)) => Some(decode_cell(cell, column, conn.character_set())),
                _ => None,
            };
        }
    }

    match generated_key {
        Some(generated_key) if !generated_key.is_null() => {
            debug!(rows_affected, key = ?generated_key, "insert completed");
            Ok(ExecutionResult::Inserted {
                generated_key,
                rows_affected,
            })
        }
        _ => Err(no_identity(sql)),
    }
}

fn no_identity(sql: &str) -> SqlsrvError {
    SqlsrvError::QueryError(DriverError::new(NO_IDENTITY, None, "HY000").with_statement(sql))
}
