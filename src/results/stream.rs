use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::hydrate::FromRow;
use super::result_set::ResultSet;
use super::row::{ColumnSet, Row};
use crate::connection::Connection;
use crate::error::SqlsrvError;
use crate::wire::codec::encode_param;
use crate::wire::{WireColumn, WireRow};

#[derive(Debug)]
enum Source {
    /// Rows still on the wire; the stream owns the connection until it ends.
    Live { sql: String },
    /// Rows already in memory, e.g. served from a result cache.
    Materialized(VecDeque<WireRow>),
}

/// A lazy, forward-only cursor over one SELECT result.
///
/// Rows are pulled from the server one [`next`](RowStream::next) at a time.
/// While a live stream is unfinished its connection is busy. Drain it, call
/// [`close`](RowStream::close), or drop it; a dropped stream's leftover rows
/// are discarded before the connection's next statement.
#[derive(Debug)]
pub struct RowStream<'c> {
    conn: &'c Connection,
    columns: Arc<ColumnSet>,
    source: Source,
    finished: bool,
}

impl<'c> RowStream<'c> {
    pub(crate) fn live(conn: &'c Connection, columns: Arc<ColumnSet>, sql: String) -> Self {
        Self {
            conn,
            columns,
            source: Source::Live { sql },
            finished: false,
        }
    }

    pub(crate) fn materialized(conn: &'c Connection, columns: Arc<ColumnSet>, rows: Vec<WireRow>) -> Self {
        Self {
            conn,
            columns,
            source: Source::Materialized(rows.into()),
            finished: false,
        }
    }

    /// Serve a materialized result through the same cursor interface.
    pub(crate) fn from_result_set(conn: &'c Connection, rows: &ResultSet) -> Self {
        let cells = rows
            .results
            .iter()
            .map(|row| row.rows.iter().map(encode_param).collect())
            .collect();
        Self::materialized(conn, Arc::clone(rows.column_set()), cells)
    }

    #[must_use]
    pub fn columns(&self) -> &[WireColumn] {
        self.columns.columns()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether this stream still has rows pending on the connection.
    pub(crate) fn holds_session(&self) -> bool {
        matches!(self.source, Source::Live { .. }) && !self.finished
    }

    /// The next row, or `None` once the result is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the server or transport error that ended the stream; the stream
    /// is finished afterwards.
    pub async fn next(&mut self) -> Result<Option<Row>, SqlsrvError> {
        if self.finished {
            return Ok(None);
        }
        match &mut self.source {
            Source::Materialized(rows) => match rows.pop_front() {
                Some(cells) => Ok(Some(Row::new(Arc::clone(&self.columns), cells))),
                None => {
                    self.finished = true;
                    Ok(None)
                }
            },
            Source::Live { sql } => {
                let guard = self.conn.guard_fetch();
                match self.conn.fetch_row(sql).await {
                    Ok(Some(cells)) => {
                        guard.keep_busy();
                        Ok(Some(Row::new(Arc::clone(&self.columns), cells)))
                    }
                    Ok(None) => {
                        guard.release();
                        self.finished = true;
                        Ok(None)
                    }
                    Err(e) => {
                        guard.release();
                        self.finished = true;
                        Err(e)
                    }
                }
            }
        }
    }

    /// The next row hydrated into `T`.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and `T::from_row` failures.
    pub async fn next_as<T: FromRow>(&mut self) -> Result<Option<T>, SqlsrvError> {
        match self.next().await? {
            Some(row) => T::from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Read and drop the remaining rows, freeing the connection.
    ///
    /// # Errors
    ///
    /// Returns the first error met while draining.
    pub async fn close(mut self) -> Result<(), SqlsrvError> {
        while self.next().await?.is_some() {}
        Ok(())
    }

    /// Drain the stream into a [`ResultSet`].
    ///
    /// # Errors
    ///
    /// Returns the first error met while reading.
    pub async fn collect(mut self) -> Result<ResultSet, SqlsrvError> {
        let mut result_set = ResultSet::with_capacity(Arc::clone(&self.columns), 16);
        while let Some(row) = self.next().await? {
            result_set.add_row(&row);
        }
        Ok(result_set)
    }

    /// Drain the stream, hydrating every row.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and `T::from_row` failures.
    pub async fn collect_as<T: FromRow>(mut self) -> Result<Vec<T>, SqlsrvError> {
        let mut out = Vec::new();
        while let Some(item) = self.next_as::<T>().await? {
            out.push(item);
        }
        Ok(out)
    }
}

impl Drop for RowStream<'_> {
    fn drop(&mut self) {
        if !self.holds_session() {
            return;
        }
        if let Source::Live { sql } = &mut self.source {
            debug!(sql = %sql, "row stream dropped before the end; rows will be discarded");
            self.conn.schedule_discard(std::mem::take(sql));
        }
    }
}
