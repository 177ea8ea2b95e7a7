use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tracing::debug;

use super::{ExecutionResult, Statement, StatementKind, execute};
use crate::config::ConnectionIdentity;
use crate::connection::Connection;
use crate::error::SqlsrvError;
use crate::results::{ResultSet, RowStream};
use crate::translation::normalize_placeholders;
use crate::types::RowValues;

/// External store for materialized SELECT results.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Option<ResultSet>;

    async fn store(&self, key: CacheKey, rows: &ResultSet, ttl: Duration);
}

/// Hex SHA-1 over the connection identity, the normalized SQL and the
/// JSON-encoded parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `sql` must already be normalized so that `?` and `:name` spellings of
    /// the same statement share one entry.
    ///
    /// # Errors
    ///
    /// Returns `SqlsrvError::ParameterError` if the parameters cannot be serialized.
    pub fn new(identity: &ConnectionIdentity, sql: &str, params: &[RowValues]) -> Result<Self, SqlsrvError> {
        let params = serde_json::to_string(params)
            .map_err(|e| SqlsrvError::ParameterError(format!("cannot serialize parameters: {e}")))?;
        let mut hasher = Sha1::new();
        hasher.update(identity.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(sql.as_bytes());
        hasher.update(b"\n");
        hasher.update(params.as_bytes());
        let digest = hasher.finalize();
        Ok(Self(digest.iter().map(|b| format!("{b:02x}")).collect()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execute through a result cache.
///
/// Only a `Select` with a positive `ttl` consults the cache; everything else
/// goes straight to [`execute`]. On a miss the rows are drained, stored, and
/// served back from memory, so the returned stream never holds the connection.
///
/// # Errors
///
/// Returns `SqlsrvError::ConnectionClosed` on a closed connection, even when
/// the result is cached. Propagates errors from [`execute`] and from draining
/// the stream.
pub async fn execute_cached<'c>(
    conn: &'c Connection,
    statement: &Statement,
    cache: &dyn ResultCache,
    ttl: Option<Duration>,
) -> Result<ExecutionResult<'c>, SqlsrvError> {
    if conn.is_closed() {
        return Err(SqlsrvError::ConnectionClosed);
    }
    let ttl = match ttl {
        Some(ttl) if statement.kind() == StatementKind::Select && !ttl.is_zero() => ttl,
        _ => return execute(conn, statement).await,
    };

    let normalized = normalize_placeholders(statement.sql())?;
    let key = CacheKey::new(conn.identity(), &normalized.sql, statement.params())?;

    if let Some(hit) = cache.lookup(&key).await {
        debug!(key = %key, rows = hit.results.len(), "result cache hit");
        return Ok(ExecutionResult::Rows(RowStream::from_result_set(conn, &hit)));
    }

    let rows = execute(conn, statement).await?.into_rows()?.collect().await?;
    debug!(key = %key, rows = rows.results.len(), ?ttl, "result cache store");
    cache.store(key, &rows, ttl).await;
    Ok(ExecutionResult::Rows(RowStream::from_result_set(conn, &rows)))
}
