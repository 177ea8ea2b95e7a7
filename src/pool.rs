use std::fmt;

use deadpool::managed::{Manager, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::SqlsrvError;
use crate::manager::ConnectionManager;

/// Default upper bound on pooled sessions.
pub const DEFAULT_MAX_SIZE: usize = 16;

/// `deadpool` manager that opens and vets [`Connection`]s.
pub struct SqlsrvManager {
    manager: ConnectionManager,
    config: ConnectionConfig,
}

impl fmt::Debug for SqlsrvManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlsrvManager")
            .field("server", &self.config.server)
            .field("identity", &self.config.identity())
            .finish_non_exhaustive()
    }
}

impl Manager for SqlsrvManager {
    type Type = Connection;
    type Error = SqlsrvError;

    async fn create(&self) -> Result<Connection, SqlsrvError> {
        self.manager.connect(&self.config).await
    }

    async fn recycle(&self, conn: &mut Connection, _metrics: &Metrics) -> RecycleResult<SqlsrvError> {
        if conn.is_closed() {
            debug!(identity = %conn.identity(), "dropping closed pooled connection");
            return Err(RecycleError::Backend(SqlsrvError::ConnectionClosed));
        }
        if conn.is_busy() {
            return Err(RecycleError::Backend(SqlsrvError::ConnectionBusyError));
        }
        Ok(())
    }
}

pub type SqlsrvPool = Pool<SqlsrvManager>;
pub type PooledConnection = Object<SqlsrvManager>;

/// Build a pool of sessions for `config`.
///
/// # Arguments
///
/// * `manager` - opens each pooled session
/// * `config` - connection settings shared by every session
/// * `max_size` - upper bound on open sessions, [`DEFAULT_MAX_SIZE`] when `None`
///
/// # Errors
///
/// Returns `SqlsrvError::ConfigError` unless `ConnectionPooling` is enabled,
/// and `SqlsrvError::PoolError` if the pool cannot be built.
pub fn build_pool(
    manager: ConnectionManager,
    config: &ConnectionConfig,
    max_size: Option<usize>,
) -> Result<SqlsrvPool, SqlsrvError> {
    if !config.pooling {
        return Err(SqlsrvError::ConfigError(
            "ConnectionPooling must be enabled to build a pool".to_string(),
        ));
    }
    Pool::builder(SqlsrvManager {
        manager,
        config: config.clone(),
    })
    .max_size(max_size.unwrap_or(DEFAULT_MAX_SIZE))
    .build()
    .map_err(|e| SqlsrvError::PoolError(format!("failed to create pool: {e}")))
}

/// Check a session out of the pool.
///
/// # Errors
///
/// Connection errors are returned as they are; pool failures as `SqlsrvError::PoolError`.
pub async fn get(pool: &SqlsrvPool) -> Result<PooledConnection, SqlsrvError> {
    pool.get().await.map_err(|e| match e {
        PoolError::Backend(e) => e,
        other => SqlsrvError::PoolError(other.to_string()),
    })
}
