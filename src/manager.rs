use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{DriverError, SqlsrvError};
use crate::executor::profile::{Profiler, TracingProfiler};
use crate::schema::TypeMap;
use crate::wire::Connector;
use crate::wire::codec::{self, NETWORK_SQL_STATE, Phase};

/// Opens [`Connection`]s: owns the transport connector, the profiler and the type map.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), sqlsrv_core::SqlsrvError> {
/// use sqlsrv_core::{ConnectionConfig, ConnectionManager};
///
/// let config = ConnectionConfig::builder("tcp:localhost,1433", "sa", "Passw0rd!").finish();
/// let conn = ConnectionManager::default().connect(&config).await?;
/// conn.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    profiler: Arc<dyn Profiler>,
    type_map: &'static TypeMap,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

#[cfg(feature = "mssql")]
impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Arc::new(crate::wire::mssql::TiberiusConnector))
    }
}

impl ConnectionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            profiler: Arc::new(TracingProfiler),
            type_map: TypeMap::global(),
        }
    }

    #[must_use]
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Open a session.
    ///
    /// # Errors
    ///
    /// * `ConfigError` for a malformed server address or a missing user.
    /// * `AuthError` when the server rejects the login.
    /// * `NetworkError` when it cannot be reached, or `command_timeout` expires.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Connection, SqlsrvError> {
        let login = codec::login_record(config)?;
        debug!(server = %config.server, database = ?config.database, "connecting");

        let opening = self.connector.open(&login);
        let opened = match config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, opening).await.map_err(|_| {
                SqlsrvError::NetworkError(DriverError::new(
                    format!("login timed out after {limit:?}"),
                    None,
                    NETWORK_SQL_STATE,
                ))
            })?,
            None => opening.await,
        };
        let transport = opened.map_err(|e| codec::translate_error(e, Phase::Login, None))?;

        let conn = Connection::new(transport, config, Arc::clone(&self.profiler), self.type_map);
        info!(identity = %conn.identity(), server = %config.server, "connected");
        Ok(conn)
    }
}

/// Open a session with the default `tiberius` connector.
///
/// # Errors
///
/// See [`ConnectionManager::connect`].
#[cfg(feature = "mssql")]
pub async fn connect(config: &ConnectionConfig) -> Result<Connection, SqlsrvError> {
    ConnectionManager::default().connect(config).await
}
