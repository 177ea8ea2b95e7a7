use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CharacterSet, ConnectionConfig, ConnectionIdentity, ConnectionInfo};
use crate::error::{DriverError, SqlsrvError};
use crate::executor::profile::Profiler;
use crate::executor::{ExecutionResult, Statement};
use crate::schema::{IdentifierQuoter, TableColumns, TypeMap};
use crate::wire::codec::{self, Phase};
use crate::wire::{Transport, TransportError, WireRequest, WireResponse, WireRow};

/// SQLSTATE reported when `command_timeout` expires.
const TIMEOUT_SQL_STATE: &str = "HYT00";

struct Session {
    transport: Option<Box<dyn Transport>>,
    last_query: Option<String>,
}

/// One live session with at most one statement in flight.
///
/// Every method takes `&self`. Starting a statement while another one, or an
/// undrained [`RowStream`](crate::results::RowStream), still holds the session
/// fails with [`SqlsrvError::ConnectionBusyError`]. After [`disconnect`] or a
/// fatal error every operation fails with [`SqlsrvError::ConnectionClosed`].
///
/// [`disconnect`]: Connection::disconnect
pub struct Connection {
    session: Mutex<Session>,
    info: ConnectionInfo,
    identity: ConnectionIdentity,
    profiler: Arc<dyn Profiler>,
    type_map: &'static TypeMap,
    closed: AtomicBool,
    busy: AtomicBool,
    /// SQL of a dropped stream whose rows are still on the wire.
    pending_discard: StdMutex<Option<String>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("info", &self.info)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .field("busy", &self.busy.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        config: &ConnectionConfig,
        profiler: Arc<dyn Profiler>,
        type_map: &'static TypeMap,
    ) -> Self {
        Self {
            session: Mutex::new(Session {
                transport: Some(transport),
                last_query: None,
            }),
            info: config.scrubbed(),
            identity: config.identity(),
            profiler,
            type_map,
            closed: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            pending_discard: StdMutex::new(None),
        }
    }

    /// Run a statement. See [`crate::execute`].
    ///
    /// # Errors
    ///
    /// Propagates the executor's errors.
    pub async fn execute(&self, statement: &Statement) -> Result<ExecutionResult<'_>, SqlsrvError> {
        crate::executor::execute(self, statement).await
    }

    /// # Errors
    ///
    /// See [`crate::schema::introspect_tables`].
    pub async fn introspect_tables(&self, pattern: Option<&str>) -> Result<Vec<String>, SqlsrvError> {
        crate::schema::introspect_tables(self, pattern).await
    }

    /// # Errors
    ///
    /// See [`crate::schema::introspect_columns`].
    pub async fn introspect_columns(
        &self,
        table: &str,
        column_pattern: Option<&str>,
    ) -> Result<TableColumns, SqlsrvError> {
        crate::schema::introspect_columns(self, table, column_pattern).await
    }

    /// Release the session. Idempotent: once the handle is closed, further
    /// calls return `true`. Returns `false` only when the server-side close
    /// failed; the handle is closed regardless.
    pub async fn disconnect(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            // A fatal error may have closed the flag without taking the transport.
            self.session.lock().await.transport.take();
            return true;
        }
        let transport = self.session.lock().await.transport.take();
        self.busy.store(false, Ordering::Release);
        let Some(mut transport) = transport else {
            return true;
        };
        match transport.close().await {
            Ok(()) => {
                info!(identity = %self.identity, "disconnected");
                true
            }
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "close failed; handle released");
                false
            }
        }
    }

    /// The character set is fixed at connect time.
    ///
    /// # Errors
    ///
    /// Always returns `SqlsrvError::UnsupportedOperationError`.
    pub fn set_charset(&self, charset: &str) -> Result<(), SqlsrvError> {
        Err(SqlsrvError::UnsupportedOperationError(format!(
            "cannot switch to {charset:?}: the character set is chosen when connecting"
        )))
    }

    /// Configuration echo with the credentials removed.
    #[must_use]
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    #[must_use]
    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    #[must_use]
    pub fn character_set(&self) -> CharacterSet {
        self.info.character_set
    }

    #[must_use]
    pub fn type_map(&self) -> &'static TypeMap {
        self.type_map
    }

    /// Identifier quoter carrying this connection's table prefix.
    #[must_use]
    pub fn quoter(&self) -> IdentifierQuoter {
        IdentifierQuoter::new(self.info.table_prefix.clone())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The SQL most recently sent to the server, after rewriting.
    pub async fn last_query(&self) -> Option<String> {
        self.session.lock().await.last_query.clone()
    }

    pub(crate) fn profiler(&self) -> &dyn Profiler {
        self.profiler.as_ref()
    }

    /// Claim the session for one statement.
    pub(crate) fn acquire(&self) -> Result<StatementGuard<'_>, SqlsrvError> {
        if self.is_closed() {
            return Err(SqlsrvError::ConnectionClosed);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SqlsrvError::ConnectionBusyError);
        }
        Ok(StatementGuard {
            conn: self,
            armed: true,
        })
    }

    /// Guard one fetch of an open row stream.
    pub(crate) fn guard_fetch(&self) -> StatementGuard<'_> {
        StatementGuard {
            conn: self,
            armed: true,
        }
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// An unfinished row stream was dropped; skip its rows before the next statement.
    pub(crate) fn schedule_discard(&self, statement: String) {
        *self.pending_discard.lock().unwrap_or_else(PoisonError::into_inner) = Some(statement);
        self.release();
    }

    pub(crate) async fn submit(&self, request: WireRequest) -> Result<WireResponse, SqlsrvError> {
        let mut session = self.session.lock().await;
        if self.is_closed() || session.transport.is_none() {
            return Err(SqlsrvError::ConnectionClosed);
        }
        let statement = request.sql.clone();
        session.last_query = Some(statement.clone());

        let discarded = self
            .pending_discard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = discarded {
            let drained = match session.transport.as_mut() {
                Some(transport) => self.with_deadline(&previous, drain(transport.as_mut())).await,
                None => Err(SqlsrvError::ConnectionClosed),
            };
            match drained {
                Ok(rows) => debug!(rows, sql = %previous, "discarded unread rows"),
                Err(e) if e.is_fatal() => return Err(self.fail(&mut session, e)),
                // The error ended the dropped statement, not this one.
                Err(e) => warn!(sql = %previous, error = %e, "dropped row stream ended with an error"),
            }
        }

        debug!(sql = %statement, params = request.params.len(), "submitting statement");
        let response = match session.transport.as_mut() {
            Some(transport) => self.with_deadline(&statement, transport.send(request)).await,
            None => Err(SqlsrvError::ConnectionClosed),
        };
        response.map_err(|e| self.fail(&mut session, e))
    }

    pub(crate) async fn fetch_row(&self, statement: &str) -> Result<Option<WireRow>, SqlsrvError> {
        let mut session = self.session.lock().await;
        if self.is_closed() {
            return Err(SqlsrvError::ConnectionClosed);
        }
        let row = match session.transport.as_mut() {
            Some(transport) => self.with_deadline(statement, transport.fetch()).await,
            None => Err(SqlsrvError::ConnectionClosed),
        };
        row.map_err(|e| self.fail(&mut session, e))
    }

    async fn with_deadline<T, F>(&self, statement: &str, work: F) -> Result<T, SqlsrvError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        let outcome = match self.info.command_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SqlsrvError::NetworkError(
                        DriverError::new(
                            format!("command timed out after {limit:?}"),
                            None,
                            TIMEOUT_SQL_STATE,
                        )
                        .with_statement(statement),
                    ));
                }
            },
            None => work.await,
        };
        outcome.map_err(|e| codec::translate_error(e, Phase::Statement, Some(statement)))
    }

    fn fail(&self, session: &mut Session, err: SqlsrvError) -> SqlsrvError {
        if err.is_fatal() {
            warn!(identity = %self.identity, error = %err, "closing connection after fatal error");
            session.transport = None;
            self.closed.store(true, Ordering::Release);
        }
        err
    }

    fn abandon(&self) {
        warn!(identity = %self.identity, "statement dropped before completion; closing connection");
        self.closed.store(true, Ordering::Release);
        self.busy.store(false, Ordering::Release);
        if let Ok(mut session) = self.session.try_lock() {
            session.transport = None;
        }
    }
}

async fn drain(transport: &mut dyn Transport) -> Result<u64, TransportError> {
    let mut rows = 0;
    while transport.fetch().await?.is_some() {
        rows += 1;
    }
    Ok(rows)
}

/// Marks a statement in flight. Dropping it before [`release`] or
/// [`keep_busy`] means the caller cancelled mid-statement, and the
/// connection is closed.
///
/// [`release`]: StatementGuard::release
/// [`keep_busy`]: StatementGuard::keep_busy
#[must_use]
pub(crate) struct StatementGuard<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl StatementGuard<'_> {
    /// The statement is over and the session is free.
    pub(crate) fn release(mut self) {
        self.armed = false;
        self.conn.release();
    }

    /// The statement completed its current step; a row stream still owns the session.
    pub(crate) fn keep_busy(mut self) {
        self.armed = false;
    }
}

impl Drop for StatementGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.abandon();
        }
    }
}

/// Release a connection. See [`Connection::disconnect`].
pub async fn disconnect(conn: &Connection) -> bool {
    conn.disconnect().await
}
