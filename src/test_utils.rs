//! In-memory stand-ins for the server side: a scripted transport, a result
//! cache and a recording profiler.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::executor::cache::{CacheKey, ResultCache};
use crate::executor::profile::{Benchmark, Profiler};
use crate::manager::ConnectionManager;
use crate::results::ResultSet;
use crate::wire::{Connector, LoginRecord, Transport, TransportError, WireColumn, WireRequest, WireResponse, WireRow};

/// One scripted server response, consumed by the next `send`.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows {
        columns: Vec<WireColumn>,
        rows: Vec<WireRow>,
    },
    /// Rows followed by an error token.
    RowsThenFail {
        columns: Vec<WireColumn>,
        rows: Vec<WireRow>,
        error: TransportError,
    },
    Done {
        rows_affected: u64,
    },
    Fail(TransportError),
}

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    requests: Vec<WireRequest>,
    logins: Vec<LoginRecord>,
    rows_fetched: usize,
    closes: usize,
    login_error: Option<TransportError>,
    close_error: Option<TransportError>,
    send_delay: Option<Duration>,
}

/// Shared view of a scripted server: queue replies, then inspect what was sent.
#[derive(Clone, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, reply: Reply) -> &Self {
        self.state().replies.push_back(reply);
        self
    }

    pub fn push_rows(&self, columns: Vec<WireColumn>, rows: Vec<WireRow>) -> &Self {
        self.push(Reply::Rows { columns, rows })
    }

    pub fn push_done(&self, rows_affected: u64) -> &Self {
        self.push(Reply::Done { rows_affected })
    }

    /// Queue a server error token.
    pub fn push_server_error(&self, code: u32, message: &str) -> &Self {
        self.push(Reply::Fail(server_error(code, message)))
    }

    pub fn fail_login(&self, error: TransportError) {
        self.state().login_error = Some(error);
    }

    pub fn fail_close(&self, error: TransportError) {
        self.state().close_error = Some(error);
    }

    /// Make every `send` wait before answering.
    pub fn delay_sends(&self, delay: Duration) {
        self.state().send_delay = Some(delay);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<WireRequest> {
        self.state().requests.clone()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<WireRequest> {
        self.state().requests.last().cloned()
    }

    #[must_use]
    pub fn logins(&self) -> Vec<LoginRecord> {
        self.state().logins.clone()
    }

    /// Rows handed to the client so far, across all statements.
    #[must_use]
    pub fn rows_fetched(&self) -> usize {
        self.state().rows_fetched
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }
}

/// Builds a server error as the transport reports it.
#[must_use]
pub fn server_error(code: u32, message: &str) -> TransportError {
    TransportError::Server {
        code,
        state: 1,
        class: 16,
        message: message.to_string(),
    }
}

/// Connector whose transports answer from a [`ScriptHandle`].
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    handle: ScriptHandle,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// A [`ConnectionManager`] wired to a fresh script.
    #[must_use]
    pub fn manager() -> (ConnectionManager, ScriptHandle) {
        let (connector, handle) = Self::new();
        (ConnectionManager::new(Arc::new(connector)), handle)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, login: &LoginRecord) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.handle.state();
        if let Some(error) = state.login_error.clone() {
            return Err(error);
        }
        state.logins.push(login.clone());
        Ok(Box::new(ScriptedTransport {
            handle: self.handle.clone(),
            pending: VecDeque::new(),
        }))
    }
}

struct ScriptedTransport {
    handle: ScriptHandle,
    pending: VecDeque<Result<WireRow, TransportError>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let (reply, delay) = {
            let mut state = self.handle.state();
            state.requests.push(request);
            (state.replies.pop_front(), state.send_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.pending.clear();
        match reply {
            Some(Reply::Rows { columns, rows }) => {
                self.pending = rows.into_iter().map(Ok).collect();
                Ok(WireResponse::Rows(columns))
            }
            Some(Reply::RowsThenFail { columns, rows, error }) => {
                self.pending = rows.into_iter().map(Ok).collect();
                self.pending.push_back(Err(error));
                Ok(WireResponse::Rows(columns))
            }
            Some(Reply::Done { rows_affected }) => Ok(WireResponse::Done { rows_affected }),
            Some(Reply::Fail(error)) => Err(error),
            None => Err(TransportError::Protocol("no scripted reply left".to_string())),
        }
    }

    async fn fetch(&mut self) -> Result<Option<WireRow>, TransportError> {
        match self.pending.pop_front() {
            Some(Ok(row)) => {
                self.handle.state().rows_fetched += 1;
                Ok(Some(row))
            }
            Some(Err(error)) => {
                self.pending.clear();
                Err(error)
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state();
        state.closes += 1;
        match state.close_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A [`ResultCache`] in a `HashMap`, honouring TTLs.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, (ResultSet, Instant)>>,
    stores: Mutex<usize>,
}

impl MemoryCache {
    #[must_use]
    pub fn store_count(&self) -> usize {
        *self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Option<ResultSet> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(rows, _)| rows.clone())
    }

    async fn store(&self, key: CacheKey, rows: &ResultSet, ttl: Duration) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (rows.clone(), Instant::now() + ttl));
        *self.stores.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Keeps every reported and discarded benchmark.
#[derive(Default)]
pub struct RecordingProfiler {
    reported: Mutex<Vec<(String, String)>>,
    discarded: Mutex<Vec<(String, String)>>,
}

impl RecordingProfiler {
    /// `(group, sql)` of every stopped benchmark.
    #[must_use]
    pub fn reported(&self) -> Vec<(String, String)> {
        self.reported.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `(group, sql)` of every deleted benchmark.
    #[must_use]
    pub fn discarded(&self) -> Vec<(String, String)> {
        self.discarded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Profiler for RecordingProfiler {
    fn report(&self, benchmark: &Benchmark, _elapsed: Duration) {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((benchmark.group().to_string(), benchmark.sql().to_string()));
    }

    fn discard(&self, benchmark: &Benchmark) {
        self.discarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((benchmark.group().to_string(), benchmark.sql().to_string()));
    }
}
