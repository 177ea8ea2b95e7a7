//! Boundary between the driver core and the TDS transport.
//!
//! Everything above this module talks to a [`Transport`] obtained from a
//! [`Connector`]; the `tiberius`-backed implementation lives in [`mssql`], and
//! tests substitute a scripted one. The [`codec`] turns driver-level values and
//! configuration into the wire shapes defined here, and wire errors back into
//! [`SqlsrvError`](crate::SqlsrvError).

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::Secret;
use crate::numeric::Numeric;

pub mod codec;
#[cfg(feature = "mssql")]
pub mod mssql;

/// One cell as it travels over the wire, before decoding into `RowValues`.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bit(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    Numeric(Numeric),
    String(String),
    Binary(Vec<u8>),
    Guid(String),
    Xml(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

pub type WireRow = Vec<WireValue>;

/// Result column metadata as reported in the response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireColumn {
    pub name: String,
    /// Driver type name, e.g. `int`, `nvarchar`, `decimal`.
    pub type_name: String,
    pub nullable: Option<bool>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub length: Option<u32>,
}

impl WireColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: None,
            precision: None,
            scale: None,
            length: None,
        }
    }
}

/// A batch ready for the transport: native `@PN` markers plus their values.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub sql: String,
    pub params: Vec<WireValue>,
    /// Whether the caller reads a row stream (`SELECT`, `INSERT ... OUTPUT`)
    /// or only the affected-row count.
    pub expects_rows: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireResponse {
    /// Column header; rows follow through [`Transport::fetch`].
    Rows(Vec<WireColumn>),
    Done { rows_affected: u64 },
}

/// Everything the handshake needs, built from the configuration by the codec.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub host: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub database: Option<String>,
    pub user: String,
    pub password: Secret,
    pub application_name: String,
    pub trust_server_certificate: bool,
}

impl LoginRecord {
    /// Port to dial when no named instance needs resolving.
    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(1433)
    }
}

/// Low-level failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Error token sent by the server.
    Server {
        code: u32,
        state: u8,
        class: u8,
        message: String,
    },
    /// Socket-level failure.
    Io(String),
    /// Malformed or unexpected protocol traffic.
    Protocol(String),
    /// The transport task or socket is gone.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Server { code, message, .. } => write!(f, "server error {code}: {message}"),
            TransportError::Io(msg) => write!(f, "i/o error: {msg}"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            TransportError::Closed => f.write_str("transport closed"),
        }
    }
}

/// A live session with the server.
///
/// At most one request is outstanding: after [`send`](Transport::send) returns
/// [`WireResponse::Rows`], rows are pulled with [`fetch`](Transport::fetch)
/// until it yields `None`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: WireRequest) -> Result<WireResponse, TransportError>;

    async fn fetch(&mut self) -> Result<Option<WireRow>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports; performing the network handshake is the connector's job.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, login: &LoginRecord) -> Result<Box<dyn Transport>, TransportError>;
}
