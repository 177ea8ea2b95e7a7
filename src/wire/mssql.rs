//! `tiberius` transport.
//!
//! A worker task owns the `Client`. Statements arrive over a command channel;
//! rows go back through a bounded channel so the server is read only as fast as
//! the caller consumes. A result the caller stops reading is drained by the
//! worker before the next command, which keeps the TDS stream aligned.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::error::Error as TdsError;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, FromSql, Query, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use super::{Connector, LoginRecord, Transport, TransportError, WireColumn, WireRequest, WireResponse, WireRow, WireValue};
use crate::numeric::Numeric;

type TdsClient = Client<Compat<TcpStream>>;

/// Rows buffered between the worker and the reader.
const ROW_BUFFER: usize = 32;

/// Opens sessions with SQL Server authentication over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiberiusConnector;

#[async_trait]
impl Connector for TiberiusConnector {
    async fn open(&self, login: &LoginRecord) -> Result<Box<dyn Transport>, TransportError> {
        let config = tiberius_config(login, None);
        let client = match connect(config, login).await {
            // Azure gateways answer the first login with a redirect.
            Err(TdsError::Routing { host, port }) => {
                debug!(%host, port, "following server redirect");
                connect(tiberius_config(login, Some((host, port))), login).await
            }
            other => other,
        }
        .map_err(map_error)?;
        Ok(Box::new(TiberiusTransport::spawn(client)))
    }
}

fn tiberius_config(login: &LoginRecord, redirect: Option<(String, u16)>) -> tiberius::Config {
    let mut config = tiberius::Config::new();
    match redirect {
        Some((host, port)) => {
            config.host(host);
            config.port(port);
        }
        None => {
            config.host(&login.host);
            config.port(login.port_or_default());
            if let Some(instance) = &login.instance_name {
                config.instance_name(instance);
            }
        }
    }
    if let Some(database) = &login.database {
        config.database(database);
    }
    config.application_name(&login.application_name);
    config.authentication(AuthMethod::sql_server(&login.user, login.password.expose()));
    if login.trust_server_certificate {
        config.trust_cert();
    }
    config
}

async fn connect(config: tiberius::Config, login: &LoginRecord) -> Result<TdsClient, TdsError> {
    let tcp = if login.instance_name.is_some() && login.port.is_none() {
        TcpStream::connect_named(&config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

enum Command {
    Submit {
        request: WireRequest,
        reply: oneshot::Sender<Result<Head, TransportError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

enum Head {
    Rows {
        columns: Vec<WireColumn>,
        rows: mpsc::Receiver<Result<WireRow, TransportError>>,
    },
    Done(u64),
}

pub struct TiberiusTransport {
    commands: mpsc::Sender<Command>,
    rows: Option<mpsc::Receiver<Result<WireRow, TransportError>>>,
    worker: JoinHandle<()>,
}

impl TiberiusTransport {
    fn spawn(client: TdsClient) -> Self {
        let (commands, inbox) = mpsc::channel(1);
        let worker = tokio::spawn(run_worker(client, inbox));
        Self {
            commands,
            rows: None,
            worker,
        }
    }
}

impl Drop for TiberiusTransport {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
impl Transport for TiberiusTransport {
    async fn send(&mut self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.rows = None;
        let (reply, head) = oneshot::channel();
        self.commands
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        match head.await.map_err(|_| TransportError::Closed)?? {
            Head::Rows { columns, rows } => {
                self.rows = Some(rows);
                Ok(WireResponse::Rows(columns))
            }
            Head::Done(rows_affected) => Ok(WireResponse::Done { rows_affected }),
        }
    }

    async fn fetch(&mut self) -> Result<Option<WireRow>, TransportError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        match rows.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.rows = None;
                Err(e)
            }
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.rows = None;
        let (reply, done) = oneshot::channel();
        self.commands
            .send(Command::Close { reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        done.await.map_err(|_| TransportError::Closed)?
    }
}

async fn run_worker(mut client: TdsClient, mut inbox: mpsc::Receiver<Command>) {
    while let Some(command) = inbox.recv().await {
        match command {
            Command::Submit { request, reply } if request.expects_rows => {
                stream_rows(&mut client, request, reply).await;
            }
            Command::Submit { request, reply } => {
                let outcome = bind(request)
                    .execute(&mut client)
                    .await
                    .map(|done| Head::Done(done.rows_affected().iter().sum()))
                    .map_err(map_error);
                let _ = reply.send(outcome);
            }
            Command::Close { reply } => {
                let _ = reply.send(client.close().await.map_err(map_error));
                return;
            }
        }
    }
    debug!("transport handle dropped, worker exiting");
}

async fn stream_rows(
    client: &mut TdsClient,
    request: WireRequest,
    reply: oneshot::Sender<Result<Head, TransportError>>,
) {
    let mut stream = match bind(request).query(client).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = reply.send(Err(map_error(e)));
            return;
        }
    };
    let (columns, kinds): (Vec<WireColumn>, Vec<ColumnType>) = match stream.columns().await {
        Ok(cols) => cols
            .unwrap_or_default()
            .iter()
            .map(|c| (WireColumn::new(c.name(), type_name(c.column_type())), c.column_type()))
            .unzip(),
        Err(e) => {
            let _ = reply.send(Err(map_error(e)));
            return;
        }
    };

    let (tx, rx) = mpsc::channel(ROW_BUFFER);
    let mut forwarding = reply.send(Ok(Head::Rows { columns, rows: rx })).is_ok();

    let mut rows = stream.into_row_stream();
    loop {
        match rows.try_next().await {
            Ok(Some(row)) if forwarding => {
                let decoded = row
                    .into_iter()
                    .zip(kinds.iter().copied().chain(std::iter::repeat(ColumnType::Null)))
                    .map(|(data, kind)| wire_value(data, kind))
                    .collect::<Result<WireRow, _>>();
                if tx.send(decoded).await.is_err() {
                    debug!("row reader went away, draining remaining rows");
                    forwarding = false;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                let e = map_error(e);
                if forwarding {
                    let _ = tx.send(Err(e)).await;
                } else {
                    warn!(error = %e, "error while draining discarded rows");
                }
                break;
            }
        }
    }
}

fn bind(request: WireRequest) -> Query<'static> {
    let mut query = Query::new(request.sql);
    for param in request.params {
        match param {
            WireValue::Null => query.bind(Option::<String>::None),
            WireValue::Bit(b) => query.bind(b),
            WireValue::TinyInt(v) => query.bind(v),
            WireValue::SmallInt(v) => query.bind(v),
            WireValue::Int(v) => query.bind(v),
            WireValue::BigInt(v) => query.bind(v),
            WireValue::Real(v) => query.bind(v),
            WireValue::Float(v) => query.bind(v),
            WireValue::Numeric(n) => {
                query.bind(tiberius::numeric::Numeric::new_with_scale(n.value(), n.scale()));
            }
            WireValue::String(s) | WireValue::Guid(s) | WireValue::Xml(s) => query.bind(s),
            WireValue::Binary(bytes) => query.bind(bytes),
            WireValue::Date(d) => query.bind(d),
            WireValue::Time(t) => query.bind(t),
            WireValue::DateTime(dt) => query.bind(dt),
            WireValue::DateTimeOffset(dt) => query.bind(dt.to_rfc3339()),
        }
    }
    query
}

fn wire_value(data: ColumnData<'static>, kind: ColumnType) -> Result<WireValue, TransportError> {
    Ok(match data {
        ColumnData::U8(v) => v.map_or(WireValue::Null, WireValue::TinyInt),
        ColumnData::I16(v) => v.map_or(WireValue::Null, WireValue::SmallInt),
        ColumnData::I32(v) => v.map_or(WireValue::Null, WireValue::Int),
        ColumnData::I64(v) => v.map_or(WireValue::Null, WireValue::BigInt),
        ColumnData::F32(v) => v.map_or(WireValue::Null, WireValue::Real),
        ColumnData::F64(v) => match v {
            None => WireValue::Null,
            Some(f) if matches!(kind, ColumnType::Money | ColumnType::Money4) => {
                WireValue::Numeric(money(f))
            }
            Some(f) => WireValue::Float(f),
        },
        ColumnData::Bit(v) => v.map_or(WireValue::Null, WireValue::Bit),
        ColumnData::String(v) => v.map_or(WireValue::Null, |s| WireValue::String(s.into_owned())),
        ColumnData::Guid(v) => v.map_or(WireValue::Null, |g| WireValue::Guid(g.to_string())),
        ColumnData::Binary(v) => v.map_or(WireValue::Null, |b| WireValue::Binary(b.into_owned())),
        ColumnData::Numeric(v) => v.map_or(WireValue::Null, |n| {
            WireValue::Numeric(Numeric::new(n.value(), n.scale()).with_precision(n.precision()))
        }),
        ColumnData::Xml(v) => v.map_or(WireValue::Null, |x| WireValue::Xml(x.into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)
                .map_err(map_error)?
                .map_or(WireValue::Null, WireValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)
            .map_err(map_error)?
            .map_or(WireValue::Null, WireValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)
            .map_err(map_error)?
            .map_or(WireValue::Null, WireValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)
            .map_err(map_error)?
            .map_or(WireValue::Null, WireValue::DateTimeOffset),
        #[allow(unreachable_patterns)]
        other => {
            return Err(TransportError::Protocol(format!("unsupported column data {other:?}")));
        }
    })
}

/// Money arrives as a float scaled from a 4-decimal integer.
///
/// Only values with up to 15 significant digits come back exactly; beyond
/// that the `f64` has already lost digits. Callers needing the full `money`
/// range should `CAST(col AS decimal(19, 4))` in the query.
#[allow(clippy::cast_possible_truncation)]
fn money(value: f64) -> Numeric {
    Numeric::new((value * 10_000.0).round() as i128, 4)
}

fn type_name(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Null => "null",
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money => "money",
        ColumnType::Money4 => "smallmoney",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::BigBinary => "binary",
        ColumnType::BigVarChar => "varchar",
        ColumnType::BigChar => "char",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::NChar => "nchar",
        ColumnType::Xml => "xml",
        ColumnType::Udt => "udt",
        ColumnType::Text => "text",
        ColumnType::Image => "image",
        ColumnType::NText => "ntext",
        #[allow(unreachable_patterns)]
        _ => "sql_variant",
    }
}

fn map_error(err: TdsError) -> TransportError {
    match err {
        TdsError::Server(token) => TransportError::Server {
            code: token.code(),
            state: token.state(),
            class: token.class(),
            message: token.message().to_string(),
        },
        TdsError::Io { message, .. } => TransportError::Io(message),
        TdsError::Tls(message) => TransportError::Io(format!("tls: {message}")),
        other => TransportError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_keeps_four_decimals() {
        assert_eq!(money(19.99).to_string(), "19.9900");
        assert_eq!(money(-0.0001), Numeric::new(-1, 4));
        assert_eq!(money(12_345_678_901.2345).to_string(), "12345678901.2345");
    }

    #[test]
    fn maps_column_types_to_driver_names() {
        assert_eq!(type_name(ColumnType::Numericn), "numeric");
        assert_eq!(type_name(ColumnType::NVarchar), "nvarchar");
        assert_eq!(type_name(ColumnType::BigVarBin), "varbinary");
    }

    #[test]
    fn converts_null_and_exact_cells() {
        let cell = wire_value(ColumnData::I32(None), ColumnType::Intn).unwrap();
        assert_eq!(cell, WireValue::Null);
        let n = tiberius::numeric::Numeric::new_with_scale(1999, 2);
        let cell = wire_value(ColumnData::Numeric(Some(n)), ColumnType::Numericn).unwrap();
        assert_eq!(cell, WireValue::Numeric(Numeric::new(1999, 2).with_precision(n.precision())));
    }
}
