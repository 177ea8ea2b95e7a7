use std::sync::LazyLock;

use regex::Regex;

use super::{LoginRecord, TransportError, WireRequest, WireValue};
use crate::config::ConnectionConfig;
use crate::error::{DriverError, SqlsrvError};
use crate::types::RowValues;

/// SQLSTATE used for every transport-level failure.
pub const NETWORK_SQL_STATE: &str = "08S01";

static SERVER_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:tcp:)?(?P<host>[^\\,\s]+)(?:\\(?P<instance>[^,\s]+))?(?:\s*,\s*(?P<port>\d+))?\s*$")
        .unwrap_or_else(|e| panic!("server address pattern: {e}"))
});

/// `host`, optional named instance, optional port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub instance: Option<String>,
    pub port: Option<u16>,
}

/// Parse `[tcp:]host[\instance][,port]`.
///
/// ```rust
/// use sqlsrv_core::wire::codec::parse_server;
///
/// let addr = parse_server(r"tcp:db.local\SQLEXPRESS,1444").unwrap();
/// assert_eq!(addr.host, "db.local");
/// assert_eq!(addr.instance.as_deref(), Some("SQLEXPRESS"));
/// assert_eq!(addr.port, Some(1444));
/// ```
///
/// # Errors
///
/// Returns `SqlsrvError::ConfigError` when the string does not match.
pub fn parse_server(server: &str) -> Result<ServerAddress, SqlsrvError> {
    let caps = SERVER_ADDRESS
        .captures(server)
        .ok_or_else(|| SqlsrvError::ConfigError(format!("malformed Server value {server:?}")))?;
    let port = caps
        .name("port")
        .map(|m| {
            m.as_str()
                .parse::<u16>()
                .map_err(|e| SqlsrvError::ConfigError(format!("invalid port in {server:?}: {e}")))
        })
        .transpose()?;
    let host = match &caps["host"] {
        "." | "(local)" => "localhost".to_string(),
        other => other.to_string(),
    };
    Ok(ServerAddress {
        host,
        instance: caps.name("instance").map(|m| m.as_str().to_string()),
        port,
    })
}

/// Build the handshake record for a configuration.
///
/// # Errors
///
/// Returns `SqlsrvError::ConfigError` for a malformed server or an empty user
/// name; integrated authentication is not available.
pub fn login_record(config: &ConnectionConfig) -> Result<LoginRecord, SqlsrvError> {
    if config.user.is_empty() {
        return Err(SqlsrvError::ConfigError(
            "UID is required; integrated authentication is not supported".to_string(),
        ));
    }
    let address = parse_server(&config.server)?;
    Ok(LoginRecord {
        host: address.host,
        port: address.port,
        instance_name: address.instance,
        database: config.database.clone(),
        user: config.user.clone(),
        password: config.password.clone(),
        application_name: config.application_name.clone(),
        trust_server_certificate: config.trust_server_certificate,
    })
}

#[must_use]
pub fn encode_param(value: &RowValues) -> WireValue {
    match value {
        RowValues::Int(i) => WireValue::BigInt(*i),
        RowValues::Float(f) => WireValue::Float(*f),
        RowValues::Decimal(n) => WireValue::Numeric(*n),
        RowValues::Text(s) => WireValue::String(s.clone()),
        RowValues::Bool(b) => WireValue::Bit(*b),
        RowValues::Timestamp(dt) => WireValue::DateTime(*dt),
        RowValues::TimestampTz(dt) => WireValue::DateTimeOffset(*dt),
        RowValues::Date(d) => WireValue::Date(*d),
        RowValues::Time(t) => WireValue::Time(*t),
        RowValues::Null => WireValue::Null,
        RowValues::JSON(v) => WireValue::String(v.to_string()),
        RowValues::Blob(bytes) => WireValue::Binary(bytes.clone()),
    }
}

/// Encode a batch whose SQL already uses native `@PN` markers.
#[must_use]
pub fn encode_request(sql: impl Into<String>, params: &[RowValues], expects_rows: bool) -> WireRequest {
    WireRequest {
        sql: sql.into(),
        params: params.iter().map(encode_param).collect(),
        expects_rows,
    }
}

/// Which operation a transport error interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Login,
    Statement,
    Close,
}

/// SQLSTATE equivalent for a server error number.
#[must_use]
pub fn sql_state_for(code: u32) -> &'static str {
    match code {
        18456 | 18452 | 4060 => "28000",
        2627 | 2601 | 547 | 515 => "23000",
        208 => "42S02",
        207 => "42S22",
        2714 => "42S01",
        102 | 156 | 170 => "42000",
        229 | 230 => "42000",
        8114 | 245 => "22018",
        8115 | 220 => "22003",
        8152 | 2628 => "22001",
        8134 => "22012",
        1205 => "40001",
        _ => "HY000",
    }
}

/// Map a transport failure to the caller-facing error for `phase`.
#[must_use]
pub fn translate_error(err: TransportError, phase: Phase, statement: Option<&str>) -> SqlsrvError {
    let with_statement = |e: DriverError| match statement {
        Some(sql) => e.with_statement(sql),
        None => e,
    };
    match err {
        TransportError::Server { code, message, .. } => {
            let driver = with_statement(DriverError::new(message, Some(code), sql_state_for(code)));
            match phase {
                Phase::Login => SqlsrvError::AuthError(driver),
                Phase::Statement | Phase::Close => SqlsrvError::QueryError(driver),
            }
        }
        TransportError::Closed if phase != Phase::Login => SqlsrvError::ConnectionClosed,
        other => SqlsrvError::NetworkError(with_statement(DriverError::new(
            other.to_string(),
            None,
            NETWORK_SQL_STATE,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Numeric;

    #[test]
    fn parses_server_forms() {
        assert_eq!(
            parse_server("db").unwrap(),
            ServerAddress {
                host: "db".into(),
                instance: None,
                port: None
            }
        );
        let addr = parse_server("TCP:10.0.0.5, 1500").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, Some(1500));
        assert_eq!(parse_server(r".\SQLEXPRESS").unwrap().host, "localhost");
        assert!(parse_server("").is_err());
        assert!(parse_server("db,99999").is_err());
    }

    #[test]
    fn login_requires_user() {
        let config = ConnectionConfig::new("db", "", "");
        assert!(matches!(login_record(&config), Err(SqlsrvError::ConfigError(_))));
        let login = login_record(&ConnectionConfig::new(r"db\inst,1500", "sa", "pw")).unwrap();
        assert_eq!(login.instance_name.as_deref(), Some("inst"));
        assert_eq!(login.port_or_default(), 1500);
        assert_eq!(login.password.expose(), "pw");
    }

    #[test]
    fn encodes_params_in_order_without_coercion() {
        let req = encode_request(
            "select @P1, @P2, @P3",
            &[
                RowValues::Decimal(Numeric::new(1999, 2)),
                RowValues::Blob(vec![0, 1]),
                RowValues::Null,
            ],
            true,
        );
        assert_eq!(
            req.params,
            vec![
                WireValue::Numeric(Numeric::new(1999, 2)),
                WireValue::Binary(vec![0, 1]),
                WireValue::Null
            ]
        );
    }

    #[test]
    fn translates_by_phase() {
        let server = || TransportError::Server {
            code: 18456,
            state: 1,
            class: 14,
            message: "Login failed for user 'sa'.".into(),
        };
        assert!(matches!(translate_error(server(), Phase::Login, None), SqlsrvError::AuthError(_)));

        let err = translate_error(server(), Phase::Statement, Some("select 1"));
        let driver = err.driver_error().unwrap();
        assert_eq!(driver.sql_state, "28000");
        assert_eq!(driver.statement.as_deref(), Some("select 1"));
        assert!(matches!(err, SqlsrvError::QueryError(_)));

        let io = translate_error(TransportError::Io("reset".into()), Phase::Statement, None);
        assert!(io.is_fatal());
        assert_eq!(io.driver_error().unwrap().sql_state, NETWORK_SQL_STATE);
        assert!(matches!(
            translate_error(TransportError::Closed, Phase::Statement, None),
            SqlsrvError::ConnectionClosed
        ));
    }
}
