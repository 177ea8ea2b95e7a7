use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use crate::error::SqlsrvError;

/// Credentials are carried but never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"<redacted>\"")
    }
}

/// Encoding for character data. It is fixed when the connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CharacterSet {
    /// Character columns decode to text.
    #[default]
    Utf8,
    /// Character columns decode to raw bytes (`SQLSRV_ENC_BINARY`).
    Binary,
}

impl CharacterSet {
    /// # Errors
    ///
    /// Returns `SqlsrvError::ConfigError` for encodings the core cannot honour.
    pub fn parse(value: &str) -> Result<Self, SqlsrvError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(CharacterSet::Utf8),
            "binary" | "sqlsrv_enc_binary" => Ok(CharacterSet::Binary),
            other => Err(SqlsrvError::ConfigError(format!(
                "unsupported character set {other:?}; use UTF-8 or binary"
            ))),
        }
    }
}

/// Connection settings. Immutable once built; pass it by reference to
/// [`connect`](crate::connect).
///
/// Build it fluently:
/// ```rust
/// use sqlsrv_core::ConnectionConfig;
///
/// let config = ConnectionConfig::builder("tcp:db.local,1433", "app_user", "s3cret")
///     .database("inventory")
///     .profiling(true)
///     .finish();
/// assert_eq!(config.database.as_deref(), Some("inventory"));
/// ```
///
/// or from driver-style options, where canonical keys win over legacy aliases:
/// ```rust
/// use sqlsrv_core::ConnectionConfig;
///
/// let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
///     "Server": "db.local",
///     "UID": "app_user",
///     "PWD": "s3cret",
///     "username": "ignored-legacy-alias",
/// })).unwrap();
/// assert_eq!(config.user, "app_user");
/// ```
#[derive(Clone, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ConnectionConfig {
    /// `[tcp:]host[\instance][,port]`
    pub server: String,
    pub database: Option<String>,
    pub user: String,
    pub password: Secret,
    pub pooling: bool,
    pub character_set: CharacterSet,
    pub command_timeout: Option<Duration>,
    pub profiling: bool,
    /// Name reported in profiling benchmarks.
    pub instance: String,
    pub table_prefix: String,
    pub application_name: String,
    pub trust_server_certificate: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &"<redacted>")
            .field("password", &self.password)
            .field("pooling", &self.pooling)
            .field("character_set", &self.character_set)
            .field("command_timeout", &self.command_timeout)
            .field("profiling", &self.profiling)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(server: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: None,
            user: user.into(),
            password: Secret::new(password),
            pooling: false,
            character_set: CharacterSet::Utf8,
            command_timeout: None,
            profiling: false,
            instance: "default".to_string(),
            table_prefix: String::new(),
            application_name: "sqlsrv-core".to_string(),
            trust_server_certificate: true,
        }
    }

    #[must_use]
    pub fn builder(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::new(server, user, password),
        }
    }

    /// Parse driver-style options.
    ///
    /// Canonical keys are `Server`, `Database`, `UID`, `PWD`,
    /// `ConnectionPooling`, `CharacterSet`, `QueryTimeout` (seconds),
    /// `Profiling`, `Instance`, `TablePrefix`, `APP` and
    /// `TrustServerCertificate`. The legacy aliases `hostname`, `database`,
    /// `username`, `password` and `persistent` are dropped without complaint
    /// when the canonical key is present, and used otherwise.
    ///
    /// # Errors
    ///
    /// Returns `SqlsrvError::ConfigError` for unknown keys, malformed values, or
    /// a missing `Server`.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, SqlsrvError> {
        for key in options.keys() {
            if !CANONICAL_KEYS.contains(&key.as_str()) && legacy_target(key).is_none() {
                return Err(SqlsrvError::ConfigError(format!("unrecognized option {key:?}")));
            }
        }

        let lookup = |canonical: &str| -> Option<&Value> {
            options.get(canonical).or_else(|| {
                options
                    .iter()
                    .find(|(k, _)| legacy_target(k) == Some(canonical))
                    .map(|(_, v)| v)
            })
        };

        let server = lookup("Server")
            .map(|v| option_string("Server", v))
            .transpose()?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SqlsrvError::ConfigError("Server is required".to_string()))?;
        let user = lookup("UID").map(|v| option_string("UID", v)).transpose()?.unwrap_or_default();
        let password = lookup("PWD").map(|v| option_string("PWD", v)).transpose()?.unwrap_or_default();

        let mut config = ConnectionConfig::new(server, user, password);
        if let Some(v) = lookup("Database") {
            config.database = Some(option_string("Database", v)?).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("ConnectionPooling") {
            config.pooling = option_bool("ConnectionPooling", v)?;
        }
        if let Some(v) = lookup("CharacterSet") {
            config.character_set = CharacterSet::parse(&option_string("CharacterSet", v)?)?;
        }
        if let Some(v) = lookup("QueryTimeout") {
            let secs = option_u64("QueryTimeout", v)?;
            config.command_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = lookup("Profiling") {
            config.profiling = option_bool("Profiling", v)?;
        }
        if let Some(v) = lookup("Instance") {
            config.instance = option_string("Instance", v)?;
        }
        if let Some(v) = lookup("TablePrefix") {
            config.table_prefix = option_string("TablePrefix", v)?;
        }
        if let Some(v) = lookup("APP") {
            config.application_name = option_string("APP", v)?;
        }
        if let Some(v) = lookup("TrustServerCertificate") {
            config.trust_server_certificate = option_bool("TrustServerCertificate", v)?;
        }
        Ok(config)
    }

    /// Stable identity of the logical session: SHA-1 over server, user and
    /// password. Safe to log; the credentials cannot be read back out of it.
    #[must_use]
    pub fn identity(&self) -> ConnectionIdentity {
        let mut hasher = Sha1::new();
        hasher.update(self.server.as_bytes());
        hasher.update(b"_");
        hasher.update(self.user.as_bytes());
        hasher.update(b"_");
        hasher.update(self.password.expose().as_bytes());
        let digest: [u8; 20] = hasher.finalize().into();
        ConnectionIdentity(hex(&digest))
    }

    /// The configuration with credentials removed, for echoing back to callers.
    #[must_use]
    pub fn scrubbed(&self) -> ConnectionInfo {
        ConnectionInfo {
            server: self.server.clone(),
            database: self.database.clone(),
            pooling: self.pooling,
            character_set: self.character_set,
            command_timeout: self.command_timeout,
            profiling: self.profiling,
            instance: self.instance.clone(),
            table_prefix: self.table_prefix.clone(),
            application_name: self.application_name.clone(),
        }
    }
}

impl TryFrom<Map<String, Value>> for ConnectionConfig {
    type Error = SqlsrvError;

    fn try_from(options: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_options(&options)
    }
}

const CANONICAL_KEYS: &[&str] = &[
    "Server",
    "Database",
    "UID",
    "PWD",
    "ConnectionPooling",
    "CharacterSet",
    "QueryTimeout",
    "Profiling",
    "Instance",
    "TablePrefix",
    "APP",
    "TrustServerCertificate",
];

fn legacy_target(key: &str) -> Option<&'static str> {
    match key {
        "hostname" => Some("Server"),
        "database" => Some("Database"),
        "username" => Some("UID"),
        "password" => Some("PWD"),
        "persistent" => Some("ConnectionPooling"),
        _ => None,
    }
}

fn option_string(key: &str, value: &Value) -> Result<String, SqlsrvError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(SqlsrvError::ConfigError(format!("{key} must be a string, got {other}"))),
    }
}

fn option_bool(key: &str, value: &Value) -> Result<bool, SqlsrvError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_i64().is_some_and(|i| i != 0)),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(SqlsrvError::ConfigError(format!("{key} must be a boolean, got {s:?}"))),
        },
        Value::Null => Ok(false),
        other => Err(SqlsrvError::ConfigError(format!("{key} must be a boolean, got {other}"))),
    }
}

fn option_u64(key: &str, value: &Value) -> Result<u64, SqlsrvError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| SqlsrvError::ConfigError(format!("{key} must be a non-negative integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| SqlsrvError::ConfigError(format!("{key}: {e}"))),
        other => Err(SqlsrvError::ConfigError(format!("{key} must be an integer, got {other}"))),
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn pooling(mut self, pooling: bool) -> Self {
        self.config.pooling = pooling;
        self
    }

    #[must_use]
    pub fn character_set(mut self, character_set: CharacterSet) -> Self {
        self.config.character_set = character_set;
        self
    }

    #[must_use]
    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn profiling(mut self, profiling: bool) -> Self {
        self.config.profiling = profiling;
        self
    }

    #[must_use]
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.config.instance = instance.into();
        self
    }

    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.table_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.config.trust_server_certificate = trust;
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionConfig {
        self.config
    }
}

/// Hex SHA-1 of server, user and password.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionIdentity(String);

impl ConnectionIdentity {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration echo with no credentials in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub server: String,
    pub database: Option<String>,
    pub pooling: bool,
    pub character_set: CharacterSet,
    pub command_timeout: Option<Duration>,
    pub profiling: bool,
    pub instance: String,
    pub table_prefix: String,
    pub application_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn canonical_keys_win_over_legacy_aliases() {
        let config = ConnectionConfig::from_options(&options(json!({
            "Server": "db1",
            "hostname": "legacy-host",
            "UID": "sa",
            "username": "legacy-user",
            "PWD": "pw",
            "password": "legacy-pw",
            "Database": "app",
            "database": "legacy-db",
            "persistent": true,
        })))
        .unwrap();
        assert_eq!(config.server, "db1");
        assert_eq!(config.user, "sa");
        assert_eq!(config.password.expose(), "pw");
        assert_eq!(config.database.as_deref(), Some("app"));
        assert!(config.pooling);
    }

    #[test]
    fn legacy_aliases_fill_missing_canonical_keys() {
        let config = ConnectionConfig::from_options(&options(json!({
            "hostname": "db2",
            "username": "u",
            "password": "p",
        })))
        .unwrap();
        assert_eq!(config.server, "db2");
        assert_eq!(config.user, "u");
        assert!(!config.pooling);
        assert_eq!(config.character_set, CharacterSet::Utf8);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        assert!(ConnectionConfig::from_options(&options(json!({"Server": "x", "Bogus": 1}))).is_err());
        assert!(ConnectionConfig::from_options(&options(json!({"UID": "u"}))).is_err());
        assert!(
            ConnectionConfig::from_options(&options(json!({"Server": "x", "CharacterSet": "latin1"})))
                .is_err()
        );
        let config = ConnectionConfig::from_options(&options(json!({
            "Server": "x", "QueryTimeout": "30", "Profiling": "on"
        })))
        .unwrap();
        assert_eq!(config.command_timeout, Some(Duration::from_secs(30)));
        assert!(config.profiling);
    }

    #[test]
    fn identity_is_stable_and_credential_sensitive() {
        let a = ConnectionConfig::new("db", "u", "p");
        let b = ConnectionConfig::builder("db", "u", "p").database("other").finish();
        let c = ConnectionConfig::new("db", "u", "q");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().as_str().len(), 40);
        assert!(!a.identity().as_str().contains('p'));
    }

    #[test]
    fn debug_and_scrubbed_echo_hide_credentials() {
        let config = ConnectionConfig::new("db", "app_user", "hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("app_user"));
        let echoed = serde_json::to_string(&config.scrubbed()).unwrap();
        assert!(!echoed.contains("hunter2"));
        assert!(!echoed.contains("app_user"));
    }
}
