use std::fmt;

use thiserror::Error;

/// Details reported by the server or transport for a failed operation.
///
/// `sql_state` is the ODBC-style SQLSTATE that corresponds to the vendor code;
/// TDS itself only carries the numeric code, so the codec derives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    pub code: Option<u32>,
    pub sql_state: String,
    pub statement: Option<String>,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>, code: Option<u32>, sql_state: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            sql_state: sql_state.into(),
            statement: None,
        }
    }

    #[must_use]
    pub fn with_statement(mut self, sql: impl Into<String>) -> Self {
        self.statement = Some(sql.into());
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.message, self.sql_state)?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        if let Some(sql) = &self.statement {
            write!(f, " [ {sql} ]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SqlsrvError {
    #[error("Authentication error: {0}")]
    AuthError(DriverError),

    #[error("Network error: {0}")]
    NetworkError(DriverError),

    #[error("Query error: {0}")]
    QueryError(DriverError),

    #[error("Unsupported statement: no top-level VALUES clause to attach the identity output to [ {0} ]")]
    UnsupportedStatementError(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection is busy: drain or close the open result stream first")]
    ConnectionBusyError,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Pool error: {0}")]
    PoolError(String),
}

impl SqlsrvError {
    /// Whether the connection that produced this error must be discarded.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SqlsrvError::AuthError(_) | SqlsrvError::NetworkError(_) | SqlsrvError::ConnectionClosed
        )
    }

    /// The driver-level details, when the error came from the server or transport.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlsrvError::AuthError(e) | SqlsrvError::NetworkError(e) | SqlsrvError::QueryError(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_state_code_and_statement() {
        let err = DriverError::new("Invalid object name 't'.", Some(208), "42S02")
            .with_statement("SELECT * FROM t");
        assert_eq!(
            err.to_string(),
            "Invalid object name 't'., 42S02 (code 208) [ SELECT * FROM t ]"
        );
    }

    #[test]
    fn fatality_follows_error_class() {
        let driver = DriverError::new("boom", None, "08S01");
        assert!(SqlsrvError::NetworkError(driver.clone()).is_fatal());
        assert!(SqlsrvError::AuthError(driver.clone()).is_fatal());
        assert!(!SqlsrvError::QueryError(driver).is_fatal());
        assert!(!SqlsrvError::ConnectionBusyError.is_fatal());
    }
}
