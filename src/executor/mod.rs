mod dispatch;

pub mod cache;
pub mod profile;

pub use cache::{CacheKey, ResultCache, execute_cached};
pub use dispatch::execute;
pub use profile::{Benchmark, Profiler, TracingProfiler};

use crate::error::SqlsrvError;
use crate::results::RowStream;
use crate::types::RowValues;

/// How the executor treats a statement's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns a lazy row stream.
    Select,
    /// Rewritten to return the generated identity.
    Insert,
    /// Returns the affected-row count.
    Other,
}

/// SQL text, its kind and the values for its placeholders.
///
/// The executor reads a statement by reference and never changes it; only
/// the copy sent to the server is rewritten.
///
/// ```rust
/// use sqlsrv_core::prelude::*;
///
/// let stmt = Statement::insert("INSERT INTO people (name, age) VALUES (:name, :age)")
///     .bind(RowValues::Text("Ada".into()))
///     .bind(RowValues::Int(36));
/// assert_eq!(stmt.kind(), StatementKind::Insert);
/// assert_eq!(stmt.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    sql: String,
    params: Vec<RowValues>,
}

impl Statement {
    /// Create a statement with no parameters
    ///
    /// # Arguments
    ///
    /// * `kind` - How the executor treats the response
    /// * `sql` - SQL text using `?`, `?N`, `:name` or `@PN` markers
    ///
    /// # Returns
    ///
    /// A `Statement` ready for [`bind`](Statement::bind) or [`with_params`](Statement::with_params)
    #[must_use]
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A `SELECT`; [`execute`] returns a lazy row stream.
    #[must_use]
    pub fn select(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Select, sql)
    }

    /// An `INSERT ... VALUES`; [`execute`] rewrites it to return the generated key.
    #[must_use]
    pub fn insert(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Insert, sql)
    }

    /// Anything else; [`execute`] returns the affected-row count.
    #[must_use]
    pub fn other(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Other, sql)
    }

    /// Append one parameter value
    ///
    /// # Arguments
    ///
    /// * `value` - Bound to the next placeholder slot, in order of first appearance
    #[must_use]
    pub fn bind(mut self, value: RowValues) -> Self {
        self.params.push(value);
        self
    }

    /// Replace all parameter values.
    #[must_use]
    pub fn with_params(mut self, params: Vec<RowValues>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }
}

/// Outcome of [`execute`], shaped by the statement kind.
#[derive(Debug)]
pub enum ExecutionResult<'c> {
    Rows(RowStream<'c>),
    Inserted {
        generated_key: RowValues,
        rows_affected: u64,
    },
    Affected(u64),
}

impl<'c> ExecutionResult<'c> {
    /// # Errors
    ///
    /// Returns `SqlsrvError::UnsupportedOperationError` when the statement did not produce rows.
    pub fn into_rows(self) -> Result<RowStream<'c>, SqlsrvError> {
        match self {
            ExecutionResult::Rows(stream) => Ok(stream),
            other => Err(SqlsrvError::UnsupportedOperationError(format!(
                "statement returned no row stream: {other:?}"
            ))),
        }
    }

    #[must_use]
    pub fn generated_key(&self) -> Option<&RowValues> {
        match self {
            ExecutionResult::Inserted { generated_key, .. } => Some(generated_key),
            _ => None,
        }
    }

    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            ExecutionResult::Inserted { rows_affected, .. } | ExecutionResult::Affected(rows_affected) => {
                Some(*rows_affected)
            }
            ExecutionResult::Rows(_) => None,
        }
    }
}
