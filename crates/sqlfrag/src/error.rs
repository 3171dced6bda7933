//! Error types for sqlfrag

use thiserror::Error;

/// Result type alias for sqlfrag operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors raised while composing fragments or running them against a database.
#[derive(Debug, Error)]
pub enum SqlError {
    /// Template text contains a `%` sequence that is not `%s`, `%(name)s` or `%%`
    #[error("Malformed SQL template at byte {position}: {message}")]
    MalformedTemplate { position: usize, message: String },

    /// Placeholder count and argument count disagree, or a named argument is missing
    #[error("Argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// Misuse of the construction API (e.g. positional and named arguments together)
    #[error("Construction error: {0}")]
    Construction(String),

    /// Identifier rejected by the identifier grammar
    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A schema mutation could not be applied
    #[error("Schema error: {0}")]
    Schema(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SqlError {
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            position,
            message: message.into(),
        }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::ArgumentMismatch(message.into())
    }

    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// True for errors raised before any SQL reached the database.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedTemplate { .. }
                | Self::ArgumentMismatch(_)
                | Self::Construction(_)
                | Self::InvalidIdentifier(_)
        )
    }

    /// Parse a tokio_postgres error into a more specific SqlError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for SqlError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
