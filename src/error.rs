//! Error types for the connection registry.
//!
//! All errors in this crate funnel through [`DbError`], defined with
//! `thiserror`. Driver-level failures from sqlx are converted via `From`
//! so callers only ever see one error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid DSN: {message}")]
    Parse { message: String },

    #[error("Connection '{name}' is already configured")]
    DuplicateConfig { name: String },

    #[error("Connection '{name}' is not configured")]
    NotFound { name: String },

    #[error("No driver registered for '{driver}'")]
    MissingDriver { driver: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Backend error: {message}")]
    Backend {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a DSN parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a duplicate-configuration error.
    pub fn duplicate_config(name: impl Into<String>) -> Self {
        Self::DuplicateConfig { name: name.into() }
    }

    /// Create a not-found error for an unregistered connection name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a missing-driver error.
    pub fn missing_driver(driver: impl Into<String>) -> Self {
        Self::MissingDriver {
            driver: driver.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a backend error with optional SQL state.
    pub fn backend(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Backend {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::backend(db_err.message(), code)
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or the pool size",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            _ => DbError::internal(format!("Unexpected driver error: {}", err)),
        }
    }
}

/// Result type alias for registry and introspection operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DbError::not_found("analytics");
        assert!(err.to_string().contains("analytics"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connection("refused", "Check the server is running");
        assert_eq!(err.suggestion(), Some("Check the server is running"));
        assert_eq!(DbError::not_found("x").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::duplicate_config("main").is_retryable());
        assert!(!DbError::parse("bad").is_retryable());
    }
}
