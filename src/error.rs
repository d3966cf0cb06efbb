//! Error types for Cassie
//!
//! Provides a unified error type for the runtime and its drivers. The
//! variants are grouped by how a caller is expected to react: caller errors
//! are never retried, transport errors tear the session down, query and
//! record errors leave the session alone.

use thiserror::Error;

/// Result type alias using CassieError
pub type Result<T> = std::result::Result<T, CassieError>;

/// Unified error type for Cassie operations
#[derive(Debug, Error)]
pub enum CassieError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Query error: {0}")]
    Query(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Record not found")]
    RecordNotFound,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CassieError {
    /// True for transport failures after which the session must not be reused.
    pub fn is_io(&self) -> bool {
        matches!(self, CassieError::Io(_) | CassieError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let io = CassieError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(io.is_io());
        assert!(CassieError::Connection("no hosts".into()).is_io());
        assert!(!CassieError::Query("unconfigured table".into()).is_io());
        assert!(!CassieError::RecordNotFound.is_io());
        assert!(!CassieError::InvalidArgument("blank".into()).is_io());
    }
}
