//! Error types for the migration pipeline.
//!
//! Per-document migration problems are not errors: they are recorded as
//! issues in the [`IssueLedger`](crate::ledger::IssueLedger). The variants
//! below cover registration mistakes, handler failures caught at the
//! orchestrator boundary, and host I/O during finalize.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the migration library.
#[derive(Debug, Error)]
pub enum MigrationError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Registration errors
    #[error("{what} already registered for source system {source_system}")]
    DuplicateRegistration { source_system: String, what: String },

    #[error("Invalid registration for {source_system}: {message}")]
    Registration {
        source_system: String,
        message: String,
    },

    // Pipeline errors
    #[error("Migration handler failed for {document}: {message}")]
    Handler { document: String, message: String },

    // Host collaborator errors
    #[error("Document not found: {bucket}/{id}")]
    DocumentNotFound { bucket: String, id: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Report error: {message}")]
    Report { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MigrationError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MigrationError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a handler error for the named document.
    pub fn handler(document: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::Handler {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Whether the error happened in host I/O rather than in the pipeline.
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            MigrationError::Io { .. }
                | MigrationError::Store { .. }
                | MigrationError::Report { .. }
                | MigrationError::DocumentNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::DuplicateRegistration {
            source_system: "earthdawn4e".into(),
            what: "complex type transform".into(),
        };
        assert_eq!(
            err.to_string(),
            "complex type transform already registered for source system earthdawn4e"
        );
    }

    #[test]
    fn test_host_failures() {
        assert!(MigrationError::Store {
            message: "disk full".into()
        }
        .is_host_failure());
        assert!(!MigrationError::handler("Item.abc", "boom").is_host_failure());
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let err = MigrationError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            "/tmp/world/actors/a.json",
        );
        match err {
            MigrationError::Io { path, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/world/actors/a.json")))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
