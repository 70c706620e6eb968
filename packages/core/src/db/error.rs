//! Database Error Types
//!
//! Errors for both backing stores: the libsql relational store and the
//! document store backends. Service-layer code maps these onto request-level
//! error kinds (see [`crate::services::ServiceError`]).

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Document store backend error
    #[error("Document store operation failed: {context}")]
    DocumentStoreError { context: String },

    /// Expected record is absent
    #[error("{entity} not found: {id}")]
    RecordNotFound { entity: String, id: String },

    /// Collection name is not a valid identifier
    #[error("Invalid collection name: {name}")]
    InvalidCollectionName { name: String },

    /// Selector field is not a valid identifier
    #[error("Invalid selector field: {field}")]
    InvalidSelector { field: String },

    /// Document body is not a JSON object or cannot be (de)serialized
    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row holds a value the model cannot represent
    #[error("Invalid stored value: {0}")]
    InvalidRow(String),

    /// Values rejected before reaching the database
    #[error("Validation failed: {0}")]
    Validation(#[from] crate::models::ValidationError),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a document store error with context
    pub fn document_store(context: impl Into<String>) -> Self {
        Self::DocumentStoreError {
            context: context.into(),
        }
    }

    /// Create a record not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}

impl From<surrealdb::Error> for DatabaseError {
    fn from(err: surrealdb::Error) -> Self {
        Self::document_store(err.to_string())
    }
}
