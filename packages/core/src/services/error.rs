//! Service Layer Error Types
//!
//! Request-level error kinds. Storage errors are folded into these kinds at
//! the service boundary: a missing record becomes [`ServiceError::NotFound`],
//! every other storage failure becomes [`ServiceError::StoreUnavailable`].
//! Malformed documents are not errors; scans skip them with a warning.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Stale mirror id, unknown collection or agent, unknown geography name
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Request cannot be served as given (blank or invalid scope)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Transport or storage failure on either store; never retried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] DatabaseError),
}

impl ServiceError {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a precondition failed error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::RecordNotFound { entity, id } => Self::NotFound { entity, id },
            DatabaseError::Validation(e) => Self::PreconditionFailed(e.to_string()),
            other => Self::StoreUnavailable(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        Self::PreconditionFailed(err.to_string())
    }
}

/// Convert back for the post-save hook boundary, which speaks `DatabaseError`
impl From<ServiceError> for DatabaseError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { entity, id } => DatabaseError::RecordNotFound { entity, id },
            ServiceError::PreconditionFailed(msg) => DatabaseError::document_store(msg),
            ServiceError::StoreUnavailable(inner) => inner,
        }
    }
}
