//! Error types for objperm

use thiserror::Error;

/// The main error type for objperm operations.
///
/// A user lacking a permission is not an error: that outcome is reported
/// through `bool` checks and [`crate::view::Dispatch::Denied`].
#[derive(Debug, Error)]
pub enum ObjpermError {
    /// Malformed permission name or unsupported action
    #[error("{0}")]
    InvalidArgument(String),

    /// A view was wired up without something it requires (e.g. a base queryset)
    #[error("{0}")]
    ImproperlyConfigured(String),

    /// A required extension point was not provided
    #[error("{0}")]
    NotImplemented(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A record failed field validation before being stored
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObjpermError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ObjpermError::Validation { field, message: message.into() }
    }
}

/// Result type alias for objperm operations
pub type Result<T> = std::result::Result<T, ObjpermError>;

/// Convert a storage-layer error into an ObjpermError
pub fn err<E: std::error::Error>(e: E) -> ObjpermError {
    ObjpermError::Storage(e.to_string())
}
