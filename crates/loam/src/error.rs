//! Error types for loam

use thiserror::Error;

/// Result type alias for loam operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database-mapping operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Invalid identifier or operator supplied to a builder
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required-single-result lookup found zero rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown relation name, or an operation invoked on the wrong relation kind
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Propagated unchanged from the executor boundary
    #[error("Execution error: {0}")]
    Execution(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an execution error carrying the boundary's message as-is
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an uncategorized error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is an execution error
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}
