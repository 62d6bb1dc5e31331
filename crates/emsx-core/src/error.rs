//! Error types for emsx-core
//!
//! Every fallible operation in the crate returns [`EmsxResult`]. Errors raised
//! by the transport while an event is being processed are caught at the
//! dispatcher entry point and never escape to the delivery task; errors raised
//! in the control flow (session construction, start, teardown) surface from
//! [`SessionController::run`](crate::controller::SessionController::run).
//!
//! ```rust
//! use emsx_core::EmsxError;
//!
//! let err = EmsxError::not_found("EMSX_ROUTE_ID");
//! assert_eq!(err.category(), "schema");
//! assert_eq!(err.to_string(), "Element not found: EMSX_ROUTE_ID");
//! ```

use thiserror::Error;

/// Result type alias for emsx-core operations
pub type EmsxResult<T> = Result<T, EmsxError>;

/// Errors raised by the session layer, the message model and the transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmsxError {
    /// Schema errors
    #[error("Element not found: {element}")]
    NotFound { element: String },

    #[error("Invalid conversion of {element}: expected {expected}")]
    InvalidConversion { element: String, expected: &'static str },

    #[error("Index {index} out of range for {element} ({len} values)")]
    IndexOutOfRange { element: String, index: usize, len: usize },

    #[error("Unknown operation {operation} on service {service}")]
    UnknownOperation { service: String, operation: String },

    /// Session and service errors
    #[error("Service not opened: {service}")]
    ServiceNotOpened { service: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Event queue full: limit is {limit}")]
    QueueFull { limit: usize },

    /// Transport errors
    #[error("Transport failed: {reason}")]
    Transport { reason: String },

    /// Request payload errors
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl EmsxError {
    /// Create an element-not-found error
    pub fn not_found(element: impl Into<String>) -> Self {
        Self::NotFound { element: element.into() }
    }

    /// Create an invalid conversion error
    pub fn invalid_conversion(element: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidConversion { element: element.into(), expected }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    /// Create an invalid request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Coarse category used as a structured log field
    pub fn category(&self) -> &'static str {
        match self {
            EmsxError::NotFound { .. }
            | EmsxError::InvalidConversion { .. }
            | EmsxError::IndexOutOfRange { .. }
            | EmsxError::UnknownOperation { .. } => "schema",
            EmsxError::ServiceNotOpened { .. }
            | EmsxError::InvalidState { .. }
            | EmsxError::QueueFull { .. } => "session",
            EmsxError::Transport { .. } | EmsxError::Io { .. } => "transport",
            EmsxError::InvalidRequest { .. } => "request",
            EmsxError::InvalidConfiguration { .. } => "configuration",
        }
    }
}

impl From<std::io::Error> for EmsxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { reason: err.to_string() }
    }
}
