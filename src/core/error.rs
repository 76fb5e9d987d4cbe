//! Core Error Types
//!
//! One fault taxonomy for the whole kernel. Every surface (REST, nested REST,
//! RPC) derives its wire code from [`CoreError::class`], so an HTTP status and
//! an RPC error code can never disagree for the same cause.

use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

/// Core module result type
pub type CoreResult<T> = Result<T, CoreError>;

/// JSON-RPC code for a malformed envelope
pub const RPC_PARSE_ERROR: i64 = -32700;

/// JSON-RPC code for a structurally invalid request object
pub const RPC_INVALID_REQUEST: i64 = -32600;

/// JSON-RPC code for an unknown `Model.verb`
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC code for unexpected internal failures
pub const RPC_INTERNAL_ERROR: i64 = -32000;

/// Public message for internal faults; details only go to the log
pub const INTERNAL_MESSAGE: &str = "Internal error";

/// Core error type
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ==================
    // Envelope / routing
    // ==================
    /// Request body is not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request object is structurally invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No operation bound under this name or route
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    // ==================
    // Typed faults (4xx)
    // ==================
    /// Malformed parameter outside schema validation
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Input failed schema validation
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldIssue>,
    },

    /// Authentication required
    #[error("Authentication required")]
    AuthRequired,

    /// Rejected by an authorization hook or security dependency
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Call cancelled or timed out before completion
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Fault carrying an explicit status chosen by a hook or handler
    #[error("{message}")]
    Status { status: u16, message: String },

    // ==================
    // Server faults (5xx)
    // ==================
    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub code: &'static str,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

/// Classification shared by the HTTP and RPC mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Parse,
    InvalidRequest,
    MethodNotFound,
    /// A typed fault surfaced with its own HTTP status on both surfaces
    Typed(u16),
    Internal,
}

impl CoreError {
    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a validation error without field details
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            fields: Vec::new(),
        }
    }

    /// Create a validation error from collected field issues
    pub fn invalid_fields(fields: Vec<FieldIssue>) -> Self {
        let message = fields
            .iter()
            .map(|f| format!("{}: {}", f.field, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { message, fields }
    }

    /// Create a forbidden error
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an error with an explicit status
    pub fn status(status: u16, msg: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this fault
    pub fn class(&self) -> FaultClass {
        match self {
            Self::Parse(_) => FaultClass::Parse,
            Self::InvalidRequest(_) => FaultClass::InvalidRequest,
            Self::MethodNotFound(_) => FaultClass::MethodNotFound,
            Self::BadRequest(_) => FaultClass::Typed(400),
            Self::AuthRequired => FaultClass::Typed(401),
            Self::Forbidden(_) => FaultClass::Typed(403),
            Self::NotFound(_) => FaultClass::Typed(404),
            Self::Conflict(_) => FaultClass::Typed(409),
            Self::Validation { .. } => FaultClass::Typed(422),
            Self::Cancelled(_) => FaultClass::Typed(504),
            Self::Status { status, .. } if (400..500).contains(status) => {
                FaultClass::Typed(*status)
            }
            Self::Status { .. } | Self::Storage(_) | Self::Internal(_) => FaultClass::Internal,
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self.class() {
            FaultClass::Parse | FaultClass::InvalidRequest => 400,
            FaultClass::MethodNotFound => 404,
            FaultClass::Typed(status) => status,
            FaultClass::Internal => match self {
                Self::Status { status, .. } if *status >= 500 => *status,
                _ => 500,
            },
        }
    }

    /// Get the RPC envelope error code
    pub fn rpc_code(&self) -> i64 {
        match self.class() {
            FaultClass::Parse => RPC_PARSE_ERROR,
            FaultClass::InvalidRequest => RPC_INVALID_REQUEST,
            FaultClass::MethodNotFound => RPC_METHOD_NOT_FOUND,
            FaultClass::Typed(status) => i64::from(status),
            FaultClass::Internal => RPC_INTERNAL_ERROR,
        }
    }

    /// Message safe to put on the wire
    pub fn public_message(&self) -> String {
        match self.class() {
            FaultClass::Internal => INTERNAL_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured detail for the wire, if any
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Validation { fields, .. } if !fields.is_empty() => {
                serde_json::to_value(fields).ok()
            }
            _ => None,
        }
    }

    /// Whether this fault is an unexpected server-side failure
    pub fn is_internal(&self) -> bool {
        self.class() == FaultClass::Internal
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::UniqueViolation { .. } => Self::Conflict(e.to_string()),
            StorageError::NotFound { .. } => Self::NotFound(e.to_string()),
            StorageError::NoTransaction | StorageError::Backend(_) => {
                Self::Storage(e.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
