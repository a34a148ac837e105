use std::fmt;

use thiserror::Error;

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Collaborator timeout or 5xx; retried already, the item is marked failed.
    TransientInfra,
    /// Collaborator rejected the call outright (e.g. HTTP 4xx); not retried.
    Collaborator,
    /// Bad caller input; never retried.
    Validation,
    /// Embedding-space mismatch or dangling passage reference.
    Consistency,
    /// Some passages of a document failed to embed or index.
    PartialIngestFailure,
    NotFound,
    /// The requested state transition is not allowed.
    Conflict,
    Storage,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientInfra => "transient_infra",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Validation => "validation",
            ErrorKind::Consistency => "consistency",
            ErrorKind::PartialIngestFailure => "partial_ingest_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("compliance: invalid input: {0}")]
    Validation(String),

    #[error("compliance: document too large: {size} chars exceeds limit {limit}")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("compliance: {op} failed after {attempts} attempt(s): {message}")]
    TransientInfra {
        op: String,
        attempts: u32,
        message: String,
    },

    #[error("compliance: {op} failed: {message}")]
    Collaborator { op: String, message: String },

    #[error("compliance: consistency violation: {0}")]
    Consistency(String),

    #[error("compliance: ingest of {document_id} failed for {failed} of {total} passage(s)")]
    PartialIngest {
        document_id: String,
        failed: usize,
        total: usize,
    },

    #[error("compliance: {what} {id} not found")]
    NotFound { what: &'static str, id: String },

    #[error("compliance: cannot {action} alert {alert_id} in status {status}")]
    InvalidTransition {
        alert_id: String,
        action: String,
        status: String,
    },

    #[error("compliance: cannot {action} document {document_id} in status {status}")]
    DocumentBusy {
        document_id: String,
        action: String,
        status: String,
    },

    #[error("compliance: store error: {0}")]
    Store(#[from] StoreError),

    #[error("compliance: config: {0}")]
    Config(String),
}

impl ComplianceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComplianceError::Validation(_) | ComplianceError::DocumentTooLarge { .. } => {
                ErrorKind::Validation
            }
            ComplianceError::TransientInfra { .. } => ErrorKind::TransientInfra,
            ComplianceError::Collaborator { .. } => ErrorKind::Collaborator,
            ComplianceError::Consistency(_) => ErrorKind::Consistency,
            ComplianceError::PartialIngest { .. } => ErrorKind::PartialIngestFailure,
            ComplianceError::NotFound { .. } => ErrorKind::NotFound,
            ComplianceError::InvalidTransition { .. } | ComplianceError::DocumentBusy { .. } => {
                ErrorKind::Conflict
            }
            ComplianceError::Store(_) => ErrorKind::Storage,
            ComplianceError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: &str) -> Self {
        ComplianceError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}

/// Errors from the durable alert/document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Delivery failure reported by an alert sink.
#[derive(Error, Debug)]
#[error("alert sink: {0}")]
pub struct SinkError(pub String);

pub type Result<T> = std::result::Result<T, ComplianceError>;
