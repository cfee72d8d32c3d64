use crate::domain::payment::{PaymentId, PaymentOperation, PaymentStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// The error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Storage,
    Routing,
    Processor,
    StateConflict,
    Cancelled,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment {0} not found")]
    NotFound(PaymentId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Routing error: {0}")]
    Routing(#[from] RouterError),

    /// The processor rejected the authorization. `failure_recorded` tells
    /// whether the `failed` status made it to the repository.
    #[error("Authorization of payment {id} failed: {source}")]
    AuthorizationFailed {
        id: PaymentId,
        #[source]
        source: ProcessorError,
        failure_recorded: bool,
    },

    #[error("Processor rejected {operation} of payment {id}: {source}")]
    ProcessorRejected {
        id: PaymentId,
        operation: PaymentOperation,
        #[source]
        source: ProcessorError,
    },

    #[error("Cannot {operation} payment {id} in status {status}")]
    StateConflict {
        id: PaymentId,
        operation: PaymentOperation,
        status: PaymentStatus,
    },

    /// The record is in the right status but cannot cover the requested amount.
    #[error("Cannot {operation} {requested} of payment {id}: only {available} available")]
    AmountConflict {
        id: PaymentId,
        operation: PaymentOperation,
        requested: u64,
        available: u64,
    },

    #[error("Cancelled while waiting on {0}")]
    Cancelled(&'static str),

    #[error("Deadline exceeded while waiting on {0}")]
    DeadlineExceeded(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Validation(_) => ErrorKind::Validation,
            PaymentError::NotFound(_) => ErrorKind::NotFound,
            PaymentError::Storage(_) => ErrorKind::Storage,
            PaymentError::Routing(_) => ErrorKind::Routing,
            PaymentError::AuthorizationFailed { .. } | PaymentError::ProcessorRejected { .. } => {
                ErrorKind::Processor
            }
            PaymentError::StateConflict { .. } | PaymentError::AmountConflict { .. } => {
                ErrorKind::StateConflict
            }
            PaymentError::Cancelled(_) | PaymentError::DeadlineExceeded(_) => ErrorKind::Cancelled,
            PaymentError::Config(_)
            | PaymentError::Csv(_)
            | PaymentError::Io(_)
            | PaymentError::Json(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Failures reported by a `PaymentRepository`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Another writer committed a newer version of the record first.
    #[error("version conflict on payment {id}: expected stored version {expected}, found {found}")]
    Conflict {
        id: PaymentId,
        expected: u64,
        found: u64,
    },

    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("processor {0:?} already registered")]
    AlreadyRegistered(String),

    #[error("processor {0:?} not registered")]
    UnknownProcessor(String),

    #[error("no suitable processor available")]
    NoProcessorAvailable,
}

/// Failures reported by a `Processor` for a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("declined: {0}")]
    Declined(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("processor unavailable: {0}")]
    Unavailable(String),
}
