//! Error types for the cloudstore-core crate

use crate::retry::OperationKind;
use cloudstore_crypto::CryptoError;
use cloudstore_store::{StoreError, StoreObject};
use std::fmt;
use thiserror::Error;

/// Result type alias using the engine `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// How the retry executor treats an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport, throttling and injected failures
    Retryable,
    /// Usage errors and everything else
    Fatal,
}

/// Errors surfaced by engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad precondition: missing object, invalid bucket, overwrite conflict, bad arguments
    #[error("{0}")]
    Usage(String),

    /// Object store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encryption or key-management error
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Synthetic failure raised by a fault injector
    #[error("forcing {0} abort")]
    AbortInjected(OperationKind),

    /// A retryable error persisted through every attempt
    #[error("{source} (gave up after {attempts} attempts)")]
    RetriesExhausted { attempts: u32, source: Box<Error> },

    /// Some sub-operations of a recursive operation failed
    #[error("{0}")]
    BatchFailed(BatchFailure),

    /// Rename copied the object but could not delete the source; both now exist
    #[error("rename of '{from}' to '{to}' is incomplete, both objects exist: {cause}")]
    RenameIncomplete {
        from: String,
        to: String,
        cause: Box<Error>,
    },

    /// Operation was cancelled through its handle
    #[error("operation cancelled")]
    Cancelled,

    /// Local IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task panicked or was aborted
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Retry classification
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Store(e) if e.is_retryable() => ErrorClass::Retryable,
            Self::AbortInjected(_) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether the retry executor may run the operation again
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Whether this is a usage or key-management error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::Crypto(_))
    }

    /// Whether the store reported a missing object
    pub(crate) fn is_no_such_key(&self) -> bool {
        matches!(self, Self::Store(StoreError::NoSuchKey { .. }))
    }

    /// Whether the store reported a missing bucket
    pub(crate) fn is_no_such_bucket(&self) -> bool {
        matches!(self, Self::Store(StoreError::NoSuchBucket(_)))
    }
}

/// Outcome of a recursive operation in which at least one sub-operation failed
#[derive(Debug)]
pub struct BatchFailure {
    /// Objects whose sub-operation completed
    pub completed: Vec<StoreObject>,
    /// Failed sub-operations, keyed by source URI
    pub failed: Vec<(String, Error)>,
}

impl BatchFailure {
    /// Total number of sub-operations
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} operations failed", self.failed.len(), self.total())?;
        if let Some((uri, error)) = self.failed.first() {
            write!(f, "; first failure on '{}': {}", uri, error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::AbortInjected(OperationKind::Copy).is_retryable());
        assert!(Error::Store(StoreError::Unavailable("x".into())).is_retryable());
        assert!(!Error::Store(StoreError::NoSuchBucket("b".into())).is_retryable());
        assert!(!Error::usage("bad").is_retryable());
        assert!(!Error::Crypto(CryptoError::LastKey).is_retryable());
        assert!(Error::Crypto(CryptoError::LastKey).is_usage());
    }

    #[test]
    fn test_exhaustion_message_keeps_cause() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            source: Box::new(Error::AbortInjected(OperationKind::Copy)),
        };
        assert_eq!(err.to_string(), "forcing copy abort (gave up after 3 attempts)");
    }

    #[test]
    fn test_batch_message() {
        let failure = BatchFailure {
            completed: Vec::new(),
            failed: vec![("s3://b/k".to_string(), Error::AbortInjected(OperationKind::Delete))],
        };
        let message = Error::BatchFailed(failure).to_string();
        assert!(message.starts_with("1 of 1 operations failed"));
        assert!(message.contains("forcing delete abort"));
    }
}
