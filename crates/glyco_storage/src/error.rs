#![forbid(unsafe_code)]

use glyco_kernel_contracts::ContractViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("learning slot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("learning blob is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("learning blob digest mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("learning blob version {found} does not match {expected}")]
    VersionMismatch { found: String, expected: String },
    #[error("learning state rejected: {0}")]
    ContractViolation(#[from] ContractViolation),
}
