//! The closed error taxonomy every operation in `routectl` reports through.
//!
//! Internal plumbing (file I/O, JSON de/serialization) still propagates via
//! `anyhow::Result` with `.context(...)` the way the rest of this workspace
//! does; at the boundaries callers actually need to branch on (`commit`,
//! `restore`, `set`/`get`, ...) those errors are converted into one of these
//! variants so a caller can match on the kind without string-sniffing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterConfError {
    #[error("parse error at line {line}: {detail}")]
    ParseError { line: usize, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("a transaction is already in progress")]
    Busy,

    #[error("commit called with no staged changes")]
    NoChanges,

    #[error("insufficient free space to create a snapshot")]
    NoSpace,

    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error("validation rejected {field} = {value}")]
    ValidationError { field: String, value: String },

    #[error("applier {applier} failed: {detail}")]
    ApplyError { applier: String, detail: String },

    #[error("rollback failed: {}", .0.join("; "))]
    RollbackError(Vec<String>),

    #[error("transaction timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error on {path}: {detail}")]
    IoError { path: String, detail: String },
}

impl RouterConfError {
    pub fn io(path: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::IoError { path: path.into(), detail: detail.to_string() }
    }

    pub fn validation(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ValidationError { field: field.into(), value: value.into() }
    }

    pub fn apply(applier: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::ApplyError { applier: applier.into(), detail: detail.to_string() }
    }
}
