//! State store and provisioning errors.

use std::fmt;

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// The redb step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Open,
    Begin,
    Commit,
    OpenTable,
    Read,
    Write,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageOp::Open => "open",
            StorageOp::Begin => "begin transaction",
            StorageOp::Commit => "commit",
            StorageOp::OpenTable => "open table",
            StorageOp::Read => "read",
            StorageOp::Write => "write",
        })
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state storage failed ({op}): {message}")]
    Storage { op: StorageOp, message: String },

    #[error("cannot encode record {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt record {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource {handle} is immutable; changing it requires replacement")]
    ReplacementRequired { handle: String },

    #[error("resource {handle} failed to converge: {reason}")]
    ConvergenceFailed { handle: String, reason: String },
}

impl StateError {
    /// The backend could not reach the declared state.
    pub fn is_convergence(&self) -> bool {
        matches!(
            self,
            StateError::ReplacementRequired { .. } | StateError::ConvergenceFailed { .. }
        )
    }
}
