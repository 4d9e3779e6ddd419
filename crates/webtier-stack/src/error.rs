//! Error types for stack operations.

use thiserror::Error;

use webtier_core::DefinitionError;
use webtier_state::StateError;

pub type StackResult<T> = Result<T, StackError>;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("invalid stack definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to encode resource spec: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("resource {handle} did not become active after {attempts} checks")]
    NotConverged { handle: String, attempts: u32 },

    #[error("resource {handle} has no {attribute} attribute")]
    MissingAttribute { handle: String, attribute: String },
}

impl StackError {
    /// Whether the backend failed to reach the declared state.
    pub fn is_convergence(&self) -> bool {
        match self {
            StackError::State(e) => e.is_convergence(),
            StackError::NotConverged { .. } => true,
            _ => false,
        }
    }
}
