//! Runtime routing errors.
//!
//! These are surfaced to the caller as a failed request and are never
//! retried here. Definition problems (duplicate priorities and the like)
//! are `webtier_core::DefinitionError` and are raised before routing starts.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no healthy targets in target group {target_group}")]
    NoHealthyTargets { target_group: String },

    #[error("target group not registered with the router: {0}")]
    UnknownTargetGroup(String),
}
