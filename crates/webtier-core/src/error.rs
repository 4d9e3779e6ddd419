//! Definition-time errors.
//!
//! Every variant is raised before any provisioning call is made, so a
//! rejected stack never leaves partially applied infrastructure behind.

use thiserror::Error;

/// Result type alias for definition checks.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// A stack definition that cannot be provisioned as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("duplicate listener rule priority {priority}")]
    DuplicatePriority { priority: u32 },

    #[error("listener rule priority must be a positive integer")]
    InvalidPriority,

    #[error("listener rule {priority} has no path conditions")]
    EmptyConditions { priority: u32 },

    #[error("listener rule {priority} has {count} path conditions (max {max})")]
    TooManyConditions { priority: u32, count: usize, max: usize },

    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("invalid capacity bounds: min {min} > max {max}")]
    InvalidCapacityBounds { min: u32, max: u32 },

    #[error("private subnet {subnet} has no NAT egress path")]
    PrivateSubnetWithoutNat { subnet: String },

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid security rule: {0}")]
    InvalidSecurityRule(String),

    #[error("unknown target group: {0}")]
    UnknownTargetGroup(String),

    #[error("duplicate target group: {0}")]
    DuplicateTargetGroup(String),

    #[error("invalid health check for {target_group}: {reason}")]
    InvalidHealthCheck { target_group: String, reason: String },

    #[error("invalid scaling policy {policy}: {reason}")]
    InvalidScalingPolicy { policy: String, reason: String },

    #[error("invalid fleet: {0}")]
    InvalidFleet(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
