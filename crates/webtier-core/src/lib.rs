//! webtier-core: definition model for a horizontally scaled web tier.
//!
//! Holds the declarative types (network, security group, listener rules,
//! target groups, fleet and scaling policies), the `webtier.toml` parser,
//! and the definition-time validation that runs before anything is
//! provisioned.

pub mod config;
pub mod error;
pub mod security;
pub mod types;
pub mod validate;

pub use config::{StackConfig, format_duration, parse_duration};
pub use error::{DefinitionError, DefinitionResult};
pub use security::Cidr;
pub use types::*;
