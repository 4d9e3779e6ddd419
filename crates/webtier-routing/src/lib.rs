//! webtier-routing: request routing for the web tier's listener.
//!
//! Incoming requests are matched against an ordered rule table. The first
//! rule (lowest priority number) whose path pattern matches wins; otherwise
//! the implicit default rule forwards to the primary target group.
//!
//! # Components
//!
//! - **`pattern`**: exact and wildcard (`*`, `?`) path patterns
//! - **`rules`**: the priority-ordered rule table
//! - **`balancer`**: round-robin over healthy members, keyed by instance id
//! - **`router`**: decision function over rules and target snapshots
//! - **`metered`**: router wrapper that feeds fleet request load to metrics
//! - **`sync`**: rebuilds target snapshots from the state store
//!
//! The router never mutates membership or health; it only reads the
//! snapshot it was last given.

pub mod balancer;
pub mod error;
pub mod metered;
pub mod pattern;
pub mod router;
pub mod rules;
pub mod sync;

pub use balancer::RoundRobinBalancer;
pub use error::RoutingError;
pub use metered::{MeteredRouter, RequestLease, Routed};
pub use pattern::PathPattern;
pub use router::{RouteDecision, Router, Target};
pub use rules::RuleTable;
pub use sync::{SyncStats, TargetSync};
