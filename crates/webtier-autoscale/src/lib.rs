//! webtier-autoscale: target-tracking capacity control for a fleet.
//!
//! Every scaling policy ticks on its own collection interval, reads the
//! latest `MetricsSnapshot` and proposes a capacity. Proposals travel over
//! a channel to the fleet's single reconciler, which merges them and
//! converges the fleet.
//!
//! # Scaling Algorithm
//!
//! ```text
//! request rate:  proposed = ceil(total_rate_per_minute / target_per_instance)
//! cpu:           proposed = ceil(current_capacity * average_cpu / target_percent)
//!
//! desired = clamp(max(proposals), min_capacity, max_capacity)
//!
//! desired > current  → launch (desired - current), registered Initial
//! desired < current  → pick (current - desired) by scale-in preference,
//!                      mark Draining, deregister when idle or timed out
//! ```
//!
//! A per-fleet `cooldown` holds the desired value steady between changes.

pub mod compute;
pub mod controller;
pub mod policy;
pub mod reconciler;

pub use compute::{ComputeBackend, LaunchedInstance, LocalCompute};
pub use controller::{FleetController, collect_proposal};
pub use policy::{Proposal, arbitrate, propose};
pub use reconciler::{FleetReconciler, ReconcileReport, select_for_scale_in};
