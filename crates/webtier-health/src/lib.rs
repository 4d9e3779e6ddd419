//! webtier-health: health tracking for target group members.
//!
//! Every registered target runs through a small state machine driven by
//! HTTP checks against `{address}{path}`:
//!
//! ```text
//!   Initial   ──(healthy_threshold successes)──▶ Healthy
//!   Initial   ──(unhealthy_threshold failures)─▶ Unhealthy
//!   Healthy   ──(unhealthy_threshold failures)─▶ Unhealthy
//!   Unhealthy ──(healthy_threshold successes)──▶ Healthy
//!   any       ──(marked for removal)───────────▶ Draining
//! ```
//!
//! `HealthMonitor` runs one background task per target that probes at the
//! group's interval and persists each transition to the state store. It
//! never adds or removes members.

pub mod checker;
pub mod monitor;

pub use checker::{HealthTracker, ProbeResult, Transition, http_probe};
pub use monitor::{BoxFuture, HealthCallback, HealthMonitor, Prober, mark_draining};
