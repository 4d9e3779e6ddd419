//! webtier-metrics: load signals for the autoscaling controller.
//!
//! ```text
//! MetricsCollector
//!   ├── begin_request() / end_request() ← per routed request
//!   ├── record_cpu() / ingest_cpu() ← per-instance utilization samples
//!   ├── snapshot() → persists MetricsSnapshot per fleet, prunes old ones
//!   └── run() → periodic snapshot loop
//! ```
//!
//! Request totals cover every request routed to a fleet. CPU averages
//! only include members whose health is Healthy.

pub mod collector;

pub use collector::{DEFAULT_RETENTION, MetricsCollector};
