//! Persisted record types.
//!
//! These are the runtime counterparts of the declarative types in
//! `webtier-core`: what was provisioned, which instances belong to which
//! target group, how healthy they are, and where each fleet stands.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a fleet instance.
pub type InstanceId = String;

// ── Resources ─────────────────────────────────────────────────────

/// Kind of provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    SecurityGroup,
    LoadBalancer,
    Listener,
    TargetGroup,
    Fleet,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::Fleet => "fleet",
        }
    }

    /// Resources that cannot be changed in place.
    pub fn is_immutable(&self) -> bool {
        matches!(self, ResourceKind::Network)
    }
}

/// Stable identifier of a provisioned resource: `{kind}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self(format!("{}/{name}", kind.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The resource name part of the handle.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convergence status reported by the provisioning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Active,
    Failed { reason: String },
}

/// A resource as last converged by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub handle: ResourceHandle,
    pub kind: ResourceKind,
    pub name: String,
    /// The declarative spec the resource was converged to.
    pub spec: serde_json::Value,
    pub status: ResourceStatus,
    /// Backend-assigned attributes (e.g. `dns_name` of a load balancer).
    pub attributes: BTreeMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Members ───────────────────────────────────────────────────────

/// Health of a registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHealth {
    /// Registered, not yet passed enough checks.
    Initial,
    Healthy,
    Unhealthy,
    /// Marked for removal; receives no new traffic.
    Draining,
}

impl TargetHealth {
    /// Whether the target may receive new requests.
    pub fn is_routable(&self) -> bool {
        *self == TargetHealth::Healthy
    }
}

/// Lightweight reference to a registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: InstanceId,
    /// Listen address of the target (ip:port).
    pub address: String,
}

/// A fleet instance registered in a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub id: InstanceId,
    pub fleet: String,
    pub target_group: String,
    /// Listen address of the target (ip:port).
    pub address: String,
    pub health: TargetHealth,
    /// Script reference the instance was launched with.
    pub bootstrap_script: Option<String>,
    /// Unix timestamp (milliseconds) of the launch.
    pub launched_at: u64,
    /// Unix timestamp (milliseconds) when draining began.
    pub drain_started_at: Option<u64>,
    /// Unix timestamp (milliseconds) of the last health change.
    pub updated_at: u64,
}

impl MemberState {
    pub fn table_key(&self) -> String {
        member_key(&self.target_group, &self.id)
    }

    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            id: self.id.clone(),
            address: self.address.clone(),
        }
    }
}

/// Build the composite key for the members table.
pub fn member_key(target_group: &str, instance_id: &str) -> String {
    format!("{target_group}:{instance_id}")
}

// ── Fleet ─────────────────────────────────────────────────────────

/// Capacity snapshot of a fleet.
///
/// `min_capacity <= desired_capacity <= max_capacity` holds for every value
/// produced through `new` and `set_desired`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    pub fleet: String,
    /// Members not yet draining.
    pub current_capacity: u32,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_capacity: u32,
    pub updated_at: u64,
}

impl FleetState {
    /// A fresh fleet wants its minimum capacity.
    pub fn new(fleet: &str, min_capacity: u32, max_capacity: u32) -> Self {
        Self {
            fleet: fleet.to_string(),
            current_capacity: 0,
            min_capacity,
            max_capacity,
            desired_capacity: min_capacity,
            updated_at: 0,
        }
    }

    /// Clamp a value into `[min_capacity, max_capacity]`.
    pub fn clamp(&self, value: u32) -> u32 {
        value.max(self.min_capacity).min(self.max_capacity)
    }

    /// Set the desired capacity, clamped into bounds. Returns the stored value.
    pub fn set_desired(&mut self, value: u32) -> u32 {
        self.desired_capacity = self.clamp(value);
        self.desired_capacity
    }

    /// Instances still to launch (positive) or drain (negative).
    pub fn drift(&self) -> i64 {
        i64::from(self.desired_capacity) - i64::from(self.current_capacity)
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// Load signals collected for a fleet over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub fleet: String,
    /// Unix timestamp (milliseconds) at the end of the window.
    pub epoch: u64,
    pub window_secs: f64,
    /// Requests routed to the fleet during the window.
    pub request_count: u64,
    /// Requests per minute across the whole fleet.
    pub request_rate_per_minute: f64,
    /// Mean CPU utilization (0–100) of healthy instances.
    pub average_cpu_percent: f64,
    /// Healthy instances that contributed CPU samples.
    pub healthy_instances: u32,
}

impl MetricsSnapshot {
    /// Build the composite key for the metrics table.
    pub fn table_key(&self) -> String {
        format!("{}:{:020}", self.fleet, self.epoch)
    }
}

// ── Outputs ───────────────────────────────────────────────────────

/// A published stack output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    pub published_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips_name() {
        let h = ResourceHandle::new(ResourceKind::TargetGroup, "default-targets");
        assert_eq!(h.as_str(), "target_group/default-targets");
        assert_eq!(h.name(), "default-targets");
    }

    #[test]
    fn fleet_state_starts_at_min() {
        let f = FleetState::new("asg", 1, 3);
        assert_eq!(f.desired_capacity, 1);
        assert_eq!(f.drift(), 1);
    }

    #[test]
    fn set_desired_clamps_both_ends() {
        let mut f = FleetState::new("asg", 1, 3);
        assert_eq!(f.set_desired(0), 1);
        assert_eq!(f.set_desired(7), 3);
        assert_eq!(f.set_desired(2), 2);
    }

    #[test]
    fn clamp_is_idempotent_over_range() {
        let f = FleetState::new("asg", 2, 5);
        for v in 0..20 {
            let once = f.clamp(v);
            assert!((2..=5).contains(&once));
            assert_eq!(f.clamp(once), once);
        }
    }

    #[test]
    fn only_healthy_is_routable() {
        assert!(TargetHealth::Healthy.is_routable());
        for h in [
            TargetHealth::Initial,
            TargetHealth::Unhealthy,
            TargetHealth::Draining,
        ] {
            assert!(!h.is_routable());
        }
    }

    #[test]
    fn metrics_keys_sort_by_epoch() {
        let mk = |epoch| MetricsSnapshot {
            fleet: "asg".to_string(),
            epoch,
            window_secs: 60.0,
            request_count: 0,
            request_rate_per_minute: 0.0,
            average_cpu_percent: 0.0,
            healthy_instances: 0,
        };
        assert!(mk(999).table_key() < mk(1000).table_key());
    }
}
