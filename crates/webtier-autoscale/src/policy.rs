//! Scaling policies: turn a metrics snapshot into a capacity proposal.

use tracing::debug;

use webtier_core::{ScalingMetric, ScalingPolicy};
use webtier_state::{FleetState, MetricsSnapshot};

/// A capacity proposed by one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub fleet: String,
    pub policy: String,
    pub desired: u32,
}

/// Capacity a policy proposes for the observed load.
///
/// Returns `None` when the snapshot holds no usable signal for the policy
/// (a non-positive target, or no healthy CPU samples).
pub fn propose(
    policy: &ScalingPolicy,
    snapshot: &MetricsSnapshot,
    current_capacity: u32,
) -> Option<u32> {
    let raw = match &policy.metric {
        ScalingMetric::RequestRateTarget {
            per_instance_target_per_minute: target,
        } => {
            if *target <= 0.0 {
                return None;
            }
            snapshot.request_rate_per_minute / target
        }
        ScalingMetric::CpuUtilizationTarget {
            target_percent: target,
        } => {
            if *target <= 0.0 || snapshot.healthy_instances == 0 {
                return None;
            }
            f64::from(current_capacity) * snapshot.average_cpu_percent / target
        }
    };

    let proposed = ceil_capacity(raw);
    debug!(
        policy = %policy.name,
        fleet = %snapshot.fleet,
        rate_per_minute = snapshot.request_rate_per_minute,
        cpu = snapshot.average_cpu_percent,
        current_capacity,
        proposed,
        "policy proposal"
    );
    Some(proposed)
}

/// Round a fractional capacity up, saturating at `u32::MAX`.
///
/// NaN carries no signal and maps to 0; positive infinity saturates.
fn ceil_capacity(raw: f64) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    let ceiled = raw.ceil();
    if ceiled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        ceiled as u32
    }
}

/// Merge proposals: the largest wins, clamped into the fleet's bounds.
///
/// With no proposals the current desired value is re-clamped.
pub fn arbitrate(proposals: &[u32], fleet: &FleetState) -> u32 {
    let wanted = proposals
        .iter()
        .copied()
        .max()
        .unwrap_or(fleet.desired_capacity);
    fleet.clamp(wanted)
}
