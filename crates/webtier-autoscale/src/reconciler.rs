//! Fleet reconciler: converges a fleet's members to its desired capacity.
//!
//! Reads the fleet's members from the state store, merges policy proposals
//! into a desired capacity and closes the gap in one direction per pass:
//! launch new instances, or pick instances to drain. Draining members are
//! deregistered and terminated once idle or past the drain timeout.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info};

use webtier_core::{FleetSpec, ScaleInPreference};
use webtier_health::mark_draining;
use webtier_metrics::MetricsCollector;
use webtier_state::{
    FleetState, InstanceId, MemberState, StateStore, TargetHealth, epoch_millis,
};

use crate::compute::ComputeBackend;
use crate::policy::arbitrate;

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub desired: u32,
    /// Members not draining after the pass.
    pub current: u32,
    pub launched: Vec<InstanceId>,
    pub draining: Vec<InstanceId>,
    pub deregistered: Vec<InstanceId>,
    /// A new desired value was held back by the cooldown.
    pub cooldown_held: bool,
}

/// Owns capacity decisions for one fleet.
///
/// Only one reconciler may act on a fleet at a time; the controller keeps
/// it behind a mutex.
pub struct FleetReconciler {
    fleet: FleetSpec,
    /// Port targets listen on, from the fleet's target group.
    target_port: u16,
    state: StateStore,
    compute: Arc<dyn ComputeBackend>,
    metrics: Option<Arc<MetricsCollector>>,
    /// Unix milliseconds of the last desired-capacity change.
    last_scaled_at: Option<u64>,
}

impl FleetReconciler {
    pub fn new(
        fleet: FleetSpec,
        target_port: u16,
        state: StateStore,
        compute: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            fleet,
            target_port,
            state,
            compute,
            metrics: None,
            last_scaled_at: None,
        }
    }

    /// Read in-flight counts from a collector when draining.
    ///
    /// Without one, draining members are treated as idle.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn fleet(&self) -> &FleetSpec {
        &self.fleet
    }

    /// The stored fleet snapshot, or a fresh one at minimum capacity.
    /// Bounds always come from the fleet definition.
    pub fn fleet_state(&self) -> anyhow::Result<FleetState> {
        let mut fleet = self
            .state
            .get_fleet_state(&self.fleet.name)?
            .unwrap_or_else(|| {
                FleetState::new(&self.fleet.name, self.fleet.min_capacity, self.fleet.max_capacity)
            });
        fleet.min_capacity = self.fleet.min_capacity;
        fleet.max_capacity = self.fleet.max_capacity;
        Ok(fleet)
    }

    /// Members of this fleet in its target group.
    fn members(&self) -> anyhow::Result<Vec<MemberState>> {
        Ok(self
            .state
            .list_members_for_group(&self.fleet.target_group)?
            .into_iter()
            .filter(|m| m.fleet == self.fleet.name)
            .collect())
    }

    fn in_cooldown(&self, now: u64) -> bool {
        let cooldown = self.fleet.cooldown.as_millis() as u64;
        self.last_scaled_at
            .is_some_and(|at| now.saturating_sub(at) < cooldown)
    }

    /// Run one reconcile pass with the latest proposal of each policy.
    pub async fn reconcile(&mut self, proposals: &[u32]) -> anyhow::Result<ReconcileReport> {
        let mut report = ReconcileReport {
            deregistered: self.finish_drains().await?,
            ..Default::default()
        };

        let mut fleet = self.fleet_state()?;
        let members = self.members()?;
        let active: Vec<&MemberState> = members
            .iter()
            .filter(|m| m.health != TargetHealth::Draining)
            .collect();
        fleet.current_capacity = active.len() as u32;

        let now = epoch_millis();
        let wanted = arbitrate(proposals, &fleet);
        if wanted != fleet.desired_capacity && self.in_cooldown(now) {
            debug!(
                fleet = %self.fleet.name,
                desired = fleet.desired_capacity,
                wanted,
                "capacity change held by cooldown"
            );
            report.cooldown_held = true;
            let held = fleet.desired_capacity;
            fleet.set_desired(held);
        } else if wanted != fleet.desired_capacity {
            info!(
                fleet = %self.fleet.name,
                from = fleet.desired_capacity,
                to = wanted,
                current = fleet.current_capacity,
                "desired capacity changed"
            );
            fleet.set_desired(wanted);
            self.last_scaled_at = Some(now);
        }

        let drift = fleet.drift();
        if drift > 0 {
            for _ in 0..drift {
                match self.launch_member() {
                    Ok(member) => report.launched.push(member.id),
                    Err(e) => {
                        error!(fleet = %self.fleet.name, error = %e, "instance launch failed");
                        break;
                    }
                }
            }
        } else if drift < 0 {
            let victims = select_for_scale_in(
                &members,
                drift.unsigned_abs() as usize,
                self.fleet.scale_in_preference,
            );
            for victim in victims {
                mark_draining(&self.state, &victim.target_group, &victim.id)?;
                info!(
                    fleet = %self.fleet.name,
                    instance = %victim.id,
                    health = ?victim.health,
                    "instance draining"
                );
                report.draining.push(victim.id.clone());
            }
        }

        fleet.current_capacity = (active.len() + report.launched.len() - report.draining.len()) as u32;
        fleet.updated_at = now;
        self.state.put_fleet_state(&fleet)?;

        report.desired = fleet.desired_capacity;
        report.current = fleet.current_capacity;
        if !report.launched.is_empty() || !report.draining.is_empty() || !report.deregistered.is_empty() {
            info!(
                fleet = %self.fleet.name,
                desired = report.desired,
                current = report.current,
                launched = report.launched.len(),
                draining = report.draining.len(),
                deregistered = report.deregistered.len(),
                "fleet reconciled"
            );
        }
        Ok(report)
    }

    /// Deregister and terminate draining members that are idle or whose
    /// drain timeout has passed.
    pub async fn finish_drains(&self) -> anyhow::Result<Vec<InstanceId>> {
        let now = epoch_millis();
        let timeout = self.fleet.drain_timeout.as_millis() as u64;
        let mut done = Vec::new();

        for member in self.members()? {
            if member.health != TargetHealth::Draining {
                continue;
            }
            let started = member.drain_started_at.unwrap_or(member.updated_at);
            let timed_out = now.saturating_sub(started) >= timeout;
            let in_flight = match &self.metrics {
                Some(m) => m.in_flight(&self.fleet.name, &member.id).await,
                None => 0,
            };

            if in_flight > 0 && !timed_out {
                debug!(instance = %member.id, in_flight, "instance still draining");
                continue;
            }

            self.compute.terminate(&member.id)?;
            self.state.delete_member(&member.target_group, &member.id)?;
            if let Some(m) = &self.metrics {
                m.forget_instance(&self.fleet.name, &member.id).await;
            }
            info!(
                fleet = %self.fleet.name,
                instance = %member.id,
                in_flight,
                timed_out,
                "instance deregistered"
            );
            done.push(member.id);
        }

        Ok(done)
    }

    /// Launch one instance and register it Initial.
    fn launch_member(&self) -> anyhow::Result<MemberState> {
        let launched = self
            .compute
            .launch(&self.fleet, self.fleet.bootstrap_script.as_deref())?;
        let member = MemberState {
            id: launched.id,
            fleet: self.fleet.name.clone(),
            target_group: self.fleet.target_group.clone(),
            address: format!("{}:{}", launched.private_ip, self.target_port),
            health: TargetHealth::Initial,
            bootstrap_script: self.fleet.bootstrap_script.clone(),
            launched_at: launched.launched_at,
            drain_started_at: None,
            updated_at: launched.launched_at,
        };
        self.state.put_member(&member)?;
        Ok(member)
    }
}

/// Pick `count` members to remove, in the order the preference dictates.
/// Draining members are never picked again.
pub fn select_for_scale_in(
    members: &[MemberState],
    count: usize,
    preference: ScaleInPreference,
) -> Vec<&MemberState> {
    let mut candidates: Vec<&MemberState> = members
        .iter()
        .filter(|m| m.health != TargetHealth::Draining)
        .collect();

    let oldest = |a: &&MemberState, b: &&MemberState| -> Ordering {
        a.launched_at.cmp(&b.launched_at).then_with(|| a.id.cmp(&b.id))
    };
    match preference {
        ScaleInPreference::UnhealthyFirst => candidates.sort_by(|a, b| {
            removal_rank(a.health)
                .cmp(&removal_rank(b.health))
                .then_with(|| oldest(a, b))
        }),
        ScaleInPreference::OldestFirst => candidates.sort_by(oldest),
        ScaleInPreference::NewestFirst => candidates.sort_by(|a, b| {
            b.launched_at.cmp(&a.launched_at).then_with(|| a.id.cmp(&b.id))
        }),
    }

    candidates.truncate(count);
    candidates
}

fn removal_rank(health: TargetHealth) -> u8 {
    match health {
        TargetHealth::Unhealthy => 0,
        TargetHealth::Initial => 1,
        TargetHealth::Healthy => 2,
        TargetHealth::Draining => 3,
    }
}
