//! Fleet controller: policy tickers feeding a single reconciler.
//!
//! Each scaling policy runs in its own task on its own collection
//! interval. Proposals flow over an mpsc channel to the reconcile loop,
//! which keeps the latest proposal per policy and reconciles with their
//! maximum. The reconciler sits behind a `tokio::sync::Mutex` so at most
//! one capacity decision is in flight per fleet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use webtier_core::ScalingPolicy;
use webtier_state::StateStore;

use crate::policy::{Proposal, propose};
use crate::reconciler::FleetReconciler;

/// Default interval for checking whether draining members can go.
const DRAIN_POLL: Duration = Duration::from_secs(5);

/// Runs the scaling loop of one fleet.
pub struct FleetController {
    reconciler: Arc<Mutex<FleetReconciler>>,
    state: StateStore,
    drain_poll: Duration,
}

impl FleetController {
    pub fn new(reconciler: FleetReconciler, state: StateStore) -> Self {
        Self {
            reconciler: Arc::new(Mutex::new(reconciler)),
            state,
            drain_poll: DRAIN_POLL,
        }
    }

    pub fn with_drain_poll(mut self, interval: Duration) -> Self {
        self.drain_poll = interval;
        self
    }

    /// Shared handle to the reconciler, e.g. for an initial pass.
    pub fn reconciler(&self) -> Arc<Mutex<FleetReconciler>> {
        self.reconciler.clone()
    }

    /// Run policy tickers and the reconcile loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let fleet = self.reconciler.lock().await.fleet().clone();
        let (tx, mut rx) = mpsc::channel::<Proposal>(64);

        let tickers: Vec<_> = fleet
            .policies
            .iter()
            .map(|policy| {
                tokio::spawn(run_policy_ticker(
                    policy.clone(),
                    fleet.name.clone(),
                    self.state.clone(),
                    tx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        drop(tx);

        info!(fleet = %fleet.name, policies = tickers.len(), "fleet controller started");

        let mut latest: HashMap<String, u32> = HashMap::new();
        let mut drain_tick = tokio::time::interval(self.drain_poll);

        loop {
            tokio::select! {
                Some(proposal) = rx.recv() => {
                    latest.insert(proposal.policy.clone(), proposal.desired);
                    let proposals: Vec<u32> = latest.values().copied().collect();

                    let mut reconciler = self.reconciler.lock().await;
                    match reconciler.reconcile(&proposals).await {
                        Ok(report) => debug!(
                            fleet = %fleet.name,
                            policy = %proposal.policy,
                            proposed = proposal.desired,
                            desired = report.desired,
                            current = report.current,
                            "reconcile pass"
                        ),
                        Err(e) => error!(fleet = %fleet.name, error = %e, "reconcile failed"),
                    }
                }
                _ = drain_tick.tick() => {
                    let reconciler = self.reconciler.lock().await;
                    if let Err(e) = reconciler.finish_drains().await {
                        error!(fleet = %fleet.name, error = %e, "drain check failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(fleet = %fleet.name, "fleet controller shutting down");
                    break;
                }
            }
        }

        for ticker in tickers {
            let _ = ticker.await;
        }
    }
}

/// Compute one policy's proposal from the latest stored metrics.
pub fn collect_proposal(
    policy: &ScalingPolicy,
    fleet: &str,
    state: &StateStore,
) -> anyhow::Result<Option<Proposal>> {
    let Some(snapshot) = state.latest_metrics(fleet)? else {
        return Ok(None);
    };
    let current = state
        .get_fleet_state(fleet)?
        .map(|f| f.current_capacity)
        .unwrap_or(0);

    Ok(propose(policy, &snapshot, current).map(|desired| Proposal {
        fleet: fleet.to_string(),
        policy: policy.name.clone(),
        desired,
    }))
}

async fn run_policy_ticker(
    policy: ScalingPolicy,
    fleet: String,
    state: StateStore,
    tx: mpsc::Sender<Proposal>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(policy = %policy.name, %fleet, interval = ?policy.collection_interval, "policy ticker starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(policy.collection_interval) => {
                match collect_proposal(&policy, &fleet, &state) {
                    Ok(Some(proposal)) => {
                        if tx.send(proposal).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!(policy = %policy.name, %fleet, "no metrics for policy"),
                    Err(e) => warn!(policy = %policy.name, %fleet, error = %e, "policy tick failed"),
                }
            }
            _ = shutdown.changed() => {
                debug!(policy = %policy.name, %fleet, "policy ticker shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webtier_core::{ScalingMetric, StackConfig};
    use webtier_state::MetricsSnapshot;

    use crate::compute::LocalCompute;

    fn snapshot(rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            fleet: "asg".to_string(),
            epoch: 1,
            window_secs: 60.0,
            request_count: rate as u64,
            request_rate_per_minute: rate,
            average_cpu_percent: 0.0,
            healthy_instances: 0,
        }
    }

    fn controller(state: &StateStore, interval: Duration) -> FleetController {
        let spec = StackConfig::scaffold("web").into_spec().unwrap();
        let compute = Arc::new(LocalCompute::for_fleet(&spec.network, &spec.fleet).unwrap());
        let mut fleet = spec.fleet;
        fleet.cooldown = Duration::ZERO;
        for p in &mut fleet.policies {
            p.collection_interval = interval;
        }
        let r = FleetReconciler::new(fleet, 3000, state.clone(), compute);
        FleetController::new(r, state.clone()).with_drain_poll(interval)
    }

    #[test]
    fn collect_proposal_without_metrics_is_none() {
        let state = StateStore::open_in_memory().unwrap();
        let policy = ScalingPolicy {
            name: "requests".to_string(),
            metric: ScalingMetric::RequestRateTarget {
                per_instance_target_per_minute: 60.0,
            },
            collection_interval: Duration::from_secs(60),
        };
        assert!(collect_proposal(&policy, "asg", &state).unwrap().is_none());

        state.put_metrics(&snapshot(179.0)).unwrap();
        let p = collect_proposal(&policy, "asg", &state).unwrap().unwrap();
        assert_eq!(p.desired, 3);
        assert_eq!(p.policy, "requests");
    }

    #[tokio::test]
    async fn controller_scales_fleet_from_metrics() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_metrics(&snapshot(179.0)).unwrap();

        let controller = Arc::new(controller(&state, Duration::from_millis(10)));
        let (tx, rx) = watch::channel(false);
        let c = controller.clone();
        let task = tokio::spawn(async move { c.run(rx).await });

        let mut scaled = false;
        for _ in 0..200 {
            if state.list_members_for_group("default-targets").unwrap().len() == 3 {
                scaled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(scaled);
        let fleet = state.get_fleet_state("asg").unwrap().unwrap();
        assert_eq!(fleet.desired_capacity, 3);
    }

    #[tokio::test]
    async fn controller_stops_on_shutdown() {
        let state = StateStore::open_in_memory().unwrap();
        let controller = Arc::new(controller(&state, Duration::from_secs(3600)));
        let (tx, rx) = watch::channel(false);
        let c = controller.clone();
        let task = tokio::spawn(async move { c.run(rx).await });

        tx.send(true).unwrap();
        task.await.unwrap();
        assert!(state.get_fleet_state("asg").unwrap().is_none());
    }
}
