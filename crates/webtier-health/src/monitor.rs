//! Health monitor: background tasks that check registered targets.
//!
//! `HealthMonitor` spawns one task per target group member. Each task
//! probes the member at its group's interval, feeds the result through a
//! `HealthTracker` and persists every transition to the state store.
//! A task ends on its own once the member is deregistered or draining.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use webtier_core::HealthCheckSpec;
use webtier_state::{MemberState, StateError, StateStore, TargetHealth, member_key};

use crate::checker::{HealthTracker, ProbeResult, Transition, http_probe};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Performs one check against a target address.
///
/// The default prober is `http_probe`; tests swap in a scripted one.
pub type Prober = Arc<dyn Fn(String, HealthCheckSpec) -> BoxFuture<ProbeResult> + Send + Sync>;

/// Callback invoked after a transition has been persisted.
pub type HealthCallback = Arc<dyn Fn(MemberState, Transition) -> BoxFuture<()> + Send + Sync>;

/// Per-target monitor state.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Manages health check monitors for every registered target.
pub struct HealthMonitor {
    state: StateStore,
    /// Active monitors: `{target_group}:{instance_id}` → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
    prober: Prober,
    on_transition: Option<HealthCallback>,
}

impl HealthMonitor {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            monitors: Arc::new(RwLock::new(HashMap::new())),
            prober: http_prober(),
            on_transition: None,
        }
    }

    /// Replace the probe function.
    pub fn with_prober(mut self, prober: Prober) -> Self {
        self.prober = prober;
        self
    }

    /// Set a callback for health transitions.
    pub fn with_callback(mut self, callback: HealthCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }

    /// Start checking a member. Replaces any monitor already running for it.
    pub async fn start_monitor(&self, member: &MemberState, spec: &HealthCheckSpec) {
        let key = member.table_key();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = LoopContext {
            target_group: member.target_group.clone(),
            instance_id: member.id.clone(),
            address: member.address.clone(),
            spec: spec.clone(),
            state: self.state.clone(),
            prober: self.prober.clone(),
            callback: self.on_transition.clone(),
        };
        let initial = member.health;
        let handle = tokio::spawn(async move {
            run_health_loop(ctx, initial, shutdown_rx).await;
        });

        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.insert(key.clone(), MonitorSlot { handle, shutdown_tx }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(
            target = %key,
            address = %member.address,
            path = %spec.path,
            interval = ?spec.interval,
            "health monitor started"
        );
    }

    /// Stop checking a member.
    pub async fn stop_monitor(&self, target_group: &str, instance_id: &str) {
        let key = member_key(target_group, instance_id);
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(&key) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(target = %key, "health monitor stopped");
        }
    }

    /// Mark a member Draining and stop checking it.
    ///
    /// Returns the stored member, or `None` if it is not registered.
    pub async fn mark_draining(
        &self,
        target_group: &str,
        instance_id: &str,
    ) -> Result<Option<MemberState>, StateError> {
        self.stop_monitor(target_group, instance_id).await;
        mark_draining(&self.state, target_group, instance_id)
    }

    /// Align monitors with a target group's registered members.
    ///
    /// Starts monitors for members that have none, and stops monitors of
    /// members that are gone or draining. Returns `(started, stopped)`.
    pub async fn reconcile_group(
        &self,
        target_group: &str,
        spec: &HealthCheckSpec,
    ) -> Result<(usize, usize), StateError> {
        let members = self.state.list_members_for_group(target_group)?;
        let live: HashSet<String> = members
            .iter()
            .filter(|m| m.health != TargetHealth::Draining)
            .map(MemberState::table_key)
            .collect();

        let mut started = 0;
        for member in &members {
            let key = member.table_key();
            if live.contains(&key) && !self.monitors.read().await.contains_key(&key) {
                self.start_monitor(member, spec).await;
                started += 1;
            }
        }

        let prefix = format!("{target_group}:");
        let stale: Vec<String> = {
            let monitors = self.monitors.read().await;
            monitors
                .iter()
                .filter(|(key, slot)| {
                    key.starts_with(&prefix) && (!live.contains(*key) || slot.handle.is_finished())
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        let stopped = stale.len();
        if stopped > 0 {
            let mut monitors = self.monitors.write().await;
            for key in stale {
                if let Some(slot) = monitors.remove(&key) {
                    let _ = slot.shutdown_tx.send(true);
                    slot.handle.abort();
                    debug!(target = %key, "health monitor retired");
                }
            }
        }

        Ok((started, stopped))
    }

    /// Stop all monitors (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (key, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(target = %key, "health monitor stopped");
        }
        info!("all health monitors stopped");
    }

    /// Keys (`{target_group}:{instance_id}`) of active monitors.
    pub async fn active_monitors(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        monitors.keys().cloned().collect()
    }

    pub async fn is_monitoring(&self, target_group: &str, instance_id: &str) -> bool {
        let monitors = self.monitors.read().await;
        monitors.contains_key(&member_key(target_group, instance_id))
    }
}

/// Mark a member Draining in the store.
///
/// Draining is terminal: later check results never move the member back,
/// and its monitor task ends at its next probe. Returns the stored member,
/// or `None` if it is not registered.
pub fn mark_draining(
    state: &StateStore,
    target_group: &str,
    instance_id: &str,
) -> Result<Option<MemberState>, StateError> {
    let member = state.set_member_health(target_group, instance_id, TargetHealth::Draining)?;
    if let Some(m) = &member {
        info!(%target_group, %instance_id, drain_started_at = ?m.drain_started_at, "target draining");
    }
    Ok(member)
}

fn http_prober() -> Prober {
    Arc::new(
        |address: String, spec: HealthCheckSpec| -> BoxFuture<ProbeResult> {
            Box::pin(async move {
                http_probe(&address, &spec.path, spec.timeout, spec.success_codes).await
            })
        },
    )
}

/// Everything one health loop needs.
struct LoopContext {
    target_group: String,
    instance_id: String,
    address: String,
    spec: HealthCheckSpec,
    state: StateStore,
    prober: Prober,
    callback: Option<HealthCallback>,
}

/// The check loop for a single target.
async fn run_health_loop(
    ctx: LoopContext,
    initial: TargetHealth,
    mut shutdown: watch::Receiver<bool>,
) {
    let LoopContext {
        target_group,
        instance_id,
        address,
        spec,
        state,
        prober,
        callback,
    } = ctx;
    let mut tracker = HealthTracker::resume(&spec, initial);

    debug!(%target_group, %instance_id, %address, "health loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(spec.interval) => {
                // Deregistration or draining elsewhere ends the loop.
                match state.get_member(&target_group, &instance_id) {
                    Ok(Some(m)) if m.health == TargetHealth::Draining => {
                        debug!(%target_group, %instance_id, "target draining, health loop exiting");
                        break;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        debug!(%target_group, %instance_id, "target deregistered, health loop exiting");
                        break;
                    }
                    Err(e) => {
                        error!(%target_group, %instance_id, error = %e, "failed to read member");
                        continue;
                    }
                }

                let result = prober(address.clone(), spec.clone()).await;
                let Some(transition) = tracker.record(result) else {
                    continue;
                };

                match state.set_member_health(&target_group, &instance_id, transition.to) {
                    Ok(Some(member)) if member.health == transition.to => {
                        if let Some(cb) = &callback {
                            cb(member, transition).await;
                        }
                    }
                    Ok(Some(_)) => {
                        debug!(%target_group, %instance_id, "target draining, health loop exiting");
                        break;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(%target_group, %instance_id, error = %e, "failed to update health status in store");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!(%target_group, %instance_id, "health loop shutting down");
                break;
            }
        }
    }
}
