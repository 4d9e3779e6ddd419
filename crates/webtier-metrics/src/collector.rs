//! Metrics collector: tracks per-fleet request load and CPU utilization.
//!
//! Counters are atomics; per-instance gauges sit behind a mutex. Each
//! snapshot closes the current window and starts the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use webtier_state::{InstanceId, MetricsSnapshot, StateStore, TargetHealth, epoch_millis};

/// Per-fleet metrics bucket.
struct FleetMetrics {
    target_group: String,
    /// Requests routed since the last snapshot.
    request_count: AtomicU64,
    /// Unix milliseconds at which the current window opened.
    window_start: AtomicU64,
    /// Requests currently being served, per instance.
    in_flight: Mutex<HashMap<InstanceId, u64>>,
    /// Latest CPU utilization sample (0–100), per instance.
    cpu: Mutex<HashMap<InstanceId, f64>>,
}

impl FleetMetrics {
    fn new(target_group: &str) -> Self {
        Self {
            target_group: target_group.to_string(),
            request_count: AtomicU64::new(0),
            window_start: AtomicU64::new(epoch_millis()),
            in_flight: Mutex::new(HashMap::new()),
            cpu: Mutex::new(HashMap::new()),
        }
    }
}

/// Snapshots kept per fleet unless overridden with `with_retention`.
pub const DEFAULT_RETENTION: usize = 120;

/// Collects load signals for every fleet and periodically snapshots
/// them to the state store.
pub struct MetricsCollector {
    /// fleet name → metrics.
    metrics: Arc<RwLock<HashMap<String, Arc<FleetMetrics>>>>,
    state: StateStore,
    interval: Duration,
    retention: usize,
}

impl MetricsCollector {
    pub fn new(state: StateStore, interval: Duration) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
            state,
            interval,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep at most `keep` stored snapshots per fleet (never fewer than one).
    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = keep.max(1);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register a fleet and the target group its instances serve.
    pub async fn register(&self, fleet: &str, target_group: &str) {
        let mut metrics = self.metrics.write().await;
        metrics
            .entry(fleet.to_string())
            .or_insert_with(|| Arc::new(FleetMetrics::new(target_group)));
        debug!(%fleet, %target_group, "registered for metrics collection");
    }

    pub async fn unregister(&self, fleet: &str) {
        let mut metrics = self.metrics.write().await;
        metrics.remove(fleet);
        debug!(%fleet, "unregistered from metrics collection");
    }

    async fn fleet(&self, fleet: &str) -> Option<Arc<FleetMetrics>> {
        self.metrics.read().await.get(fleet).cloned()
    }

    /// Count one routed request without in-flight tracking.
    pub async fn record_request(&self, fleet: &str) {
        if let Some(m) = self.fleet(fleet).await {
            m.request_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A request was forwarded to `instance` and is now in flight.
    pub async fn begin_request(&self, fleet: &str, instance: &str) {
        if let Some(m) = self.fleet(fleet).await {
            m.request_count.fetch_add(1, Ordering::Relaxed);
            *m.in_flight.lock().await.entry(instance.to_string()).or_insert(0) += 1;
        }
    }

    /// A request on `instance` completed.
    pub async fn end_request(&self, fleet: &str, instance: &str) {
        if let Some(m) = self.fleet(fleet).await {
            let mut in_flight = m.in_flight.lock().await;
            if let Some(n) = in_flight.get_mut(instance) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    in_flight.remove(instance);
                }
            }
        }
    }

    /// Requests currently in flight on an instance.
    pub async fn in_flight(&self, fleet: &str, instance: &str) -> u64 {
        match self.fleet(fleet).await {
            Some(m) => m.in_flight.lock().await.get(instance).copied().unwrap_or(0),
            None => 0,
        }
    }

    /// Record a CPU utilization sample for an instance.
    pub async fn record_cpu(&self, fleet: &str, instance: &str, percent: f64) {
        if let Some(m) = self.fleet(fleet).await {
            m.cpu
                .lock()
                .await
                .insert(instance.to_string(), percent.clamp(0.0, 100.0));
        }
    }

    /// Record a CPU sample reported by a registered member.
    ///
    /// The sample is filed under the member's own fleet. Returns false
    /// when the member is unknown or its fleet is not collected.
    pub async fn ingest_cpu(
        &self,
        target_group: &str,
        instance_id: &str,
        percent: f64,
    ) -> anyhow::Result<bool> {
        let Some(member) = self.state.get_member(target_group, instance_id)? else {
            return Ok(false);
        };
        if self.fleet(&member.fleet).await.is_none() {
            return Ok(false);
        }
        self.record_cpu(&member.fleet, instance_id, percent).await;
        debug!(%target_group, %instance_id, percent, "cpu sample ingested");
        Ok(true)
    }

    /// Drop every gauge of a deregistered instance.
    pub async fn forget_instance(&self, fleet: &str, instance: &str) {
        if let Some(m) = self.fleet(fleet).await {
            m.in_flight.lock().await.remove(instance);
            m.cpu.lock().await.remove(instance);
        }
    }

    /// Requests counted in the current window (without resetting).
    pub async fn current_request_count(&self, fleet: &str) -> u64 {
        self.fleet(fleet)
            .await
            .map(|m| m.request_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn registered_fleets(&self) -> Vec<String> {
        let metrics = self.metrics.read().await;
        metrics.keys().cloned().collect()
    }

    /// Close the current window of every fleet and persist a snapshot each.
    pub async fn snapshot(&self) -> anyhow::Result<Vec<MetricsSnapshot>> {
        let fleets: Vec<(String, Arc<FleetMetrics>)> = {
            let metrics = self.metrics.read().await;
            metrics.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let mut snapshots = Vec::with_capacity(fleets.len());

        for (fleet, m) in fleets {
            let members = self.state.list_members_for_group(&m.target_group)?;
            let now = epoch_millis();

            let request_count = m.request_count.swap(0, Ordering::Relaxed);
            let window_start = m.window_start.swap(now, Ordering::Relaxed);
            let elapsed_ms = now.saturating_sub(window_start);
            let window_secs = if elapsed_ms == 0 {
                self.interval.as_secs_f64()
            } else {
                elapsed_ms as f64 / 1000.0
            };

            let cpu = m.cpu.lock().await;
            let healthy_samples: Vec<f64> = members
                .iter()
                .filter(|member| member.health == TargetHealth::Healthy)
                .filter_map(|member| cpu.get(&member.id).copied())
                .collect();
            drop(cpu);

            let average_cpu_percent = if healthy_samples.is_empty() {
                0.0
            } else {
                healthy_samples.iter().sum::<f64>() / healthy_samples.len() as f64
            };

            let snapshot = MetricsSnapshot {
                fleet: fleet.clone(),
                epoch: now,
                window_secs,
                request_count,
                request_rate_per_minute: request_count as f64 * 60.0 / window_secs,
                average_cpu_percent,
                healthy_instances: healthy_samples.len() as u32,
            };

            self.state.put_metrics(&snapshot)?;
            self.state.prune_metrics(&fleet, self.retention)?;
            debug!(
                %fleet,
                requests = request_count,
                rate_per_minute = snapshot.request_rate_per_minute,
                cpu = average_cpu_percent,
                healthy = snapshot.healthy_instances,
                "metrics snapshot persisted"
            );
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    /// Run the snapshot loop until shutdown signal.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval = ?self.interval, "metrics collector started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.snapshot().await {
                        tracing::error!(error = %e, "metrics snapshot failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    let _ = self.snapshot().await;
                    break;
                }
            }
        }
    }
}
