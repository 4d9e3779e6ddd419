//! `webtierd run`: apply the stack, then keep it converged until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use webtier_autoscale::FleetController;
use webtier_core::StackSpec;
use webtier_health::{BoxFuture, HealthCallback, HealthMonitor, Transition};
use webtier_metrics::MetricsCollector;
use webtier_routing::{MeteredRouter, Router, TargetSync};
use webtier_stack::ALB_DNS_OUTPUT;
use webtier_state::{MemberState, StateStore};

use crate::commands::{self, Context};
use crate::front_door::FrontDoor;

pub async fn run(
    ctx: &Context,
    listen: SocketAddr,
    metrics_interval: u64,
    sync_interval: u64,
) -> anyhow::Result<()> {
    info!("webtier daemon starting");

    let spec = ctx.load_spec()?;
    let state = ctx.open_state()?;
    info!(stack = %spec.name, data_dir = ?ctx.data_dir, "state store opened");

    // ── Provision ──────────────────────────────────────────────

    let provisioned = commands::provision(&spec, &state).await?;
    info!(key = ALB_DNS_OUTPUT, value = %provisioned.entry_point.value, "entry point published");

    // ── Initialize subsystems ──────────────────────────────────

    let target_sync = Arc::new(TargetSync::new(Router::new(&spec.listener)?));
    target_sync.sync(&state)?;

    let metrics = Arc::new(MetricsCollector::new(
        state.clone(),
        Duration::from_secs(metrics_interval),
    ));
    metrics
        .register(&spec.fleet.name, &spec.fleet.target_group)
        .await;
    info!(interval = metrics_interval, "metrics collector initialized");

    let front_door = FrontDoor::new(
        MeteredRouter::new(target_sync.router().clone(), metrics.clone())
            .with_fleet(&spec.fleet.target_group, &spec.fleet.name),
        metrics.clone(),
    );

    let monitor = Arc::new(
        HealthMonitor::new(state.clone())
            .with_callback(router_refresh(target_sync.clone(), state.clone())),
    );
    info!("health monitor initialized");

    let controller = FleetController::new(
        provisioned.reconciler.with_metrics(metrics.clone()),
        state.clone(),
    );
    info!(fleet = %spec.fleet.name, policies = spec.fleet.policies.len(), "fleet controller initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let metrics_handle = {
        let metrics = metrics.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            metrics.run(shutdown).await;
        })
    };

    let controller_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            controller.run(shutdown).await;
        })
    };

    let membership_handle = tokio::spawn(membership_loop(
        spec.clone(),
        state.clone(),
        monitor.clone(),
        target_sync.clone(),
        Duration::from_secs(sync_interval),
        shutdown_rx.clone(),
    ));

    let front_door_handle = tokio::spawn(async move {
        if let Err(e) = front_door.serve(listen, shutdown_rx).await {
            error!(error = %e, "front door failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = front_door_handle.await;
    let _ = membership_handle.await;
    let _ = controller_handle.await;
    let _ = metrics_handle.await;
    monitor.stop_all().await;

    info!("webtier daemon stopped");
    Ok(())
}

/// Refresh a group's router snapshot whenever one of its members changes
/// health.
fn router_refresh(sync: Arc<TargetSync>, state: StateStore) -> HealthCallback {
    Arc::new(move |member: MemberState, transition: Transition| -> BoxFuture<()> {
        let sync = sync.clone();
        let state = state.clone();
        Box::pin(async move {
            match state.list_members_for_group(&member.target_group) {
                Ok(members) => {
                    sync.on_members_changed(&member.target_group, &members);
                    debug!(
                        instance = %member.id,
                        from = ?transition.from,
                        to = ?transition.to,
                        "router refreshed after health change"
                    );
                }
                Err(e) => warn!(target_group = %member.target_group, error = %e, "router refresh failed"),
            }
        })
    })
}

/// Periodically align monitors and router snapshots with membership,
/// which the fleet reconciler changes on its own schedule.
async fn membership_loop(
    spec: StackSpec,
    state: StateStore,
    monitor: Arc<HealthMonitor>,
    sync: Arc<TargetSync>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    follow_membership(&spec, &state, &monitor, &sync).await;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                follow_membership(&spec, &state, &monitor, &sync).await;
            }
            _ = shutdown.changed() => {
                debug!("membership loop shutting down");
                break;
            }
        }
    }
}

async fn follow_membership(
    spec: &StackSpec,
    state: &StateStore,
    monitor: &HealthMonitor,
    sync: &TargetSync,
) {
    for tg in &spec.target_groups {
        match monitor.reconcile_group(&tg.name, &tg.health_check).await {
            Ok((0, 0)) => {}
            Ok((started, stopped)) => {
                debug!(target_group = %tg.name, started, stopped, "health monitors aligned")
            }
            Err(e) => error!(target_group = %tg.name, error = %e, "monitor reconcile failed"),
        }
    }
    if let Err(e) = sync.sync(state) {
        error!(error = %e, "router sync failed");
    }
}
