//! Routing with load accounting.
//!
//! `MeteredRouter` wraps a `Router` and reports every request forwarded to
//! a fleet's target group to the metrics collector. The request stays in
//! flight on its target until its `RequestLease` is finished, which is what
//! scale-in drains wait on. Fixed responses and failed routes are not
//! counted.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use webtier_metrics::MetricsCollector;
use webtier_state::InstanceId;

use crate::error::RoutingError;
use crate::router::{RouteDecision, Router};

/// A forwarded request that is still being served.
#[derive(Debug)]
#[must_use = "an unfinished lease keeps its request in flight"]
pub struct RequestLease {
    fleet: String,
    instance_id: InstanceId,
}

impl RequestLease {
    pub fn fleet(&self) -> &str {
        &self.fleet
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

/// A routing decision plus the lease of a counted forward.
#[derive(Debug)]
pub struct Routed {
    pub decision: RouteDecision,
    /// Set only for forwards into a fleet-backed target group.
    pub lease: Option<RequestLease>,
}

pub struct MeteredRouter {
    router: Router,
    metrics: Arc<MetricsCollector>,
    /// target group → fleet serving it.
    fleets: HashMap<String, String>,
}

impl MeteredRouter {
    pub fn new(router: Router, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            router,
            metrics,
            fleets: HashMap::new(),
        }
    }

    /// Attribute forwards into `target_group` to `fleet`.
    pub fn with_fleet(mut self, target_group: &str, fleet: &str) -> Self {
        self.fleets
            .insert(target_group.to_string(), fleet.to_string());
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Route a request and open an in-flight lease on the chosen target.
    pub async fn route(&self, path: &str) -> Result<Routed, RoutingError> {
        let decision = self.router.route(path)?;

        let lease = match &decision {
            RouteDecision::Forward {
                target_group,
                target,
                ..
            } => match self.fleets.get(target_group) {
                Some(fleet) => {
                    self.metrics
                        .begin_request(fleet, &target.instance_id)
                        .await;
                    Some(RequestLease {
                        fleet: fleet.clone(),
                        instance_id: target.instance_id.clone(),
                    })
                }
                None => None,
            },
            RouteDecision::FixedResponse { .. } => None,
        };

        Ok(Routed { decision, lease })
    }

    /// The leased request completed.
    pub async fn finish(&self, lease: RequestLease) {
        self.metrics
            .end_request(&lease.fleet, &lease.instance_id)
            .await;
        debug!(fleet = %lease.fleet, instance = %lease.instance_id, "request finished");
    }
}
