//! Request routing: resolves a request path to a response decision.
//!
//! The router holds the rule table and a snapshot of every target group's
//! members. `route` selects one rule, then either answers with the rule's
//! fixed response or picks a healthy member of the referenced group by
//! round-robin.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use webtier_core::{DefinitionError, ListenerSpec, RuleAction};
use webtier_state::{InstanceId, TargetHealth};

use crate::balancer::RoundRobinBalancer;
use crate::error::RoutingError;
use crate::rules::RuleTable;

/// A target as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub instance_id: InstanceId,
    /// Listen address (ip:port).
    pub address: String,
    pub health: TargetHealth,
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RouteDecision {
    Forward {
        /// `None` when the implicit default rule matched.
        rule_priority: Option<u32>,
        target_group: String,
        target: Target,
    },
    FixedResponse {
        rule_priority: Option<u32>,
        status_code: u16,
        content_type: String,
        body: String,
    },
}

/// Internal state for a single target group.
struct GroupEntry {
    targets: Vec<Target>,
    balancer: RoundRobinBalancer,
}

/// Routes requests by listener rules, forwarding round-robin across
/// healthy targets.
#[derive(Clone)]
pub struct Router {
    rules: Arc<RuleTable>,
    groups: Arc<RwLock<HashMap<String, GroupEntry>>>,
}

impl Router {
    /// Build a router for a listener. Fails on an invalid rule set.
    pub fn new(listener: &ListenerSpec) -> Result<Self, DefinitionError> {
        Ok(Self::with_rules(RuleTable::new(listener)?))
    }

    pub fn with_rules(rules: RuleTable) -> Self {
        Self {
            rules: Arc::new(rules),
            groups: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Route a request by its path.
    pub fn route(&self, path: &str) -> Result<RouteDecision, RoutingError> {
        let selected = self.rules.select(path);

        match selected.action {
            RuleAction::FixedResponse {
                status_code,
                content_type,
                body,
            } => {
                debug!(path, priority = ?selected.priority, status_code, "fixed response");
                Ok(RouteDecision::FixedResponse {
                    rule_priority: selected.priority,
                    status_code: *status_code,
                    content_type: content_type.clone(),
                    body: body.clone(),
                })
            }
            RuleAction::Forward { target_group } => {
                let target = self.next_target(target_group).inspect_err(|e| {
                    warn!(path, %target_group, error = %e, "request failed");
                })?;
                debug!(
                    path,
                    priority = ?selected.priority,
                    %target_group,
                    target = %target.address,
                    "forward"
                );
                Ok(RouteDecision::Forward {
                    rule_priority: selected.priority,
                    target_group: target_group.clone(),
                    target,
                })
            }
        }
    }

    /// Select the next healthy target of a group (round-robin by instance id).
    pub fn next_target(&self, target_group: &str) -> Result<Target, RoutingError> {
        let groups = self.groups.read().expect("groups lock");
        let entry = groups
            .get(target_group)
            .ok_or_else(|| RoutingError::UnknownTargetGroup(target_group.to_string()))?;

        let healthy: Vec<&Target> = entry
            .targets
            .iter()
            .filter(|t| t.health.is_routable())
            .collect();

        let keys: Vec<&str> = healthy.iter().map(|t| t.instance_id.as_str()).collect();
        let idx = entry
            .balancer
            .next(&keys)
            .ok_or_else(|| RoutingError::NoHealthyTargets {
                target_group: target_group.to_string(),
            })?;
        Ok(healthy[idx].clone())
    }

    /// Replace the member snapshot of a target group.
    ///
    /// The round-robin position survives the update.
    pub fn update_group(&self, target_group: &str, targets: Vec<Target>) {
        let mut groups = self.groups.write().expect("groups lock");
        debug!(
            target_group,
            count = targets.len(),
            healthy = targets.iter().filter(|t| t.health.is_routable()).count(),
            "updated target group snapshot"
        );
        groups
            .entry(target_group.to_string())
            .and_modify(|e| e.targets = targets.clone())
            .or_insert_with(|| GroupEntry {
                targets,
                balancer: RoundRobinBalancer::new(),
            });
    }

    /// Remove a target group entirely.
    pub fn remove_group(&self, target_group: &str) {
        let mut groups = self.groups.write().expect("groups lock");
        groups.remove(target_group);
    }

    /// All targets of a group, routable or not.
    pub fn targets(&self, target_group: &str) -> Vec<Target> {
        let groups = self.groups.read().expect("groups lock");
        groups
            .get(target_group)
            .map(|e| e.targets.clone())
            .unwrap_or_default()
    }

    /// List all registered target group names.
    pub fn list_groups(&self) -> Vec<String> {
        let groups = self.groups.read().expect("groups lock");
        groups.keys().cloned().collect()
    }
}
