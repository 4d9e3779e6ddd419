//! Planning and applying a stack.
//!
//! A stack is applied as an ordered list of "ensure resource matches
//! spec" calls against a `ProvisioningBackend`. Validation runs first, so
//! an invalid definition never reaches the backend.

use serde::Serialize;
use tracing::{debug, info};

use webtier_core::StackSpec;
use webtier_state::{ProvisioningBackend, ResourceHandle, ResourceKind, ResourceStatus, StateError};

use crate::error::StackResult;

/// One resource as it will be handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub spec: serde_json::Value,
}

/// Handles of everything an apply converged.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub stack: String,
    pub resources: Vec<(ResourceKind, ResourceHandle)>,
    pub load_balancer: ResourceHandle,
}

impl ApplyReport {
    /// Handles of one resource kind, in apply order.
    pub fn handles(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceHandle> {
        self.resources
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, h)| h)
    }
}

/// Validate a stack and lay out its resources in dependency order:
/// network, security group, load balancer, target groups, listener, fleet.
pub fn plan(spec: &StackSpec) -> StackResult<Vec<PlannedResource>> {
    spec.validate()?;

    let mut planned = Vec::with_capacity(5 + spec.target_groups.len());
    let mut push = |kind: ResourceKind, name: &str, value: serde_json::Value| {
        planned.push(PlannedResource {
            kind,
            name: name.to_string(),
            spec: value,
        });
    };

    push(ResourceKind::Network, &spec.network.id, serde_json::to_value(&spec.network)?);
    push(
        ResourceKind::SecurityGroup,
        &spec.security_group.name,
        serde_json::to_value(&spec.security_group)?,
    );
    push(
        ResourceKind::LoadBalancer,
        &spec.load_balancer.name,
        serde_json::to_value(&spec.load_balancer)?,
    );
    for tg in &spec.target_groups {
        push(ResourceKind::TargetGroup, &tg.name, serde_json::to_value(tg)?);
    }
    push(
        ResourceKind::Listener,
        &listener_name(spec),
        serde_json::to_value(&spec.listener)?,
    );
    push(ResourceKind::Fleet, &spec.fleet.name, serde_json::to_value(&spec.fleet)?);

    Ok(planned)
}

fn listener_name(spec: &StackSpec) -> String {
    format!("{}-{}", spec.load_balancer.name, spec.listener.port)
}

/// Provision every resource of a stack through `backend`.
///
/// Fails fast on an invalid definition, on an immutable resource whose spec
/// changed, and on any resource the backend reports as failed.
pub fn apply<B: ProvisioningBackend + ?Sized>(
    spec: &StackSpec,
    backend: &B,
) -> StackResult<ApplyReport> {
    let planned = plan(spec)?;
    info!(stack = %spec.name, resources = planned.len(), "applying stack");

    let mut resources = Vec::with_capacity(planned.len());
    for resource in &planned {
        let handle = backend.create_or_update(resource.kind, &resource.name, &resource.spec)?;
        match backend.get_status(&handle)? {
            ResourceStatus::Failed { reason } => {
                return Err(StateError::ConvergenceFailed {
                    handle: handle.to_string(),
                    reason,
                }
                .into());
            }
            status => debug!(%handle, ?status, "resource submitted"),
        }
        resources.push((resource.kind, handle));
    }

    let load_balancer = ResourceHandle::new(ResourceKind::LoadBalancer, &spec.load_balancer.name);
    info!(stack = %spec.name, "stack applied");
    Ok(ApplyReport {
        stack: spec.name.clone(),
        resources,
        load_balancer,
    })
}
