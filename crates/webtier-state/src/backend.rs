//! Provisioning backend contract.
//!
//! The control model never creates infrastructure itself. It hands
//! declarative specs to a backend that converges them and reports status.
//! `StateStore` is the local backend: it converges every spec on write.

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::*;

/// "Ensure resource matches spec" operations, with no negotiation.
pub trait ProvisioningBackend: Send + Sync {
    /// Converge a resource to `spec` and return its stable handle.
    fn create_or_update(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> StateResult<ResourceHandle>;

    /// Current convergence status of a resource.
    fn get_status(&self, handle: &ResourceHandle) -> StateResult<ResourceStatus>;

    /// Instances currently registered with a target group.
    fn list_members(&self, target_group: &ResourceHandle) -> StateResult<Vec<InstanceRef>>;

    /// A backend-assigned attribute of an active resource.
    fn attribute(&self, handle: &ResourceHandle, key: &str) -> StateResult<Option<String>>;
}

impl ProvisioningBackend for StateStore {
    fn create_or_update(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> StateResult<ResourceHandle> {
        self.converge_resource(kind, name, spec)
    }

    fn get_status(&self, handle: &ResourceHandle) -> StateResult<ResourceStatus> {
        self.get_resource(handle)?
            .map(|r| r.status)
            .ok_or_else(|| StateError::NotFound(handle.to_string()))
    }

    fn list_members(&self, target_group: &ResourceHandle) -> StateResult<Vec<InstanceRef>> {
        Ok(self
            .list_members_for_group(target_group.name())?
            .iter()
            .map(MemberState::instance_ref)
            .collect())
    }

    fn attribute(&self, handle: &ResourceHandle, key: &str) -> StateResult<Option<String>> {
        Ok(self
            .get_resource(handle)?
            .and_then(|r| r.attributes.get(key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    #[test]
    fn status_of_unknown_handle_is_not_found() {
        let b = backend();
        let h = ResourceHandle::new(ResourceKind::LoadBalancer, "alb");
        assert!(matches!(b.get_status(&h), Err(StateError::NotFound(_))));
    }

    #[test]
    fn create_then_status_active() {
        let b = backend();
        let h = b
            .create_or_update(ResourceKind::SecurityGroup, "sg", &json!({"rules": []}))
            .unwrap();
        assert_eq!(b.get_status(&h).unwrap(), ResourceStatus::Active);
    }

    #[test]
    fn list_members_reads_target_group_by_handle() {
        let b = backend();
        let h = b
            .create_or_update(ResourceKind::TargetGroup, "web", &json!({}))
            .unwrap();
        b.put_member(&MemberState {
            id: "i-1".to_string(),
            fleet: "asg".to_string(),
            target_group: "web".to_string(),
            address: "10.0.1.4:3000".to_string(),
            health: TargetHealth::Initial,
            bootstrap_script: None,
            launched_at: 0,
            drain_started_at: None,
            updated_at: 0,
        })
        .unwrap();

        let members = b.list_members(&h).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].address, "10.0.1.4:3000");
    }

    #[test]
    fn backend_is_object_safe() {
        let b: Box<dyn ProvisioningBackend> = Box::new(backend());
        let h = b
            .create_or_update(ResourceKind::LoadBalancer, "alb", &json!({}))
            .unwrap();
        assert_eq!(
            b.attribute(&h, "dns_name").unwrap().as_deref(),
            Some("alb.elb.localhost")
        );
    }
}
