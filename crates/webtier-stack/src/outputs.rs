//! Output publisher: exposes the stack's entry point once it exists.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use webtier_state::{
    ProvisioningBackend, ResourceHandle, ResourceStatus, StackOutput, StateError, StateStore,
};

use crate::error::{StackError, StackResult};

/// Output key of the load balancer's DNS name.
pub const ALB_DNS_OUTPUT: &str = "albDNS";

/// Load balancer attribute holding its DNS name.
const DNS_NAME_ATTRIBUTE: &str = "dns_name";

/// Waits for resources to converge and publishes stack outputs.
pub struct OutputPublisher {
    backend: Arc<dyn ProvisioningBackend>,
    outputs: StateStore,
    poll_interval: Duration,
    max_attempts: u32,
}

impl OutputPublisher {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, outputs: StateStore) -> Self {
        Self {
            backend,
            outputs,
            poll_interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Poll until `handle` is Active.
    pub async fn wait_active(&self, handle: &ResourceHandle) -> StackResult<()> {
        for attempt in 1..=self.max_attempts {
            match self.backend.get_status(handle)? {
                ResourceStatus::Active => {
                    debug!(%handle, attempt, "resource active");
                    return Ok(());
                }
                ResourceStatus::Failed { reason } => {
                    return Err(StateError::ConvergenceFailed {
                        handle: handle.to_string(),
                        reason,
                    }
                    .into());
                }
                ResourceStatus::Pending => {
                    debug!(%handle, attempt, "resource pending");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }
        Err(StackError::NotConverged {
            handle: handle.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Wait for the load balancer, then publish its DNS name as `albDNS`.
    pub async fn publish_entry_point(&self, load_balancer: &ResourceHandle) -> StackResult<StackOutput> {
        self.wait_active(load_balancer).await?;

        let dns_name = self
            .backend
            .attribute(load_balancer, DNS_NAME_ATTRIBUTE)?
            .ok_or_else(|| StackError::MissingAttribute {
                handle: load_balancer.to_string(),
                attribute: DNS_NAME_ATTRIBUTE.to_string(),
            })?;

        let output = self.outputs.put_output(ALB_DNS_OUTPUT, &dns_name)?;
        info!(key = ALB_DNS_OUTPUT, value = %output.value, "output published");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webtier_state::ResourceKind;

    fn setup() -> (StateStore, ResourceHandle) {
        let store = StateStore::open_in_memory().unwrap();
        let handle = store
            .create_or_update(ResourceKind::LoadBalancer, "alb", &serde_json::json!({}))
            .unwrap();
        (store, handle)
    }

    fn publisher(store: &StateStore) -> OutputPublisher {
        OutputPublisher::new(Arc::new(store.clone()), store.clone())
            .with_polling(Duration::from_millis(10), 50)
    }

    #[tokio::test]
    async fn publishes_dns_of_active_load_balancer() {
        let (store, lb) = setup();
        let out = publisher(&store).publish_entry_point(&lb).await.unwrap();

        assert_eq!(out.key, "albDNS");
        assert_eq!(out.value, "alb.elb.localhost");
        assert_eq!(store.get_output("albDNS").unwrap().unwrap().value, "alb.elb.localhost");
    }

    #[tokio::test]
    async fn waits_for_pending_load_balancer() {
        let (store, lb) = setup();
        store.set_resource_status(&lb, ResourceStatus::Pending).unwrap();

        let flip = {
            let store = store.clone();
            let lb = lb.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                store.set_resource_status(&lb, ResourceStatus::Active).unwrap();
            })
        };

        let out = publisher(&store).publish_entry_point(&lb).await.unwrap();
        flip.await.unwrap();
        assert_eq!(out.value, "alb.elb.localhost");
    }

    #[tokio::test]
    async fn failed_load_balancer_is_a_convergence_error() {
        let (store, lb) = setup();
        store
            .set_resource_status(
                &lb,
                ResourceStatus::Failed {
                    reason: "quota exceeded".to_string(),
                },
            )
            .unwrap();

        let err = publisher(&store).publish_entry_point(&lb).await.unwrap_err();
        assert!(err.is_convergence());
        assert!(store.get_output("albDNS").unwrap().is_none());
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let (store, lb) = setup();
        store.set_resource_status(&lb, ResourceStatus::Pending).unwrap();

        let err = OutputPublisher::new(Arc::new(store.clone()), store.clone())
            .with_polling(Duration::from_millis(1), 3)
            .publish_entry_point(&lb)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::NotConverged { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn unknown_load_balancer_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let lb = ResourceHandle::new(ResourceKind::LoadBalancer, "missing");
        let err = publisher(&store).publish_entry_point(&lb).await.unwrap_err();
        assert!(matches!(err, StackError::State(StateError::NotFound(_))));
    }
}
