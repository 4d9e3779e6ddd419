//! Compute backend: launches and terminates fleet instances.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use anyhow::{Context, bail};
use tracing::{debug, info};

use webtier_core::{Cidr, FleetSpec, NetworkSpec};
use webtier_state::{InstanceId, epoch_millis};

/// An instance returned by a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub id: InstanceId,
    pub private_ip: Ipv4Addr,
    /// Unix milliseconds.
    pub launched_at: u64,
}

/// Starts and stops machines for a fleet.
pub trait ComputeBackend: Send + Sync {
    /// Launch one instance of `fleet`, passing the bootstrap script reference.
    fn launch(&self, fleet: &FleetSpec, bootstrap: Option<&str>) -> anyhow::Result<LaunchedInstance>;

    /// Terminate an instance. Unknown ids are not an error.
    fn terminate(&self, instance: &str) -> anyhow::Result<()>;
}

/// Addresses reserved at the start of every subnet (network, router,
/// resolver, spare) and the broadcast address at its end.
const RESERVED_HEAD: u64 = 4;
const RESERVED_TAIL: u64 = 1;

#[derive(Default)]
struct Allocations {
    next_id: u64,
    by_instance: HashMap<InstanceId, Ipv4Addr>,
    in_use: BTreeSet<Ipv4Addr>,
}

/// In-process compute that hands out private addresses from one subnet.
pub struct LocalCompute {
    subnet: Cidr,
    allocations: Mutex<Allocations>,
}

impl LocalCompute {
    pub fn new(subnet: Cidr) -> Self {
        Self {
            subnet,
            allocations: Mutex::new(Allocations::default()),
        }
    }

    /// Compute backed by the first subnet of the fleet's subnet tier.
    pub fn for_fleet(network: &NetworkSpec, fleet: &FleetSpec) -> anyhow::Result<Self> {
        let ranges = network
            .subnet_ranges()
            .with_context(|| format!("network {} has no valid subnet layout", network.id))?;
        let (tier, cidr) = ranges
            .into_iter()
            .find(|(tier, _)| tier.kind == fleet.subnet_kind)
            .with_context(|| format!("no {:?} subnet for fleet {}", fleet.subnet_kind, fleet.name))?;
        debug!(fleet = %fleet.name, subnet = %tier.name, range = %cidr, "local compute subnet");
        Ok(Self::new(cidr))
    }

    pub fn subnet(&self) -> Cidr {
        self.subnet
    }

    /// Addresses currently assigned.
    pub fn allocated(&self) -> usize {
        self.allocations.lock().expect("allocations lock").in_use.len()
    }

    /// Take over an instance launched by an earlier process, so its address
    /// and id are never handed out again.
    pub fn adopt(&self, instance: &str, private_ip: Ipv4Addr) {
        let mut alloc = self.allocations.lock().expect("allocations lock");
        if let Some(n) = instance
            .strip_prefix("i-")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        {
            alloc.next_id = alloc.next_id.max(n);
        }
        alloc.in_use.insert(private_ip);
        alloc.by_instance.insert(instance.to_string(), private_ip);
        debug!(%instance, %private_ip, "instance adopted");
    }
}

impl ComputeBackend for LocalCompute {
    fn launch(&self, fleet: &FleetSpec, bootstrap: Option<&str>) -> anyhow::Result<LaunchedInstance> {
        let mut alloc = self.allocations.lock().expect("allocations lock");

        let last = self.subnet.size().saturating_sub(RESERVED_TAIL);
        let Some(private_ip) = (RESERVED_HEAD..last)
            .filter_map(|i| self.subnet.nth(i))
            .find(|ip| !alloc.in_use.contains(ip))
        else {
            bail!("subnet {} has no free addresses", self.subnet);
        };

        alloc.next_id += 1;
        let id = format!("i-{:08x}", alloc.next_id);
        alloc.in_use.insert(private_ip);
        alloc.by_instance.insert(id.clone(), private_ip);

        info!(
            fleet = %fleet.name,
            instance = %id,
            %private_ip,
            instance_type = %fleet.instance_type,
            image = %fleet.machine_image,
            bootstrap = bootstrap.unwrap_or("-"),
            "instance launched"
        );

        Ok(LaunchedInstance {
            id,
            private_ip,
            launched_at: epoch_millis(),
        })
    }

    fn terminate(&self, instance: &str) -> anyhow::Result<()> {
        let mut alloc = self.allocations.lock().expect("allocations lock");
        if let Some(ip) = alloc.by_instance.remove(instance) {
            alloc.in_use.remove(&ip);
            info!(%instance, private_ip = %ip, "instance terminated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webtier_core::StackConfig;

    fn fleet() -> (NetworkSpec, FleetSpec) {
        let spec = StackConfig::scaffold("web").into_spec().unwrap();
        (spec.network, spec.fleet)
    }

    #[test]
    fn launches_into_private_subnet() {
        let (network, fleet) = fleet();
        let compute = LocalCompute::for_fleet(&network, &fleet).unwrap();
        assert_eq!(compute.subnet().to_string(), "10.0.1.0/24");

        let a = compute.launch(&fleet, Some("./user-data.sh")).unwrap();
        let b = compute.launch(&fleet, None).unwrap();
        assert_eq!(a.private_ip, Ipv4Addr::new(10, 0, 1, 4));
        assert_eq!(b.private_ip, Ipv4Addr::new(10, 0, 1, 5));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn terminate_frees_address() {
        let (network, fleet) = fleet();
        let compute = LocalCompute::for_fleet(&network, &fleet).unwrap();

        let a = compute.launch(&fleet, None).unwrap();
        compute.launch(&fleet, None).unwrap();
        compute.terminate(&a.id).unwrap();
        assert_eq!(compute.allocated(), 1);

        let c = compute.launch(&fleet, None).unwrap();
        assert_eq!(c.private_ip, a.private_ip);
        assert_ne!(c.id, a.id);
    }

    #[test]
    fn adopted_instances_are_not_reused() {
        let (network, fleet) = fleet();
        let compute = LocalCompute::for_fleet(&network, &fleet).unwrap();
        compute.adopt("i-00000007", Ipv4Addr::new(10, 0, 1, 4));

        let next = compute.launch(&fleet, None).unwrap();
        assert_eq!(next.id, "i-00000008");
        assert_eq!(next.private_ip, Ipv4Addr::new(10, 0, 1, 5));

        compute.terminate("i-00000007").unwrap();
        assert_eq!(compute.allocated(), 1);
    }

    #[test]
    fn terminate_unknown_is_ok() {
        let (network, fleet) = fleet();
        let compute = LocalCompute::for_fleet(&network, &fleet).unwrap();
        assert!(compute.terminate("i-missing").is_ok());
    }

    #[test]
    fn exhausted_subnet_fails_launch() {
        let (_, fleet) = fleet();
        // /29: 8 addresses, 4 reserved up front and 1 at the end.
        let compute = LocalCompute::new(Cidr::parse("10.0.9.0/29").unwrap());
        for _ in 0..3 {
            compute.launch(&fleet, None).unwrap();
        }
        assert!(compute.launch(&fleet, None).is_err());
    }
}
