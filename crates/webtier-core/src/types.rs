//! Declarative types for a web tier stack.
//!
//! A `StackSpec` is the fully resolved, validated form of a `webtier.toml`
//! file. Every type here is serializable so the provisioning backend can
//! persist the exact spec it converged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of a target group, unique within a stack.
pub type TargetGroupName = String;

// ── Network ───────────────────────────────────────────────────────

/// Kind of subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routable from the internet through the internet gateway.
    Public,
    /// Not externally reachable; outbound traffic leaves through NAT.
    PrivateEgress,
}

/// One subnet tier of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetTier {
    pub name: String,
    pub kind: SubnetKind,
    /// Prefix length of each subnet carved out for this tier.
    pub cidr_mask: u8,
}

/// The private network the tier lives in.
///
/// Immutable once provisioned: a changed spec means replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub id: String,
    /// Address range of the whole network (e.g. "10.0.0.0/16").
    pub cidr: String,
    pub subnets: Vec<SubnetTier>,
    /// Number of shared NAT gateways for private-egress subnets.
    pub nat_gateways: u32,
}

impl NetworkSpec {
    /// Subnets of the given kind.
    pub fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &SubnetTier> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    /// Whether private-egress subnets have a route to the outside.
    pub fn has_nat_path(&self) -> bool {
        self.nat_gateways > 0
    }
}

// ── Security ──────────────────────────────────────────────────────

/// Traffic direction of a security rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ingress,
    Egress,
}

/// IP protocol matched by a security rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// A single allow rule. Rules are a permissive union, never first-match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: Direction,
    pub protocol: Protocol,
    /// Port to allow. `None` allows every port of the protocol.
    pub port: Option<u16>,
    /// Peer address range (source for ingress, destination for egress).
    pub cidr: String,
    pub description: String,
}

/// Security group attached to every fleet instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    /// Adds an implicit "all protocols to 0.0.0.0/0" egress rule.
    pub allow_all_outbound: bool,
    pub rules: Vec<SecurityRule>,
}

// ── Load balancer and listener ────────────────────────────────────

/// The public entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub internet_facing: bool,
}

/// What a listener rule does with a matching request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Send the request to a healthy member of a target group.
    Forward { target_group: TargetGroupName },
    /// Answer immediately without touching any target.
    FixedResponse {
        status_code: u16,
        content_type: String,
        body: String,
    },
}

/// A match-condition/action pair evaluated in ascending priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRuleSpec {
    /// Positive, unique within the listener. Lower is evaluated first.
    pub priority: u32,
    pub path_patterns: Vec<String>,
    pub action: RuleAction,
}

/// A listener on the load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub port: u16,
    /// Whether the listener port is opened to the world.
    pub open: bool,
    /// Target of the implicit catch-all rule.
    pub default_target_group: TargetGroupName,
    pub rules: Vec<ListenerRuleSpec>,
}

// ── Target groups ─────────────────────────────────────────────────

/// Protocol used to reach targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetProtocol {
    Http,
    Https,
}

/// Inclusive range of HTTP status codes counted as a passing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCodes {
    pub min: u16,
    pub max: u16,
}

impl SuccessCodes {
    pub fn contains(&self, code: u16) -> bool {
        (self.min..=self.max).contains(&code)
    }
}

impl Default for SuccessCodes {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

/// Periodic health check configuration for a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub path: String,
    pub interval: Duration,
    /// Per-check timeout; never longer than `interval`.
    pub timeout: Duration,
    /// Consecutive successes needed to become healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures needed to become unhealthy.
    pub unhealthy_threshold: u32,
    #[serde(default)]
    pub success_codes: SuccessCodes,
}

/// A health-tracked pool of fleet instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub name: TargetGroupName,
    pub protocol: TargetProtocol,
    pub port: u16,
    pub health_check: HealthCheckSpec,
}

// ── Fleet and scaling ─────────────────────────────────────────────

/// The load signal a scaling policy tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScalingMetric {
    /// Keep each instance near this many requests per minute.
    RequestRateTarget { per_instance_target_per_minute: f64 },
    /// Keep fleet average CPU near this percentage.
    CpuUtilizationTarget { target_percent: f64 },
}

/// A target-tracking scaling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub name: String,
    pub metric: ScalingMetric,
    /// How often this policy collects its metric and proposes a capacity.
    pub collection_interval: Duration,
}

/// How scale-in picks instances to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleInPreference {
    /// Unhealthy first, then initial, then healthy; oldest first within a tier.
    #[default]
    UnhealthyFirst,
    OldestFirst,
    NewestFirst,
}

/// The autoscaling group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSpec {
    pub name: String,
    /// Target group the fleet registers its instances with.
    pub target_group: TargetGroupName,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub instance_type: String,
    pub machine_image: String,
    /// Subnet tier instances are launched into.
    pub subnet_kind: SubnetKind,
    /// Opaque reference to the script run on instance start.
    pub bootstrap_script: Option<String>,
    pub scale_in_preference: ScaleInPreference,
    /// Minimum time between two capacity changes.
    pub cooldown: Duration,
    /// Upper bound on how long a draining instance is kept registered.
    pub drain_timeout: Duration,
    pub policies: Vec<ScalingPolicy>,
}

// ── Stack ─────────────────────────────────────────────────────────

/// A fully resolved web tier definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSpec {
    pub name: String,
    pub network: NetworkSpec,
    pub security_group: SecurityGroupSpec,
    pub load_balancer: LoadBalancerSpec,
    pub listener: ListenerSpec,
    pub target_groups: Vec<TargetGroupSpec>,
    pub fleet: FleetSpec,
}

impl StackSpec {
    /// Look up a target group by name.
    pub fn target_group(&self, name: &str) -> Option<&TargetGroupSpec> {
        self.target_groups.iter().find(|tg| tg.name == name)
    }

    /// Target group the fleet registers into.
    pub fn fleet_target_group(&self) -> Option<&TargetGroupSpec> {
        self.target_group(&self.fleet.target_group)
    }
}
