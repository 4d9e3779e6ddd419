//! webtier.toml configuration parser.
//!
//! The file mirrors `StackSpec` but every field past the stack name is
//! optional. `into_spec` fills the gaps with the defaults of a small
//! public web tier: one NAT gateway, SSH ingress, an HTTP listener on 80
//! with a `/static` fixed response, and a 1..3 fleet scaled on request
//! rate and CPU. An explicitly empty list (`rules = []`) opts out.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, DefinitionResult};
use crate::types::*;

pub const DEFAULT_TARGET_GROUP: &str = "default-targets";
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = "./user-data.sh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub stack: StackSection,
    pub network: Option<NetworkConfig>,
    pub security_group: Option<SecurityGroupConfig>,
    pub load_balancer: Option<LoadBalancerConfig>,
    pub listener: Option<ListenerConfig>,
    pub target_groups: Option<Vec<TargetGroupConfig>>,
    pub fleet: Option<FleetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSection {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub cidr: Option<String>,
    pub nat_gateways: Option<u32>,
    pub subnets: Option<Vec<SubnetTier>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupConfig {
    pub name: Option<String>,
    pub allow_all_outbound: Option<bool>,
    pub ingress: Option<Vec<RuleConfig>>,
    pub egress: Option<Vec<RuleConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub cidr: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub name: Option<String>,
    pub internet_facing: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub port: Option<u16>,
    pub open: Option<bool>,
    pub default_target_group: Option<String>,
    pub rules: Option<Vec<ListenerRuleSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroupConfig {
    pub name: String,
    pub protocol: Option<TargetProtocol>,
    pub port: Option<u16>,
    pub health_check: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub path: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
    /// Single code ("200") or inclusive range ("200-299").
    pub success_codes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub name: Option<String>,
    pub target_group: Option<String>,
    pub min_capacity: Option<u32>,
    pub max_capacity: Option<u32>,
    pub instance_type: Option<String>,
    pub machine_image: Option<String>,
    pub subnet_kind: Option<SubnetKind>,
    pub bootstrap_script: Option<String>,
    pub scale_in_preference: Option<ScaleInPreference>,
    pub cooldown: Option<String>,
    pub drain_timeout: Option<String>,
    pub policies: Option<Vec<PolicyConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub name: String,
    /// "request_rate" or "cpu".
    pub metric: String,
    pub target: f64,
    pub collection_interval: Option<String>,
}

impl StackConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StackConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse, resolve defaults, and validate in one step.
    pub fn load(path: &Path) -> anyhow::Result<StackSpec> {
        let spec = Self::from_file(path)?.into_spec()?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the config into a full spec. Does not validate.
    pub fn into_spec(&self) -> DefinitionResult<StackSpec> {
        let stack = &self.stack.name;

        let network = {
            let cfg = self.network.as_ref();
            NetworkSpec {
                id: format!("{stack}-vpc"),
                cidr: cfg
                    .and_then(|n| n.cidr.clone())
                    .unwrap_or_else(|| "10.0.0.0/16".to_string()),
                subnets: cfg
                    .and_then(|n| n.subnets.clone())
                    .unwrap_or_else(default_subnets),
                nat_gateways: cfg.and_then(|n| n.nat_gateways).unwrap_or(1),
            }
        };

        let security_group = {
            let cfg = self.security_group.as_ref();
            let mut rules = Vec::new();
            let ingress = cfg
                .and_then(|s| s.ingress.clone())
                .unwrap_or_else(default_ingress);
            let egress = cfg.and_then(|s| s.egress.clone()).unwrap_or_default();
            for (direction, list) in [(Direction::Ingress, ingress), (Direction::Egress, egress)] {
                for r in &list {
                    rules.push(SecurityRule {
                        direction,
                        protocol: r.protocol,
                        port: r.port,
                        cidr: r.cidr.clone(),
                        description: r.description.clone().unwrap_or_default(),
                    });
                }
            }
            SecurityGroupSpec {
                name: cfg
                    .and_then(|s| s.name.clone())
                    .unwrap_or_else(|| format!("{stack}-sg")),
                allow_all_outbound: cfg.and_then(|s| s.allow_all_outbound).unwrap_or(true),
                rules,
            }
        };

        let load_balancer = LoadBalancerSpec {
            name: self
                .load_balancer
                .as_ref()
                .and_then(|l| l.name.clone())
                .unwrap_or_else(|| format!("{stack}-alb")),
            internet_facing: self
                .load_balancer
                .as_ref()
                .and_then(|l| l.internet_facing)
                .unwrap_or(true),
        };

        let target_groups = match &self.target_groups {
            Some(groups) => groups
                .iter()
                .map(resolve_target_group)
                .collect::<DefinitionResult<Vec<_>>>()?,
            None => vec![resolve_target_group(&TargetGroupConfig {
                name: DEFAULT_TARGET_GROUP.to_string(),
                protocol: None,
                port: None,
                health_check: None,
            })?],
        };
        let primary = target_groups
            .first()
            .map(|tg| tg.name.clone())
            .unwrap_or_else(|| DEFAULT_TARGET_GROUP.to_string());

        let listener = {
            let cfg = self.listener.as_ref();
            ListenerSpec {
                port: cfg.and_then(|l| l.port).unwrap_or(80),
                open: cfg.and_then(|l| l.open).unwrap_or(true),
                default_target_group: cfg
                    .and_then(|l| l.default_target_group.clone())
                    .unwrap_or_else(|| primary.clone()),
                rules: cfg
                    .and_then(|l| l.rules.clone())
                    .unwrap_or_else(default_listener_rules),
            }
        };

        let fleet = {
            let cfg = self.fleet.as_ref();
            let policies = cfg
                .and_then(|f| f.policies.clone())
                .unwrap_or_else(default_policies)
                .iter()
                .map(resolve_policy)
                .collect::<DefinitionResult<Vec<_>>>()?;
            FleetSpec {
                name: cfg
                    .and_then(|f| f.name.clone())
                    .unwrap_or_else(|| format!("{stack}-asg")),
                target_group: cfg
                    .and_then(|f| f.target_group.clone())
                    .unwrap_or_else(|| primary.clone()),
                min_capacity: cfg.and_then(|f| f.min_capacity).unwrap_or(1),
                max_capacity: cfg.and_then(|f| f.max_capacity).unwrap_or(3),
                instance_type: cfg
                    .and_then(|f| f.instance_type.clone())
                    .unwrap_or_else(|| "t2.micro".to_string()),
                machine_image: cfg
                    .and_then(|f| f.machine_image.clone())
                    .unwrap_or_else(|| "amazon-linux-2".to_string()),
                subnet_kind: cfg
                    .and_then(|f| f.subnet_kind)
                    .unwrap_or(SubnetKind::PrivateEgress),
                bootstrap_script: Some(
                    cfg.and_then(|f| f.bootstrap_script.clone())
                        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_SCRIPT.to_string()),
                ),
                scale_in_preference: cfg.and_then(|f| f.scale_in_preference).unwrap_or_default(),
                cooldown: duration_field(cfg.and_then(|f| f.cooldown.as_deref()), "cooldown", 60)?,
                drain_timeout: duration_field(
                    cfg.and_then(|f| f.drain_timeout.as_deref()),
                    "drain_timeout",
                    300,
                )?,
                policies,
            }
        };

        Ok(StackSpec {
            name: stack.clone(),
            network,
            security_group,
            load_balancer,
            listener,
            target_groups,
            fleet,
        })
    }

    /// Scaffold the reference web tier: SSH ingress, a `/static` fixed
    /// response, and request-rate plus CPU scaling on a 1..3 fleet.
    pub fn scaffold(name: &str) -> Self {
        StackConfig {
            stack: StackSection {
                name: name.to_string(),
            },
            network: Some(NetworkConfig {
                cidr: Some("10.0.0.0/16".to_string()),
                nat_gateways: Some(1),
                subnets: Some(default_subnets()),
            }),
            security_group: Some(SecurityGroupConfig {
                name: Some("webserver-sg".to_string()),
                allow_all_outbound: Some(true),
                ingress: Some(default_ingress()),
                egress: None,
            }),
            load_balancer: Some(LoadBalancerConfig {
                name: Some("alb".to_string()),
                internet_facing: Some(true),
            }),
            listener: Some(ListenerConfig {
                port: Some(80),
                open: Some(true),
                default_target_group: Some(DEFAULT_TARGET_GROUP.to_string()),
                rules: Some(default_listener_rules()),
            }),
            target_groups: Some(vec![TargetGroupConfig {
                name: DEFAULT_TARGET_GROUP.to_string(),
                protocol: Some(TargetProtocol::Http),
                port: Some(3000),
                health_check: Some(HealthCheckConfig {
                    path: Some("/".to_string()),
                    interval: Some("30s".to_string()),
                    timeout: Some("5s".to_string()),
                    healthy_threshold: Some(5),
                    unhealthy_threshold: Some(2),
                    success_codes: Some("200-299".to_string()),
                }),
            }]),
            fleet: Some(FleetConfig {
                name: Some("asg".to_string()),
                target_group: Some(DEFAULT_TARGET_GROUP.to_string()),
                min_capacity: Some(1),
                max_capacity: Some(3),
                instance_type: Some("t2.micro".to_string()),
                machine_image: Some("amazon-linux-2".to_string()),
                subnet_kind: Some(SubnetKind::PrivateEgress),
                bootstrap_script: Some(DEFAULT_BOOTSTRAP_SCRIPT.to_string()),
                scale_in_preference: Some(ScaleInPreference::UnhealthyFirst),
                cooldown: Some("60s".to_string()),
                drain_timeout: Some("300s".to_string()),
                policies: Some(default_policies()),
            }),
        }
    }
}

fn default_subnets() -> Vec<SubnetTier> {
    vec![
        SubnetTier {
            name: "public".to_string(),
            kind: SubnetKind::Public,
            cidr_mask: 24,
        },
        SubnetTier {
            name: "private".to_string(),
            kind: SubnetKind::PrivateEgress,
            cidr_mask: 24,
        },
    ]
}

fn default_ingress() -> Vec<RuleConfig> {
    vec![RuleConfig {
        protocol: Protocol::Tcp,
        port: Some(22),
        cidr: "0.0.0.0/0".to_string(),
        description: Some("allow SSH access from anywhere".to_string()),
    }]
}

fn default_listener_rules() -> Vec<ListenerRuleSpec> {
    vec![ListenerRuleSpec {
        priority: 5,
        path_patterns: vec!["/static".to_string()],
        action: RuleAction::FixedResponse {
            status_code: 200,
            content_type: "text/html".to_string(),
            body: "<h1>Static ALB Response</h1>".to_string(),
        },
    }]
}

fn default_policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig {
            name: "requests-per-minute".to_string(),
            metric: "request_rate".to_string(),
            target: 60.0,
            collection_interval: Some("60s".to_string()),
        },
        PolicyConfig {
            name: "cpu-util-scaling".to_string(),
            metric: "cpu".to_string(),
            target: 75.0,
            collection_interval: Some("60s".to_string()),
        },
    ]
}

fn resolve_target_group(cfg: &TargetGroupConfig) -> DefinitionResult<TargetGroupSpec> {
    let hc = cfg.health_check.as_ref();
    let interval = duration_field(hc.and_then(|h| h.interval.as_deref()), "interval", 30)?;
    let timeout = match hc.and_then(|h| h.timeout.as_deref()) {
        Some(s) => parse_field(s, "timeout")?,
        None => interval.min(Duration::from_secs(5)),
    };
    let success_codes = match hc.and_then(|h| h.success_codes.as_deref()) {
        Some(s) => parse_success_codes(s).ok_or_else(|| {
            DefinitionError::InvalidConfig(format!("invalid success codes {s:?}"))
        })?,
        None => SuccessCodes::default(),
    };
    Ok(TargetGroupSpec {
        name: cfg.name.clone(),
        protocol: cfg.protocol.unwrap_or(TargetProtocol::Http),
        port: cfg.port.unwrap_or(3000),
        health_check: HealthCheckSpec {
            path: hc
                .and_then(|h| h.path.clone())
                .unwrap_or_else(|| "/".to_string()),
            interval,
            timeout,
            healthy_threshold: hc.and_then(|h| h.healthy_threshold).unwrap_or(5),
            unhealthy_threshold: hc.and_then(|h| h.unhealthy_threshold).unwrap_or(2),
            success_codes,
        },
    })
}

fn resolve_policy(cfg: &PolicyConfig) -> DefinitionResult<ScalingPolicy> {
    let metric = match cfg.metric.as_str() {
        "request_rate" | "requests_per_minute" => ScalingMetric::RequestRateTarget {
            per_instance_target_per_minute: cfg.target,
        },
        "cpu" | "cpu_utilization" => ScalingMetric::CpuUtilizationTarget {
            target_percent: cfg.target,
        },
        other => {
            return Err(DefinitionError::InvalidScalingPolicy {
                policy: cfg.name.clone(),
                reason: format!("unknown metric {other:?}"),
            });
        }
    };
    Ok(ScalingPolicy {
        name: cfg.name.clone(),
        metric,
        collection_interval: duration_field(
            cfg.collection_interval.as_deref(),
            "collection_interval",
            60,
        )?,
    })
}

fn duration_field(value: Option<&str>, field: &str, default_secs: u64) -> DefinitionResult<Duration> {
    match value {
        Some(s) => parse_field(s, field),
        None => Ok(Duration::from_secs(default_secs)),
    }
}

fn parse_field(s: &str, field: &str) -> DefinitionResult<Duration> {
    parse_duration(s)
        .ok_or_else(|| DefinitionError::InvalidConfig(format!("invalid {field} duration {s:?}")))
}

fn parse_success_codes(s: &str) -> Option<SuccessCodes> {
    match s.split_once('-') {
        Some((lo, hi)) => Some(SuccessCodes {
            min: lo.trim().parse().ok()?,
            max: hi.trim().parse().ok()?,
        }),
        None => {
            let code = s.trim().parse().ok()?;
            Some(SuccessCodes {
                min: code,
                max: code,
            })
        }
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Inverse of `parse_duration` for whole seconds or milliseconds.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips_through_toml() {
        let config = StackConfig::scaffold("web");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("Static ALB Response"));

        let parsed: StackConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.into_spec().unwrap(), config.into_spec().unwrap());
    }

    #[test]
    fn test_scaffold_resolves_reference_stack() {
        let spec = StackConfig::scaffold("web").into_spec().unwrap();

        assert_eq!(spec.network.nat_gateways, 1);
        assert_eq!(spec.listener.port, 80);
        assert_eq!(spec.listener.rules[0].priority, 5);

        let tg = spec.fleet_target_group().unwrap();
        assert_eq!(tg.port, 3000);
        assert_eq!(tg.health_check.interval, Duration::from_secs(30));
        assert_eq!(tg.health_check.healthy_threshold, 5);
        assert_eq!(tg.health_check.unhealthy_threshold, 2);

        assert_eq!(spec.fleet.min_capacity, 1);
        assert_eq!(spec.fleet.max_capacity, 3);
        assert_eq!(spec.fleet.policies.len(), 2);
        assert_eq!(
            spec.fleet.policies[1].metric,
            ScalingMetric::CpuUtilizationTarget {
                target_percent: 75.0
            }
        );
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[stack]
name = "tiny"
"#;
        let config: StackConfig = toml::from_str(toml_str).unwrap();
        let spec = config.into_spec().unwrap();
        assert_eq!(spec.name, "tiny");
        assert_eq!(spec.listener.default_target_group, DEFAULT_TARGET_GROUP);
        assert_eq!(spec.fleet.target_group, DEFAULT_TARGET_GROUP);
        assert_eq!(spec.fleet.bootstrap_script.as_deref(), Some(DEFAULT_BOOTSTRAP_SCRIPT));

        assert_eq!(spec.listener.rules.len(), 1);
        assert_eq!(spec.listener.rules[0].priority, 5);
        assert_eq!(spec.listener.rules[0].path_patterns, vec!["/static"]);
        assert_eq!(
            spec.listener.rules[0].action,
            RuleAction::FixedResponse {
                status_code: 200,
                content_type: "text/html".to_string(),
                body: "<h1>Static ALB Response</h1>".to_string(),
            }
        );

        let ssh: Vec<_> = spec
            .security_group
            .rules
            .iter()
            .filter(|r| r.direction == Direction::Ingress)
            .collect();
        assert_eq!(ssh.len(), 1);
        assert_eq!(ssh[0].port, Some(22));
        assert_eq!(ssh[0].cidr, "0.0.0.0/0");

        let metrics: Vec<_> = spec.fleet.policies.iter().map(|p| p.metric.clone()).collect();
        assert_eq!(
            metrics,
            vec![
                ScalingMetric::RequestRateTarget {
                    per_instance_target_per_minute: 60.0
                },
                ScalingMetric::CpuUtilizationTarget {
                    target_percent: 75.0
                },
            ]
        );
        spec.validate().unwrap();
    }

    #[test]
    fn test_empty_lists_opt_out_of_defaults() {
        let toml_str = r#"
[stack]
name = "bare"

[security_group]
ingress = []

[listener]
rules = []

[fleet]
policies = []
"#;
        let spec = toml::from_str::<StackConfig>(toml_str)
            .unwrap()
            .into_spec()
            .unwrap();
        assert!(spec.listener.rules.is_empty());
        assert!(spec.security_group.rules.is_empty());
        assert!(spec.fleet.policies.is_empty());
    }

    #[test]
    fn test_parse_forward_rule_and_policies() {
        let toml_str = r#"
[stack]
name = "api"

[[target_groups]]
name = "web"

[[target_groups]]
name = "api"
port = 8080

[[listener.rules]]
priority = 10
path_patterns = ["/api/*"]

[listener.rules.action]
type = "forward"
target_group = "api"

[fleet]
min_capacity = 2
max_capacity = 6

[[fleet.policies]]
name = "rpm"
metric = "request_rate"
target = 120
"#;
        let spec = toml::from_str::<StackConfig>(toml_str)
            .unwrap()
            .into_spec()
            .unwrap();
        assert_eq!(spec.listener.default_target_group, "web");
        assert_eq!(
            spec.listener.rules[0].action,
            RuleAction::Forward {
                target_group: "api".to_string()
            }
        );
        assert_eq!(spec.fleet.policies[0].collection_interval, Duration::from_secs(60));
        spec.validate().unwrap();
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let mut config = StackConfig::scaffold("web");
        if let Some(fleet) = config.fleet.as_mut() {
            fleet.policies = Some(vec![PolicyConfig {
                name: "mem".to_string(),
                metric: "memory".to_string(),
                target: 50.0,
                collection_interval: None,
            }]);
        }
        assert!(matches!(
            config.into_spec(),
            Err(DefinitionError::InvalidScalingPolicy { .. })
        ));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let mut config = StackConfig::scaffold("web");
        if let Some(fleet) = config.fleet.as_mut() {
            fleet.cooldown = Some("soon".to_string());
        }
        assert!(matches!(config.into_spec(), Err(DefinitionError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webtier.toml");
        std::fs::write(&path, StackConfig::scaffold("disk").to_toml_string().unwrap()).unwrap();

        let spec = StackConfig::load(&path).unwrap();
        assert_eq!(spec.name, "disk");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn parse_duration_rejects_overflowing_minutes() {
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert!(matches!(
            parse_field("999999999999999999m", "cooldown"),
            Err(DefinitionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn format_duration_round_trip() {
        for s in ["30s", "500ms", "0s"] {
            assert_eq!(format_duration(parse_duration(s).unwrap()), s);
        }
    }

    #[test]
    fn success_codes_parse() {
        assert_eq!(
            parse_success_codes("200-399"),
            Some(SuccessCodes { min: 200, max: 399 })
        );
        assert_eq!(
            parse_success_codes("200"),
            Some(SuccessCodes { min: 200, max: 200 })
        );
        assert_eq!(parse_success_codes("ok"), None);
    }
}
