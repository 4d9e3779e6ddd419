//! Definition-time validation.
//!
//! `StackSpec::validate` runs every check below and fails on the first
//! violation. Nothing here talks to a provisioning backend.

use std::collections::HashSet;

use crate::error::{DefinitionError, DefinitionResult};
use crate::security::Cidr;
use crate::types::*;

/// Maximum number of path patterns a single listener rule may carry.
pub const MAX_CONDITIONS_PER_RULE: usize = 5;

/// Maximum length of a single path pattern.
pub const MAX_PATTERN_LEN: usize = 128;

impl StackSpec {
    /// Validate the whole stack.
    pub fn validate(&self) -> DefinitionResult<()> {
        validate_network(&self.network)?;
        validate_security_group(&self.security_group)?;

        let mut names = HashSet::new();
        for tg in &self.target_groups {
            if !names.insert(tg.name.as_str()) {
                return Err(DefinitionError::DuplicateTargetGroup(tg.name.clone()));
            }
            validate_health_check(&tg.name, &tg.health_check)?;
        }

        validate_listener_rules(&self.listener.rules)?;
        let known = |name: &str| names.contains(name);
        if !known(&self.listener.default_target_group) {
            return Err(DefinitionError::UnknownTargetGroup(
                self.listener.default_target_group.clone(),
            ));
        }
        for rule in &self.listener.rules {
            if let RuleAction::Forward { target_group } = &rule.action
                && !known(target_group)
            {
                return Err(DefinitionError::UnknownTargetGroup(target_group.clone()));
            }
        }

        if self.load_balancer.internet_facing
            && self.network.subnets_of(SubnetKind::Public).next().is_none()
        {
            return Err(DefinitionError::InvalidNetwork(
                "internet-facing load balancer needs a public subnet".to_string(),
            ));
        }

        validate_fleet(&self.fleet, &self.network)?;
        if !known(&self.fleet.target_group) {
            return Err(DefinitionError::UnknownTargetGroup(self.fleet.target_group.clone()));
        }
        Ok(())
    }
}

/// Network shape: a parseable range, unique subnet names, NAT for private tiers.
pub fn validate_network(network: &NetworkSpec) -> DefinitionResult<()> {
    let cidr = Cidr::parse(&network.cidr).ok_or_else(|| {
        DefinitionError::InvalidNetwork(format!("invalid cidr {:?}", network.cidr))
    })?;

    let mut names = HashSet::new();
    for subnet in &network.subnets {
        if !names.insert(subnet.name.as_str()) {
            return Err(DefinitionError::InvalidNetwork(format!(
                "duplicate subnet {}",
                subnet.name
            )));
        }
        if subnet.cidr_mask < cidr.prefix || subnet.cidr_mask > 28 {
            return Err(DefinitionError::InvalidNetwork(format!(
                "subnet {} mask /{} does not fit in {}",
                subnet.name, subnet.cidr_mask, network.cidr
            )));
        }
    }

    if network.subnet_ranges().is_none() {
        return Err(DefinitionError::InvalidNetwork(format!(
            "subnets do not fit in {}",
            network.cidr
        )));
    }

    if !network.has_nat_path()
        && let Some(subnet) = network.subnets_of(SubnetKind::PrivateEgress).next()
    {
        return Err(DefinitionError::PrivateSubnetWithoutNat {
            subnet: subnet.name.clone(),
        });
    }
    Ok(())
}

/// Shape-only checks on security rules. Overlapping rules are fine.
pub fn validate_security_group(group: &SecurityGroupSpec) -> DefinitionResult<()> {
    for rule in &group.rules {
        if Cidr::parse(&rule.cidr).is_none() {
            return Err(DefinitionError::InvalidSecurityRule(format!(
                "invalid cidr {:?} in {:?}",
                rule.cidr, rule.description
            )));
        }
        if matches!(rule.protocol, Protocol::Tcp | Protocol::Udp) && rule.port == Some(0) {
            return Err(DefinitionError::InvalidSecurityRule(format!(
                "port 0 in {:?}",
                rule.description
            )));
        }
    }
    Ok(())
}

/// Priorities positive and unique, conditions present and well formed.
pub fn validate_listener_rules(rules: &[ListenerRuleSpec]) -> DefinitionResult<()> {
    let mut seen = HashSet::new();
    for rule in rules {
        if rule.priority == 0 {
            return Err(DefinitionError::InvalidPriority);
        }
        if !seen.insert(rule.priority) {
            return Err(DefinitionError::DuplicatePriority {
                priority: rule.priority,
            });
        }
        if rule.path_patterns.is_empty() {
            return Err(DefinitionError::EmptyConditions {
                priority: rule.priority,
            });
        }
        if rule.path_patterns.len() > MAX_CONDITIONS_PER_RULE {
            return Err(DefinitionError::TooManyConditions {
                priority: rule.priority,
                count: rule.path_patterns.len(),
                max: MAX_CONDITIONS_PER_RULE,
            });
        }
        for pattern in &rule.path_patterns {
            validate_path_pattern(pattern)?;
        }
        if let RuleAction::FixedResponse { status_code, .. } = &rule.action
            && !(200..=599).contains(status_code)
        {
            return Err(DefinitionError::InvalidConfig(format!(
                "fixed response status {status_code} out of range"
            )));
        }
    }
    Ok(())
}

/// A path pattern is non-empty, bounded, and free of whitespace.
pub fn validate_path_pattern(pattern: &str) -> DefinitionResult<()> {
    let invalid = |reason: &str| DefinitionError::InvalidPathPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    if pattern.is_empty() {
        return Err(invalid("empty"));
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(invalid("too long"));
    }
    if pattern.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    Ok(())
}

/// Check thresholds and timing of a health check.
pub fn validate_health_check(target_group: &str, check: &HealthCheckSpec) -> DefinitionResult<()> {
    let invalid = |reason: String| DefinitionError::InvalidHealthCheck {
        target_group: target_group.to_string(),
        reason,
    };
    if !check.path.starts_with('/') {
        return Err(invalid(format!("path {:?} must start with '/'", check.path)));
    }
    if check.interval.is_zero() {
        return Err(invalid("interval must be positive".to_string()));
    }
    if check.timeout.is_zero() || check.timeout > check.interval {
        return Err(invalid("timeout must be positive and no longer than interval".to_string()));
    }
    if check.healthy_threshold == 0 || check.unhealthy_threshold == 0 {
        return Err(invalid("thresholds must be at least 1".to_string()));
    }
    if check.success_codes.min > check.success_codes.max {
        return Err(invalid("empty success code range".to_string()));
    }
    Ok(())
}

/// Capacity bounds must form a non-empty range.
pub fn validate_capacity(min: u32, max: u32) -> DefinitionResult<()> {
    if min > max {
        return Err(DefinitionError::InvalidCapacityBounds { min, max });
    }
    Ok(())
}

/// Fleet bounds, placement, and policy targets.
pub fn validate_fleet(fleet: &FleetSpec, network: &NetworkSpec) -> DefinitionResult<()> {
    validate_capacity(fleet.min_capacity, fleet.max_capacity)?;
    if fleet.max_capacity == 0 {
        return Err(DefinitionError::InvalidFleet(format!(
            "fleet {} has max capacity 0",
            fleet.name
        )));
    }
    if network.subnets_of(fleet.subnet_kind).next().is_none() {
        return Err(DefinitionError::InvalidFleet(format!(
            "fleet {} targets {:?} subnets but the network has none",
            fleet.name, fleet.subnet_kind
        )));
    }

    let mut names = HashSet::new();
    for policy in &fleet.policies {
        let invalid = |reason: &str| DefinitionError::InvalidScalingPolicy {
            policy: policy.name.clone(),
            reason: reason.to_string(),
        };
        if !names.insert(policy.name.as_str()) {
            return Err(invalid("duplicate policy name"));
        }
        if policy.collection_interval.is_zero() {
            return Err(invalid("collection interval must be positive"));
        }
        let target = match policy.metric {
            ScalingMetric::RequestRateTarget {
                per_instance_target_per_minute,
            } => per_instance_target_per_minute,
            ScalingMetric::CpuUtilizationTarget { target_percent } => {
                if target_percent > 100.0 {
                    return Err(invalid("cpu target above 100%"));
                }
                target_percent
            }
        };
        if !(target.is_finite() && target > 0.0) {
            return Err(invalid("target must be a positive number"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StackConfig;
    use std::time::Duration;

    fn default_stack() -> StackSpec {
        StackConfig::scaffold("web").into_spec().unwrap()
    }

    fn rule(priority: u32, pattern: &str) -> ListenerRuleSpec {
        ListenerRuleSpec {
            priority,
            path_patterns: vec![pattern.to_string()],
            action: RuleAction::FixedResponse {
                status_code: 200,
                content_type: "text/plain".to_string(),
                body: "ok".to_string(),
            },
        }
    }

    #[test]
    fn scaffold_stack_is_valid() {
        default_stack().validate().unwrap();
    }

    #[test]
    fn duplicate_priority_rejected() {
        let err = validate_listener_rules(&[rule(5, "/a"), rule(5, "/b")]).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicatePriority { priority: 5 });
    }

    #[test]
    fn zero_priority_rejected() {
        let err = validate_listener_rules(&[rule(0, "/a")]).unwrap_err();
        assert_eq!(err, DefinitionError::InvalidPriority);
    }

    #[test]
    fn too_many_conditions_rejected() {
        let mut r = rule(1, "/a");
        r.path_patterns = (0..6).map(|i| format!("/p{i}")).collect();
        assert!(matches!(
            validate_listener_rules(&[r]),
            Err(DefinitionError::TooManyConditions { count: 6, .. })
        ));
    }

    #[test]
    fn empty_conditions_rejected() {
        let mut r = rule(3, "/a");
        r.path_patterns.clear();
        assert_eq!(
            validate_listener_rules(&[r]).unwrap_err(),
            DefinitionError::EmptyConditions { priority: 3 }
        );
    }

    #[test]
    fn min_above_max_rejected() {
        let mut stack = default_stack();
        stack.fleet.min_capacity = 4;
        stack.fleet.max_capacity = 3;
        assert_eq!(
            stack.validate().unwrap_err(),
            DefinitionError::InvalidCapacityBounds { min: 4, max: 3 }
        );
    }

    #[test]
    fn private_subnet_needs_nat() {
        let mut stack = default_stack();
        stack.network.nat_gateways = 0;
        assert!(matches!(
            stack.validate(),
            Err(DefinitionError::PrivateSubnetWithoutNat { .. })
        ));
    }

    #[test]
    fn forward_to_unknown_group_rejected() {
        let mut stack = default_stack();
        stack.listener.rules.push(ListenerRuleSpec {
            priority: 10,
            path_patterns: vec!["/api/*".to_string()],
            action: RuleAction::Forward {
                target_group: "missing".to_string(),
            },
        });
        assert_eq!(
            stack.validate().unwrap_err(),
            DefinitionError::UnknownTargetGroup("missing".to_string())
        );
    }

    #[test]
    fn health_timeout_longer_than_interval_rejected() {
        let mut stack = default_stack();
        stack.target_groups[0].health_check.timeout = Duration::from_secs(60);
        assert!(matches!(
            stack.validate(),
            Err(DefinitionError::InvalidHealthCheck { .. })
        ));
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut stack = default_stack();
        stack.target_groups[0].health_check.healthy_threshold = 0;
        assert!(stack.validate().is_err());
    }

    #[test]
    fn bad_security_cidr_rejected() {
        let mut stack = default_stack();
        stack.security_group.rules[0].cidr = "anywhere".to_string();
        assert!(matches!(
            stack.validate(),
            Err(DefinitionError::InvalidSecurityRule(_))
        ));
    }

    #[test]
    fn non_positive_policy_target_rejected() {
        let mut stack = default_stack();
        stack.fleet.policies[0].metric = ScalingMetric::RequestRateTarget {
            per_instance_target_per_minute: 0.0,
        };
        assert!(matches!(
            stack.validate(),
            Err(DefinitionError::InvalidScalingPolicy { .. })
        ));
    }

    #[test]
    fn fleet_needs_matching_subnet_tier() {
        let mut stack = default_stack();
        stack
            .network
            .subnets
            .retain(|s| s.kind != SubnetKind::PrivateEgress);
        assert!(matches!(stack.validate(), Err(DefinitionError::InvalidFleet(_))));
    }

    #[test]
    fn whitespace_in_pattern_rejected() {
        assert!(validate_path_pattern("/a b").is_err());
        assert!(validate_path_pattern("/static*").is_ok());
    }
}
