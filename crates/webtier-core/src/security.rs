//! Security group evaluation.
//!
//! Rules are additive: a flow is allowed if any rule admits it. There is
//! no deny rule and no ordering.

use std::fmt;
use std::net::Ipv4Addr;

use crate::types::{Direction, NetworkSpec, Protocol, SecurityGroupSpec, SecurityRule, SubnetTier};

/// An IPv4 address range in `a.b.c.d/n` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub base: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    /// Parse `a.b.c.d/n`. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, prefix) = s.trim().split_once('/')?;
        let base: Ipv4Addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        (prefix <= 32).then_some(Self { base, prefix })
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    /// Whether `addr` falls inside this range.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        (u32::from(self.base) & mask) == (u32::from(addr) & mask)
    }

    /// Number of addresses in the range.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// The `index`-th address of the range, if it exists.
    pub fn nth(&self, index: u64) -> Option<Ipv4Addr> {
        if index >= self.size() {
            return None;
        }
        let network = u32::from(self.base) & self.mask();
        Some(Ipv4Addr::from(network + index as u32))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl NetworkSpec {
    /// Address range of every subnet tier, carved in declaration order.
    ///
    /// Each block is aligned to its own size. Returns `None` if the network
    /// range does not parse or the tiers do not fit into it.
    pub fn subnet_ranges(&self) -> Option<Vec<(&SubnetTier, Cidr)>> {
        let network = Cidr::parse(&self.cidr)?;
        let start = u64::from(u32::from(network.base) & network.mask());
        let end = start + network.size();

        let mut cursor = start;
        let mut ranges = Vec::with_capacity(self.subnets.len());
        for tier in &self.subnets {
            if tier.cidr_mask > 32 || tier.cidr_mask < network.prefix {
                return None;
            }
            let size = 1u64 << (32 - u32::from(tier.cidr_mask));
            cursor = cursor.div_ceil(size) * size;
            if cursor + size > end {
                return None;
            }
            let base = Ipv4Addr::from(cursor as u32);
            ranges.push((tier, Cidr { base, prefix: tier.cidr_mask }));
            cursor += size;
        }
        Some(ranges)
    }
}

impl SecurityRule {
    fn admits(&self, direction: Direction, protocol: Protocol, port: u16, peer: Ipv4Addr) -> bool {
        if self.direction != direction {
            return false;
        }
        if self.protocol != Protocol::All && self.protocol != protocol {
            return false;
        }
        if let Some(p) = self.port
            && p != port
        {
            return false;
        }
        Cidr::parse(&self.cidr).is_some_and(|c| c.contains(peer))
    }
}

impl SecurityGroupSpec {
    /// Declared rules plus the implicit outbound rule, if enabled.
    pub fn effective_rules(&self) -> Vec<SecurityRule> {
        let mut rules = self.rules.clone();
        if self.allow_all_outbound {
            rules.push(SecurityRule {
                direction: Direction::Egress,
                protocol: Protocol::All,
                port: None,
                cidr: "0.0.0.0/0".to_string(),
                description: "allow all outbound traffic by default".to_string(),
            });
        }
        rules
    }

    /// Whether a flow is admitted by any rule of the group.
    pub fn allows(
        &self,
        direction: Direction,
        protocol: Protocol,
        port: u16,
        peer: Ipv4Addr,
    ) -> bool {
        self.effective_rules()
            .iter()
            .any(|r| r.admits(direction, protocol, port, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_group() -> SecurityGroupSpec {
        SecurityGroupSpec {
            name: "webserver-sg".to_string(),
            allow_all_outbound: true,
            rules: vec![SecurityRule {
                direction: Direction::Ingress,
                protocol: Protocol::Tcp,
                port: Some(22),
                cidr: "0.0.0.0/0".to_string(),
                description: "allow SSH access from anywhere".to_string(),
            }],
        }
    }

    #[test]
    fn cidr_parse_and_contains() {
        let c = Cidr::parse("10.0.0.0/16").unwrap();
        assert!(c.contains(Ipv4Addr::new(10, 0, 200, 3)));
        assert!(!c.contains(Ipv4Addr::new(10, 1, 0, 1)));
        assert_eq!(c.size(), 65536);
    }

    #[test]
    fn cidr_rejects_bad_shapes() {
        assert!(Cidr::parse("10.0.0.0").is_none());
        assert!(Cidr::parse("10.0.0.0/33").is_none());
        assert!(Cidr::parse("not-an-ip/8").is_none());
    }

    #[test]
    fn cidr_zero_prefix_matches_everything() {
        let any = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(any.contains(Ipv4Addr::new(203, 0, 113, 9)));
    }

    #[test]
    fn cidr_nth_address() {
        let c = Cidr::parse("10.0.1.0/24").unwrap();
        assert_eq!(c.nth(10), Some(Ipv4Addr::new(10, 0, 1, 10)));
        assert_eq!(c.nth(256), None);
    }

    #[test]
    fn subnet_ranges_are_carved_in_order() {
        use crate::types::SubnetKind;

        let network = NetworkSpec {
            id: "vpc".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            subnets: vec![
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
            ],
            nat_gateways: 1,
        };

        let ranges = network.subnet_ranges().unwrap();
        assert_eq!(ranges[0].1.to_string(), "10.0.0.0/24");
        assert_eq!(ranges[1].1.to_string(), "10.0.1.0/24");
    }

    #[test]
    fn subnet_ranges_reject_overflow() {
        use crate::types::SubnetKind;

        let tier = |name: &str| SubnetTier {
            name: name.to_string(),
            kind: SubnetKind::Public,
            cidr_mask: 25,
        };
        let network = NetworkSpec {
            id: "vpc".to_string(),
            cidr: "10.0.0.0/24".to_string(),
            subnets: vec![tier("a"), tier("b"), tier("c")],
            nat_gateways: 0,
        };
        assert!(network.subnet_ranges().is_none());
    }

    #[test]
    fn ssh_ingress_allowed_from_anywhere() {
        let sg = ssh_group();
        assert!(sg.allows(
            Direction::Ingress,
            Protocol::Tcp,
            22,
            Ipv4Addr::new(198, 51, 100, 7)
        ));
    }

    #[test]
    fn other_ingress_ports_denied() {
        let sg = ssh_group();
        assert!(!sg.allows(Direction::Ingress, Protocol::Tcp, 3000, Ipv4Addr::LOCALHOST));
        assert!(!sg.allows(Direction::Ingress, Protocol::Udp, 22, Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn outbound_follows_allow_all_flag() {
        let mut sg = ssh_group();
        assert!(sg.allows(Direction::Egress, Protocol::Udp, 53, Ipv4Addr::new(8, 8, 8, 8)));

        sg.allow_all_outbound = false;
        assert!(!sg.allows(Direction::Egress, Protocol::Udp, 53, Ipv4Addr::new(8, 8, 8, 8)));
    }
}
