//! Route table state node.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use switchd_types::InterfaceId;

/// Identifier of a routing domain (VRF).
pub type RouterId = u32;

/// Resolved next hop for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextHop {
    pub address: IpAddr,
    pub interface: InterfaceId,
}

/// A (prefix, mask-length) route key.
pub type Prefix = (IpAddr, u8);

/// One routing domain's table of prefixes.
///
/// Routes are plain values rather than tree nodes; the table node is the
/// diffing granularity.
#[derive(Debug, Clone, Serialize)]
pub struct RouteTable {
    #[serde(skip)]
    base: NodeBase,
    pub id: RouterId,
    pub routes: BTreeMap<Prefix, NextHop>,
}

impl RouteTable {
    pub fn new(id: RouterId) -> Self {
        RouteTable {
            base: NodeBase::default(),
            id,
            routes: BTreeMap::new(),
        }
    }

    pub fn longest_match(&self, addr: &IpAddr) -> Option<&NextHop> {
        // Linear scan is fine at control-plane scale; the FIB proper lives
        // in hardware behind the SDK boundary.
        self.routes
            .iter()
            .filter(|((prefix, len), _)| prefix_contains(prefix, *len, addr))
            .max_by_key(|((_, len), _)| *len)
            .map(|(_, nh)| nh)
    }
}

fn prefix_contains(prefix: &IpAddr, len: u8, addr: &IpAddr) -> bool {
    // Lengths beyond the address width are treated as host routes.
    match (prefix, addr) {
        (IpAddr::V4(p), IpAddr::V4(a)) => {
            let hostmask = u32::MAX.checked_shr(u32::from(len)).unwrap_or(0);
            (u32::from(*p) | hostmask) == (u32::from(*a) | hostmask)
        }
        (IpAddr::V6(p), IpAddr::V6(a)) => {
            let hostmask = u128::MAX.checked_shr(u32::from(len)).unwrap_or(0);
            (u128::from(*p) | hostmask) == (u128::from(*a) | hostmask)
        }
        _ => false,
    }
}

impl Node for RouteTable {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// All route tables, keyed by router ID.
pub type RouteTableMap = NodeMap<RouterId, RouteTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_longest_match_prefers_more_specific() {
        let mut table = RouteTable::new(0);
        let nh_default = NextHop {
            address: "10.0.0.1".parse().unwrap(),
            interface: InterfaceId(1),
        };
        let nh_specific = NextHop {
            address: "10.0.1.1".parse().unwrap(),
            interface: InterfaceId(2),
        };
        table
            .routes
            .insert(("0.0.0.0".parse().unwrap(), 0), nh_default);
        table
            .routes
            .insert(("10.1.0.0".parse().unwrap(), 16), nh_specific.clone());

        let hit = table.longest_match(&"10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(*hit, nh_specific);

        let miss = table.longest_match(&"192.0.2.1".parse().unwrap()).unwrap();
        assert_eq!(miss.interface, InterfaceId(1));
    }

    #[test]
    fn test_oversized_prefix_length_acts_as_host_route() {
        let mut table = RouteTable::new(0);
        let nh = NextHop {
            address: "10.0.0.1".parse().unwrap(),
            interface: InterfaceId(1),
        };
        table.routes.insert(("10.1.2.3".parse().unwrap(), 255), nh);

        assert!(table.longest_match(&"10.1.2.3".parse().unwrap()).is_some());
        assert!(table.longest_match(&"10.1.2.4".parse().unwrap()).is_none());
    }
}
