//! Routed (L3) interface state node.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use serde::Serialize;
use std::net::IpAddr;
use switchd_types::{InterfaceId, MacAddress, VlanId};

/// A routed interface on top of a VLAN.
#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    #[serde(skip)]
    base: NodeBase,
    pub id: InterfaceId,
    pub name: String,
    pub vlan: VlanId,
    pub mac: MacAddress,
    pub addresses: Vec<(IpAddr, u8)>,
}

impl Interface {
    pub fn new(id: InterfaceId, name: impl Into<String>, vlan: VlanId, mac: MacAddress) -> Self {
        Interface {
            base: NodeBase::default(),
            id,
            name: name.into(),
            vlan,
            mac,
            addresses: Vec::new(),
        }
    }

    pub fn has_address(&self, addr: &IpAddr) -> bool {
        self.addresses.iter().any(|(a, _)| a == addr)
    }
}

impl Node for Interface {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// All routed interfaces, keyed by interface ID.
pub type InterfaceMap = NodeMap<InterfaceId, Interface>;
