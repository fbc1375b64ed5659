//! VLAN state node, including its neighbor tables.

use crate::neighbor::NeighborTable;
use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use crate::switch_state::SwitchState;
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use switchd_types::{InterfaceId, VlanId};

/// A VLAN and the L2 neighbor state learned on it.
#[derive(Debug, Clone, Serialize)]
pub struct Vlan {
    #[serde(skip)]
    base: NodeBase,
    pub id: VlanId,
    pub name: String,
    /// Routed interface attached to this VLAN, if any.
    pub interface: Option<InterfaceId>,
    pub arp_table: Arc<NeighborTable<Ipv4Addr>>,
    pub ndp_table: Arc<NeighborTable<Ipv6Addr>>,
}

impl Vlan {
    pub fn new(id: VlanId, name: impl Into<String>) -> Self {
        Vlan {
            base: NodeBase::default(),
            id,
            name: name.into(),
            interface: None,
            arp_table: Arc::new(NeighborTable::new()),
            ndp_table: Arc::new(NeighborTable::new()),
        }
    }

    /// Returns a writable ARP table, cloning it first if published.
    pub fn arp_table_mut(&mut self) -> &mut NeighborTable<Ipv4Addr> {
        if self.arp_table.is_published() {
            self.arp_table = Arc::new(NeighborTable::clone(&self.arp_table));
        }
        Arc::get_mut(&mut self.arp_table).expect("unpublished node must be uniquely owned")
    }

    /// Returns a writable NDP table, cloning it first if published.
    pub fn ndp_table_mut(&mut self) -> &mut NeighborTable<Ipv6Addr> {
        if self.ndp_table.is_published() {
            self.ndp_table = Arc::new(NeighborTable::clone(&self.ndp_table));
        }
        Arc::get_mut(&mut self.ndp_table).expect("unpublished node must be uniquely owned")
    }

    /// Returns a writable `Vlan` under `root`, cloning the copy-on-write
    /// path as needed. `None` if the VLAN does not exist.
    pub fn modify(id: VlanId, root: &mut Arc<SwitchState>) -> Option<&mut Vlan> {
        SwitchState::modify(root).vlans_mut().modify_node(&id)
    }
}

impl Node for Vlan {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.arp_table.publish();
        self.ndp_table.publish();
        self.base.mark_published();
    }
}

/// All VLANs, keyed by VLAN ID.
pub type VlanMap = NodeMap<VlanId, Vlan>;
