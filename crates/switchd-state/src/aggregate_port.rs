//! Aggregate (link-aggregation) port state node.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use crate::switch_state::SwitchState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use switchd_types::{AggregatePortId, MacAddress, PortId};

/// Whether a member port's traffic is included in the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Forwarding {
    Enabled,
    Disabled,
}

/// A logical bundle of physical ports (one LAG).
///
/// Member forwarding starts `Disabled`; the LACP mux machine enables it only
/// after the protocol handshake proves the link usable.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatePort {
    #[serde(skip)]
    base: NodeBase,
    pub id: AggregatePortId,
    pub name: String,
    pub system_priority: u16,
    pub system_id: MacAddress,
    /// Members below this count keep the whole LAG on standby.
    pub min_link_count: u8,
    members: BTreeMap<PortId, Forwarding>,
}

impl AggregatePort {
    pub fn new(
        id: AggregatePortId,
        name: impl Into<String>,
        system_priority: u16,
        system_id: MacAddress,
        min_link_count: u8,
    ) -> Self {
        AggregatePort {
            base: NodeBase::default(),
            id,
            name: name.into(),
            system_priority,
            system_id,
            min_link_count,
            members: BTreeMap::new(),
        }
    }

    pub fn add_member(&mut self, port: PortId) {
        self.members.entry(port).or_insert(Forwarding::Disabled);
    }

    pub fn remove_member(&mut self, port: PortId) {
        self.members.remove(&port);
    }

    pub fn is_member(&self, port: PortId) -> bool {
        self.members.contains_key(&port)
    }

    pub fn members(&self) -> impl Iterator<Item = (PortId, Forwarding)> + '_ {
        self.members.iter().map(|(p, f)| (*p, *f))
    }

    pub fn forwarding_state(&self, port: PortId) -> Option<Forwarding> {
        self.members.get(&port).copied()
    }

    pub fn set_forwarding_state(&mut self, port: PortId, fwd: Forwarding) {
        if let Some(slot) = self.members.get_mut(&port) {
            *slot = fwd;
        }
    }

    /// Number of members currently forwarding.
    pub fn forwarding_count(&self) -> usize {
        self.members
            .values()
            .filter(|f| **f == Forwarding::Enabled)
            .count()
    }

    /// Returns a writable `AggregatePort` under `root`, cloning the
    /// copy-on-write path as needed. `None` if it does not exist.
    pub fn modify(
        id: AggregatePortId,
        root: &mut Arc<SwitchState>,
    ) -> Option<&mut AggregatePort> {
        SwitchState::modify(root).aggregate_ports_mut().modify_node(&id)
    }
}

impl Node for AggregatePort {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// All aggregate ports, keyed by aggregate port ID.
pub type AggregatePortMap = NodeMap<AggregatePortId, AggregatePort>;
