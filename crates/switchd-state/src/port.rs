//! Physical port state node.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use crate::switch_state::SwitchState;
use serde::Serialize;
use std::sync::Arc;
use switchd_types::{AggregatePortId, PortId, VlanId};

/// Administrative and operational state of a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortState {
    Disabled,
    Down,
    Up,
}

/// A physical switch port.
#[derive(Debug, Clone, Serialize)]
pub struct Port {
    #[serde(skip)]
    base: NodeBase,
    pub id: PortId,
    pub name: String,
    pub state: PortState,
    /// VLAN applied to untagged ingress traffic on this port.
    pub ingress_vlan: VlanId,
    /// Aggregate port this port is configured into, if any.
    pub aggregate: Option<AggregatePortId>,
}

impl Port {
    pub fn new(id: PortId, name: impl Into<String>) -> Self {
        Port {
            base: NodeBase::default(),
            id,
            name: name.into(),
            state: PortState::Disabled,
            ingress_vlan: VlanId::DEFAULT,
            aggregate: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == PortState::Up
    }

    /// Returns a writable `Port` under `root`, cloning the copy-on-write
    /// path as needed. `None` if the port does not exist.
    pub fn modify(id: PortId, root: &mut Arc<SwitchState>) -> Option<&mut Port> {
        SwitchState::modify(root).ports_mut().modify_node(&id)
    }
}

impl Node for Port {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// All physical ports, keyed by port ID.
pub type PortMap = NodeMap<PortId, Port>;
