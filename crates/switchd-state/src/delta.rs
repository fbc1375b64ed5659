//! Structural diffing between two switch state roots.

use crate::acl::AclEntry;
use crate::aggregate_port::AggregatePort;
use crate::control_plane::ControlPlane;
use crate::interface::Interface;
use crate::node_map::{DeltaValue, NodeMapDelta};
use crate::port::Port;
use crate::route::{RouteTable, RouterId};
use crate::switch_state::SwitchState;
use crate::vlan::Vlan;
use std::sync::Arc;
use switchd_types::{AggregatePortId, InterfaceId, PortId, VlanId};

/// The differences between two [`SwitchState`] roots.
///
/// Collections shared between the two roots are recognized by pointer
/// identity and skipped wholesale; the cost of a delta is proportional to
/// what actually changed, not to the size of the tree.
pub struct StateDelta {
    old: Arc<SwitchState>,
    new: Arc<SwitchState>,
}

impl StateDelta {
    pub fn new(old: Arc<SwitchState>, new: Arc<SwitchState>) -> Self {
        StateDelta { old, new }
    }

    pub fn old_state(&self) -> &Arc<SwitchState> {
        &self.old
    }

    pub fn new_state(&self) -> &Arc<SwitchState> {
        &self.new
    }

    pub fn ports_delta(&self) -> NodeMapDelta<'_, PortId, Port> {
        NodeMapDelta::new(self.old.ports(), self.new.ports())
    }

    pub fn vlans_delta(&self) -> NodeMapDelta<'_, VlanId, Vlan> {
        NodeMapDelta::new(self.old.vlans(), self.new.vlans())
    }

    pub fn interfaces_delta(&self) -> NodeMapDelta<'_, InterfaceId, Interface> {
        NodeMapDelta::new(self.old.interfaces(), self.new.interfaces())
    }

    pub fn route_tables_delta(&self) -> NodeMapDelta<'_, RouterId, RouteTable> {
        NodeMapDelta::new(self.old.route_tables(), self.new.route_tables())
    }

    pub fn acls_delta(&self) -> NodeMapDelta<'_, String, AclEntry> {
        NodeMapDelta::new(self.old.acls(), self.new.acls())
    }

    pub fn aggregate_ports_delta(&self) -> NodeMapDelta<'_, AggregatePortId, AggregatePort> {
        NodeMapDelta::new(self.old.aggregate_ports(), self.new.aggregate_ports())
    }

    /// The control plane is a single node, not a map; `None` when unchanged.
    pub fn control_plane_delta(&self) -> Option<DeltaValue<'_, ControlPlane>> {
        if Arc::ptr_eq(self.old.control_plane(), self.new.control_plane()) {
            None
        } else {
            Some(DeltaValue {
                old: Some(self.old.control_plane()),
                new: Some(self.new.control_plane()),
            })
        }
    }
}
