//! The switch state root node.

use crate::acl::AclMap;
use crate::aggregate_port::AggregatePortMap;
use crate::control_plane::ControlPlane;
use crate::interface::InterfaceMap;
use crate::node::{Node, NodeBase};
use crate::port::PortMap;
use crate::route::RouteTableMap;
use crate::vlan::VlanMap;
use serde::Serialize;
use std::sync::Arc;

macro_rules! collection_accessors {
    ($field:ident, $get:ident, $get_mut:ident, $ty:ty) => {
        pub fn $get(&self) -> &Arc<$ty> {
            &self.$field
        }

        /// Returns the writable collection, cloning it first if published.
        ///
        /// Must be called on an unpublished root (see [`SwitchState::modify`]).
        pub fn $get_mut(&mut self) -> &mut $ty {
            if self.$field.is_published() {
                self.$field = Arc::new(<$ty>::clone(&self.$field));
            }
            Arc::get_mut(&mut self.$field).expect("unpublished node must be uniquely owned")
        }
    };
}

/// The root of the versioned switch state tree.
///
/// A published root is never mutated; transforms clone the root (and only
/// the path down to whatever they touch) and produce a new one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SwitchState {
    #[serde(skip)]
    base: NodeBase,
    ports: Arc<PortMap>,
    vlans: Arc<VlanMap>,
    interfaces: Arc<InterfaceMap>,
    route_tables: Arc<RouteTableMap>,
    acls: Arc<AclMap>,
    aggregate_ports: Arc<AggregatePortMap>,
    control_plane: Arc<ControlPlane>,
}

impl SwitchState {
    pub fn new() -> Self {
        SwitchState::default()
    }

    collection_accessors!(ports, ports, ports_mut, PortMap);
    collection_accessors!(vlans, vlans, vlans_mut, VlanMap);
    collection_accessors!(interfaces, interfaces, interfaces_mut, InterfaceMap);
    collection_accessors!(route_tables, route_tables, route_tables_mut, RouteTableMap);
    collection_accessors!(acls, acls, acls_mut, AclMap);
    collection_accessors!(
        aggregate_ports,
        aggregate_ports,
        aggregate_ports_mut,
        AggregatePortMap
    );
    collection_accessors!(control_plane, control_plane, control_plane_mut, ControlPlane);

    /// Ensures `root` points at an unpublished root and returns it writable.
    ///
    /// If the current root is published this replaces it with a clone
    /// (children keep pointer identity, so the clone is cheap); if it is
    /// already unpublished the in-flight transform owns it and it is
    /// returned as-is.
    pub fn modify(root: &mut Arc<SwitchState>) -> &mut SwitchState {
        if root.is_published() {
            *root = Arc::new(SwitchState::clone(root));
        }
        Arc::get_mut(root).expect("unpublished switch state must be uniquely owned")
    }
}

impl Node for SwitchState {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.ports.publish();
        self.vlans.publish();
        self.interfaces.publish();
        self.route_tables.publish();
        self.acls.publish();
        self.aggregate_ports.publish();
        self.control_plane.publish();
        self.base.mark_published();
    }
}
