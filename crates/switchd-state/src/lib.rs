//! Immutable, versioned switch state for the switchd control plane.
//!
//! The state tree is a DAG of nodes (ports, VLANs, interfaces, route tables,
//! ACLs, aggregate ports, control plane) under one [`SwitchState`] root.
//! Published nodes are never mutated; `modify` clones the copy-on-write path
//! instead, and [`StateDelta`] diffs two roots in time proportional to what
//! changed. All writes flow through the single-writer [`StateUpdater`]
//! pipeline.
//!
//! ```
//! use switchd_state::{Node, Port, SwitchState};
//! use switchd_types::PortId;
//! use std::sync::Arc;
//!
//! let mut root = Arc::new(SwitchState::new());
//! SwitchState::modify(&mut root)
//!     .ports_mut()
//!     .insert(PortId(1), Arc::new(Port::new(PortId(1), "eth1/1")));
//! root.publish();
//! assert!(root.ports().get(&PortId(1)).is_some());
//! ```

mod acl;
mod aggregate_port;
mod control_plane;
mod delta;
mod interface;
mod neighbor;
mod node;
mod node_map;
mod port;
mod route;
mod switch_state;
mod update;
mod vlan;

pub use acl::{AclAction, AclEntry, AclMap};
pub use aggregate_port::{AggregatePort, AggregatePortMap, Forwarding};
pub use control_plane::{ControlPlane, CpuQueue};
pub use delta::StateDelta;
pub use interface::{Interface, InterfaceMap};
pub use neighbor::{NeighborEntry, NeighborEntryState, NeighborTable};
pub use node::{Node, NodeBase};
pub use node_map::{DeltaValue, NodeMap, NodeMapDelta};
pub use port::{Port, PortMap, PortState};
pub use route::{NextHop, Prefix, RouteTable, RouteTableMap, RouterId};
pub use switch_state::SwitchState;
pub use update::{Result, StateHandle, StateTransform, StateUpdateError, StateUpdater};
pub use vlan::{Vlan, VlanMap};
