//! Neighbor (ARP/NDP) table nodes.
//!
//! Neighbor tables live inside their VLAN's node, so every neighbor update
//! is itself a copy-on-write state change: observers see either the old or
//! the new table, never a partial one.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use serde::Serialize;
use switchd_types::{InterfaceId, MacAddress, PortId};

/// Reachability state of a neighbor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NeighborEntryState {
    /// Resolution in progress; MAC not yet known.
    Pending,
    /// Confirmed reachable by a solicited advertisement.
    Reachable,
    /// Previously reachable, past its freshness interval.
    Stale,
    /// Learned from an unsolicited advertisement; not yet confirmed.
    Unverified,
    /// Aged out; kept only until the next flush transform runs.
    Expired,
    /// Configured statically; never aged.
    Static,
}

impl NeighborEntryState {
    /// Whether the entry carries a usable MAC for forwarding.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, NeighborEntryState::Pending | NeighborEntryState::Expired)
    }
}

/// One resolved or in-progress neighbor.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborEntry<A> {
    #[serde(skip)]
    base: NodeBase,
    pub ip: A,
    pub mac: MacAddress,
    pub port: PortId,
    pub interface: InterfaceId,
    pub state: NeighborEntryState,
}

impl<A: Copy> NeighborEntry<A> {
    pub fn new(
        ip: A,
        mac: MacAddress,
        port: PortId,
        interface: InterfaceId,
        state: NeighborEntryState,
    ) -> Self {
        NeighborEntry {
            base: NodeBase::default(),
            ip,
            mac,
            port,
            interface,
            state,
        }
    }

    /// A placeholder entry for an address we have solicited but not resolved.
    pub fn pending(ip: A, interface: InterfaceId) -> Self {
        NeighborEntry::new(
            ip,
            MacAddress::ZERO,
            PortId(0),
            interface,
            NeighborEntryState::Pending,
        )
    }

    pub fn is_pending(&self) -> bool {
        self.state == NeighborEntryState::Pending
    }
}

impl<A: Copy + Clone + std::fmt::Debug> Node for NeighborEntry<A> {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// A VLAN's neighbor table, keyed by IP address.
pub type NeighborTable<A> = NodeMap<A, NeighborEntry<A>>;
