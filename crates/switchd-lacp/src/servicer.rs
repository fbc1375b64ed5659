//! Platform surface for the LACP subsystem.
//!
//! The machines never touch hardware or the state pipeline directly; they go
//! through [`LacpServicer`]. The production implementation bridges to the
//! switch state update pipeline and an outbound frame channel; tests swap in
//! a recording fake.

use crate::machines::ProgramForwardingState;
use switchd_state::{Forwarding, StateHandle};
use switchd_types::{AggregatePortId, MacAddress, PortId, VlanId};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// What the LACP machines need from the rest of the switch.
pub trait LacpServicer: Send + Sync {
    /// Allocates an outbound frame buffer. `None` means the transmission is
    /// dropped.
    fn allocate_frame(&self, len: usize) -> Option<Vec<u8>> {
        Some(vec![0; len])
    }

    /// Hands a fully built frame to the egress path for `port`.
    fn send_frame(&self, port: PortId, frame: Vec<u8>);

    /// Source MAC for frames leaving `port`.
    fn source_mac(&self, port: PortId) -> MacAddress;

    /// VLAN the frame is tagged with on `port`.
    fn ingress_vlan(&self, port: PortId) -> VlanId;

    /// Enables or disables `port`'s traffic within its aggregate.
    fn program_forwarding(&self, port: PortId, aggregate: AggregatePortId, target: Forwarding);
}

/// An LACPDU ready for the wire.
#[derive(Debug)]
pub struct OutboundFrame {
    pub port: PortId,
    pub data: Vec<u8>,
}

/// Production servicer: forwarding changes become state transforms on the
/// update pipeline, frames go to whoever drains the egress channel.
pub struct SwitchServicer {
    updates: StateHandle,
    local_mac: MacAddress,
    egress: mpsc::UnboundedSender<OutboundFrame>,
}

impl SwitchServicer {
    pub fn new(
        updates: StateHandle,
        local_mac: MacAddress,
        egress: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Self {
        SwitchServicer {
            updates,
            local_mac,
            egress,
        }
    }
}

impl LacpServicer for SwitchServicer {
    fn send_frame(&self, port: PortId, frame: Vec<u8>) {
        if self
            .egress
            .send(OutboundFrame { port, data: frame })
            .is_err()
        {
            debug!(%port, "egress channel closed, dropping frame");
        }
    }

    fn source_mac(&self, _port: PortId) -> MacAddress {
        self.local_mac
    }

    fn ingress_vlan(&self, port: PortId) -> VlanId {
        match self.updates.current_state().ports().get(&port) {
            Some(p) => p.ingress_vlan,
            None => {
                warn!(%port, "no switch state for port, tagging with default VLAN");
                VlanId::DEFAULT
            }
        }
    }

    fn program_forwarding(&self, port: PortId, aggregate: AggregatePortId, target: Forwarding) {
        let transform = ProgramForwardingState::new(port, aggregate, target);
        if let Err(e) = self
            .updates
            .submit("aggregate port forwarding", move |state| {
                transform.apply(state)
            })
        {
            error!(%port, %aggregate, error = %e, "failed to program forwarding state");
        }
    }
}
