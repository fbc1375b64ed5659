//! LACP transmit machine.
//!
//! Pure rate limiter in front of frame transmission: a token bucket holding
//! at most three transmissions, refilled by one token every second. NTT
//! signals beyond the budget are dropped, the protocol retransmits soon
//! enough anyway.

use super::{Scheduler, TimerKind};
use crate::pdu::{self, Lacpdu};
use crate::servicer::LacpServicer;
use crate::types::{MAX_TRANSMISSIONS_PER_PERIOD, TX_REPLENISH_PERIOD};
use switchd_types::{MacAddress, PortId, VlanId};
use tracing::debug;

pub struct TransmitMachine {
    port: PortId,
    transmissions_left: u8,
}

impl TransmitMachine {
    pub fn new(port: PortId) -> Self {
        TransmitMachine {
            port,
            transmissions_left: MAX_TRANSMISSIONS_PER_PERIOD,
        }
    }

    pub fn start(&mut self, timers: &mut dyn Scheduler) {
        timers.schedule(self.port, TimerKind::TxReplenish, TX_REPLENISH_PERIOD);
    }

    pub fn stop(&mut self, timers: &mut dyn Scheduler) {
        timers.cancel(self.port, TimerKind::TxReplenish);
    }

    /// Replenish timer fired: one more transmission allowed this period.
    pub fn replenish(&mut self, timers: &mut dyn Scheduler) {
        self.transmissions_left =
            (self.transmissions_left + 1).min(MAX_TRANSMISSIONS_PER_PERIOD);
        timers.schedule(self.port, TimerKind::TxReplenish, TX_REPLENISH_PERIOD);
    }

    /// Transmit `pdu` if the rate limiter allows it.
    pub fn ntt(
        &mut self,
        pdu: Lacpdu,
        src_mac: MacAddress,
        vlan: VlanId,
        servicer: &dyn LacpServicer,
    ) {
        if self.transmissions_left == 0 {
            debug!(port = %self.port, "transmission budget exhausted, dropping LACPDU");
            return;
        }

        let Some(mut frame) = servicer.allocate_frame(pdu::FRAME_LENGTH) else {
            debug!(port = %self.port, "frame allocation failed, dropping LACPDU");
            return;
        };
        self.transmissions_left -= 1;

        pdu::write_ethernet_header(&mut frame, src_mac, vlan);
        pdu.serialize_into(&mut frame[pdu::ETHERNET_HEADER_LENGTH..]);
        servicer.send_frame(self.port, frame);
    }
}
