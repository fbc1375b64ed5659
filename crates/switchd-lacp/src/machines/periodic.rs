//! LACP periodic transmission machine.
//!
//! Decides whether unsolicited LACPDUs are sent at all (at least one side
//! must be ACTIVE) and at which cadence: the fast period when the partner
//! asked for the short timeout, the slow period otherwise.

use super::{Scheduler, Signal, TimerKind};
use crate::types::{LacpState, ParticipantInfo, LONG_PERIOD, SHORT_PERIOD};
use std::fmt;
use switchd_types::PortId;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodicState {
    /// No periodic transmission (both sides passive).
    None,
    Slow,
    Fast,
    /// Transient state while a transmission is being signaled.
    Tx,
}

impl fmt::Display for PeriodicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodicState::None => "NONE",
            PeriodicState::Slow => "SLOW",
            PeriodicState::Fast => "FAST",
            PeriodicState::Tx => "TX",
        };
        f.write_str(name)
    }
}

pub struct PeriodicTransmissionMachine {
    port: PortId,
    state: PeriodicState,
}

impl PeriodicTransmissionMachine {
    pub fn new(port: PortId) -> Self {
        PeriodicTransmissionMachine {
            port,
            state: PeriodicState::None,
        }
    }

    pub fn state(&self) -> PeriodicState {
        self.state
    }

    /// (Re)computes the rate from current actor and partner activity and
    /// arms the next period.
    pub fn start(
        &mut self,
        actor: &ParticipantInfo,
        partner: &ParticipantInfo,
        timers: &mut dyn Scheduler,
    ) {
        self.state = Self::determine_rate(actor, partner);
        debug!(port = %self.port, rate = %self.state, "periodic machine (re)started");
        self.begin_next_period(timers);
    }

    pub fn stop(&mut self, timers: &mut dyn Scheduler) {
        self.state = PeriodicState::None;
        timers.cancel(self.port, TimerKind::Periodic);
    }

    pub fn timeout_expired(
        &mut self,
        actor: &ParticipantInfo,
        partner: &ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        self.state = PeriodicState::Tx;
        signals.push(Signal::Ntt);
        self.state = Self::determine_rate(actor, partner);
        self.begin_next_period(timers);
    }

    fn begin_next_period(&mut self, timers: &mut dyn Scheduler) {
        match self.state {
            PeriodicState::Fast => timers.schedule(self.port, TimerKind::Periodic, SHORT_PERIOD),
            PeriodicState::Slow => timers.schedule(self.port, TimerKind::Periodic, LONG_PERIOD),
            PeriodicState::None => timers.cancel(self.port, TimerKind::Periodic),
            PeriodicState::Tx => panic!(
                "periodic machine for {}: beginning a period in TX state",
                self.port
            ),
        }
    }

    fn determine_rate(actor: &ParticipantInfo, partner: &ParticipantInfo) -> PeriodicState {
        if !actor.state.contains(LacpState::ACTIVE)
            && !partner.state.contains(LacpState::ACTIVE)
        {
            return PeriodicState::None;
        }
        if partner.state.contains(LacpState::SHORT_TIMEOUT) {
            PeriodicState::Fast
        } else {
            PeriodicState::Slow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::testing::RecordingScheduler;
    use pretty_assertions::assert_eq;

    fn participant(state: LacpState) -> ParticipantInfo {
        ParticipantInfo {
            state,
            ..ParticipantInfo::default()
        }
    }

    #[test]
    fn both_passive_means_no_transmission() {
        let mut machine = PeriodicTransmissionMachine::new(PortId(1));
        let mut timers = RecordingScheduler::default();
        machine.start(
            &participant(LacpState::NONE),
            &participant(LacpState::NONE),
            &mut timers,
        );
        assert_eq!(machine.state(), PeriodicState::None);
        assert!(timers.armed.is_empty());
        assert_eq!(timers.canceled, vec![(PortId(1), TimerKind::Periodic)]);
    }

    #[test]
    fn partner_short_timeout_selects_fast_rate() {
        let mut machine = PeriodicTransmissionMachine::new(PortId(1));
        let mut timers = RecordingScheduler::default();
        machine.start(
            &participant(LacpState::ACTIVE),
            &participant(LacpState::SHORT_TIMEOUT),
            &mut timers,
        );
        assert_eq!(machine.state(), PeriodicState::Fast);
        assert_eq!(timers.last_armed(TimerKind::Periodic), Some(SHORT_PERIOD));
    }

    #[test]
    fn expiry_signals_ntt_and_rearms() {
        let mut machine = PeriodicTransmissionMachine::new(PortId(1));
        let mut timers = RecordingScheduler::default();
        let actor = participant(LacpState::ACTIVE);
        let partner = participant(LacpState::NONE);
        machine.start(&actor, &partner, &mut timers);
        assert_eq!(machine.state(), PeriodicState::Slow);

        let mut signals = Vec::new();
        machine.timeout_expired(&actor, &partner, &mut signals, &mut timers);
        assert_eq!(signals, vec![Signal::Ntt]);
        assert_eq!(machine.state(), PeriodicState::Slow);
        assert_eq!(timers.last_armed(TimerKind::Periodic), Some(LONG_PERIOD));
    }
}
