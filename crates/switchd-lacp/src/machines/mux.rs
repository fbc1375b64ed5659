//! LACP mux machine.
//!
//! Couples the port to its aggregator. Selection moves it out of DETACHED,
//! the aggregate-wait dwell and a matched partner move it through ATTACHED
//! into COLLECTING_DISTRIBUTING, where member forwarding is programmed into
//! the switch state.

use super::{Scheduler, Signal, TimerKind};
use crate::servicer::LacpServicer;
use crate::types::{LacpState, ParticipantInfo, AGGREGATE_WAIT};
use std::fmt;
use std::sync::Arc;
use switchd_state::{AggregatePort, Forwarding, SwitchState};
use switchd_types::{AggregatePortId, PortId};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxState {
    Detached,
    Waiting,
    Attached,
    CollectingDistributing,
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MuxState::Detached => "DETACHED",
            MuxState::Waiting => "WAITING",
            MuxState::Attached => "ATTACHED",
            MuxState::CollectingDistributing => "COLLECTING_DISTRIBUTING",
        };
        f.write_str(name)
    }
}

pub struct MuxMachine {
    port: PortId,
    aggregate: AggregatePortId,
    state: MuxState,
    matched: bool,
}

impl MuxMachine {
    pub fn new(port: PortId, aggregate: AggregatePortId) -> Self {
        MuxMachine {
            port,
            aggregate,
            state: MuxState::Detached,
            matched: false,
        }
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn selected(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        match self.state {
            MuxState::Detached => self.waiting(true, timers),
            MuxState::Waiting => {
                self.attached(actor, signals, timers, servicer);
                if self.matched {
                    self.collecting_distributing(actor, signals, servicer);
                }
            }
            MuxState::Attached | MuxState::CollectingDistributing => {
                debug!(port = %self.port, state = %self.state, "selected: already coupled");
            }
        }
    }

    pub fn unselected(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        match self.state {
            MuxState::Detached => {
                debug!(port = %self.port, "unselected: already detached");
            }
            MuxState::Waiting | MuxState::Attached => {
                self.detached(actor, signals, timers, servicer);
            }
            MuxState::CollectingDistributing => {
                self.attached(actor, signals, timers, servicer);
            }
        }
    }

    pub fn standby(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        match self.state {
            MuxState::Detached => self.waiting(false, timers),
            MuxState::Waiting => {
                debug!(port = %self.port, "standby: already waiting");
            }
            MuxState::Attached | MuxState::CollectingDistributing => {
                self.detached(actor, signals, timers, servicer);
            }
        }
    }

    pub fn matched(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        servicer: &dyn LacpServicer,
    ) {
        self.matched = true;
        if self.state == MuxState::Attached {
            self.collecting_distributing(actor, signals, servicer);
        }
    }

    pub fn not_matched(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        self.matched = false;
        if self.state == MuxState::CollectingDistributing {
            self.attached(actor, signals, timers, servicer);
        }
    }

    /// Aggregate-wait timer fired.
    pub fn timeout_expired(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        if self.state != MuxState::Waiting {
            debug!(port = %self.port, state = %self.state, "stale aggregate-wait timer, ignoring");
            return;
        }
        self.attached(actor, signals, timers, servicer);
        if self.matched {
            self.collecting_distributing(actor, signals, servicer);
        }
    }

    fn waiting(&mut self, arm_timer: bool, timers: &mut dyn Scheduler) {
        self.transition(MuxState::Waiting);
        if arm_timer {
            timers.schedule(self.port, TimerKind::AggregateWait, AGGREGATE_WAIT);
        }
    }

    fn detached(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        let was_forwarding = self.state == MuxState::CollectingDistributing;
        self.transition(MuxState::Detached);
        actor.state.remove(LacpState::IN_SYNC);
        if was_forwarding {
            self.disable_collecting_distributing(actor, servicer);
        }
        timers.cancel(self.port, TimerKind::AggregateWait);
        signals.push(Signal::Ntt);
    }

    fn attached(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
        servicer: &dyn LacpServicer,
    ) {
        let was_forwarding = self.state == MuxState::CollectingDistributing;
        self.transition(MuxState::Attached);
        actor.state.insert(LacpState::IN_SYNC);
        if was_forwarding {
            self.disable_collecting_distributing(actor, servicer);
        }
        timers.cancel(self.port, TimerKind::AggregateWait);
        signals.push(Signal::Ntt);
    }

    fn collecting_distributing(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        servicer: &dyn LacpServicer,
    ) {
        self.transition(MuxState::CollectingDistributing);
        // DISTRIBUTING is advertised before forwarding is actually enabled,
        // COLLECTING only after, so the partner never sends into a port
        // that silently drops.
        actor.state.insert(LacpState::DISTRIBUTING);
        servicer.program_forwarding(self.port, self.aggregate, Forwarding::Enabled);
        actor.state.insert(LacpState::COLLECTING);
        signals.push(Signal::Ntt);
    }

    fn disable_collecting_distributing(
        &mut self,
        actor: &mut ParticipantInfo,
        servicer: &dyn LacpServicer,
    ) {
        actor.state.remove(LacpState::COLLECTING);
        servicer.program_forwarding(self.port, self.aggregate, Forwarding::Disabled);
        actor.state.remove(LacpState::DISTRIBUTING);
    }

    fn transition(&mut self, to: MuxState) {
        debug!(port = %self.port, from = %self.state, to = %to, "mux machine transition");
        self.state = to;
    }
}

/// State transform flipping one member's forwarding bit. A no-op if the
/// aggregate or the membership has gone away by the time it runs, or if the
/// bit already has the target value.
#[derive(Debug, Clone, Copy)]
pub struct ProgramForwardingState {
    port: PortId,
    aggregate: AggregatePortId,
    target: Forwarding,
}

impl ProgramForwardingState {
    pub fn new(port: PortId, aggregate: AggregatePortId, target: Forwarding) -> Self {
        ProgramForwardingState {
            port,
            aggregate,
            target,
        }
    }

    pub fn apply(self, state: &Arc<SwitchState>) -> Option<Arc<SwitchState>> {
        let mut next = state.clone();
        let aggregate = AggregatePort::modify(self.aggregate, &mut next)?;
        let current = aggregate.forwarding_state(self.port)?;
        if current == self.target {
            return None;
        }
        debug!(
            port = %self.port,
            aggregate = %self.aggregate,
            target = ?self.target,
            "programming member forwarding"
        );
        aggregate.set_forwarding_state(self.port, self.target);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servicer::testing::RecordingServicer;
    use crate::machines::testing::RecordingScheduler;
    use pretty_assertions::assert_eq;

    fn harness() -> (
        MuxMachine,
        ParticipantInfo,
        RecordingScheduler,
        RecordingServicer,
    ) {
        (
            MuxMachine::new(PortId(1), AggregatePortId(10)),
            ParticipantInfo::default(),
            RecordingScheduler::default(),
            RecordingServicer::default(),
        )
    }

    #[test]
    fn selection_walks_through_waiting_into_forwarding() {
        let (mut mux, mut actor, mut timers, servicer) = harness();
        let mut signals = Vec::new();

        mux.selected(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::Waiting);
        assert_eq!(
            timers.last_armed(TimerKind::AggregateWait),
            Some(AGGREGATE_WAIT)
        );

        mux.matched(&mut actor, &mut signals, &servicer);
        mux.timeout_expired(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::CollectingDistributing);
        assert!(actor.state.contains(LacpState::IN_SYNC));
        assert!(actor.state.contains(LacpState::COLLECTING));
        assert!(actor.state.contains(LacpState::DISTRIBUTING));
        assert_eq!(
            servicer.last_forwarding(PortId(1)),
            Some(Forwarding::Enabled)
        );
        assert!(signals.contains(&Signal::Ntt));
    }

    #[test]
    fn matched_before_attach_is_remembered() {
        let (mut mux, mut actor, mut timers, servicer) = harness();
        let mut signals = Vec::new();

        mux.matched(&mut actor, &mut signals, &servicer);
        mux.selected(&mut actor, &mut signals, &mut timers, &servicer);
        mux.timeout_expired(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::CollectingDistributing);
    }

    #[test]
    fn not_matched_stops_forwarding_but_stays_attached() {
        let (mut mux, mut actor, mut timers, servicer) = harness();
        let mut signals = Vec::new();
        mux.matched(&mut actor, &mut signals, &servicer);
        mux.selected(&mut actor, &mut signals, &mut timers, &servicer);
        mux.timeout_expired(&mut actor, &mut signals, &mut timers, &servicer);

        mux.not_matched(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::Attached);
        assert!(!actor.state.contains(LacpState::COLLECTING));
        assert!(!actor.state.contains(LacpState::DISTRIBUTING));
        assert_eq!(
            servicer.last_forwarding(PortId(1)),
            Some(Forwarding::Disabled)
        );
    }

    #[test]
    fn standby_detaches_an_attached_port() {
        let (mut mux, mut actor, mut timers, servicer) = harness();
        let mut signals = Vec::new();
        mux.selected(&mut actor, &mut signals, &mut timers, &servicer);
        mux.timeout_expired(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::Attached);

        mux.standby(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::Detached);
        assert!(!actor.state.contains(LacpState::IN_SYNC));
    }

    #[test]
    fn stale_wait_timer_is_ignored() {
        let (mut mux, mut actor, mut timers, servicer) = harness();
        let mut signals = Vec::new();
        mux.timeout_expired(&mut actor, &mut signals, &mut timers, &servicer);
        assert_eq!(mux.state(), MuxState::Detached);
        assert!(signals.is_empty());
    }

    #[test]
    fn forwarding_transform_round_trip() {
        use std::sync::Arc;
        use switchd_state::Node;

        let mut root = Arc::new(SwitchState::new());
        {
            let state = SwitchState::modify(&mut root);
            let mut agg = AggregatePort::new(
                AggregatePortId(10),
                "po10",
                32768,
                switchd_types::MacAddress::from_u64(0x02),
                1,
            );
            agg.add_member(PortId(1));
            state.aggregate_ports_mut().insert(AggregatePortId(10), Arc::new(agg));
        }
        root.publish();

        let enable =
            ProgramForwardingState::new(PortId(1), AggregatePortId(10), Forwarding::Enabled);
        let next = enable.apply(&root).expect("state should change");
        assert_eq!(
            next.aggregate_ports()
                .get(&AggregatePortId(10))
                .unwrap()
                .forwarding_state(PortId(1)),
            Some(Forwarding::Enabled)
        );
        // Old root untouched.
        assert_eq!(
            root.aggregate_ports()
                .get(&AggregatePortId(10))
                .unwrap()
                .forwarding_state(PortId(1)),
            Some(Forwarding::Disabled)
        );

        // Idempotent and membership-safe.
        next.publish();
        assert!(enable.apply(&next).is_none());
        let missing =
            ProgramForwardingState::new(PortId(9), AggregatePortId(10), Forwarding::Enabled);
        assert!(missing.apply(&next).is_none());
    }
}
