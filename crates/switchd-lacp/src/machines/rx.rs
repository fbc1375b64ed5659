//! LACP receive machine.
//!
//! Owns the partner record: every inbound LACPDU is folded into it here, and
//! freshness is enforced with the epoch timer. One expiry degrades a CURRENT
//! partner to EXPIRED; a second falls back to the administrative defaults
//! (DEFAULTED). The machine also decides whether the exchange is "matched",
//! which is what ultimately gates the mux machine into forwarding.

use super::{Scheduler, Signal, TimerKind};
use crate::pdu::Lacpdu;
use crate::types::{LacpState, ParticipantInfo, FAST_EPOCH, SLOW_EPOCH};
use std::fmt;
use std::time::Duration;
use switchd_types::PortId;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveState {
    Initialized,
    Expired,
    Defaulted,
    Current,
    Disabled,
}

impl fmt::Display for ReceiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiveState::Initialized => "INITIALIZED",
            ReceiveState::Expired => "EXPIRED",
            ReceiveState::Defaulted => "DEFAULTED",
            ReceiveState::Current => "CURRENT",
            ReceiveState::Disabled => "DISABLED",
        };
        f.write_str(name)
    }
}

pub struct ReceiveMachine {
    port: PortId,
    state: ReceiveState,
    partner_info: ParticipantInfo,
}

impl ReceiveMachine {
    pub fn new(port: PortId) -> Self {
        ReceiveMachine {
            port,
            state: ReceiveState::Initialized,
            partner_info: ParticipantInfo::default(),
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// The partner as currently recorded (administrative defaults until the
    /// first PDU arrives or after falling back to DEFAULTED).
    pub fn partner_info(&self) -> ParticipantInfo {
        self.partner_info
    }

    pub fn start(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        signals.push(Signal::Unselected);
        self.record_default(actor);
        actor.state.remove(LacpState::EXPIRED);
        self.disabled(actor, signals, timers);
    }

    /// Link came up. Only legal while DISABLED; anything else is a machine
    /// bug, not a peer behavior, so it aborts.
    pub fn port_up(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        assert!(
            self.state == ReceiveState::Disabled,
            "receive machine for {}: port up in {} state",
            self.port,
            self.state
        );
        self.expired(actor, signals, timers);
    }

    pub fn port_down(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        self.disabled(actor, signals, timers);
    }

    pub fn rx(
        &mut self,
        pdu: &Lacpdu,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        if self.state == ReceiveState::Disabled {
            debug!(port = %self.port, "ignoring LACPDU while disabled");
            return;
        }
        self.current(pdu, actor, signals, timers);
    }

    /// Epoch timer fired: the partner record went stale.
    pub fn timeout_expired(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        match self.state {
            ReceiveState::Current => self.expired(actor, signals, timers),
            ReceiveState::Expired => self.defaulted(actor, signals),
            state => panic!(
                "receive machine for {}: epoch timer fired in {state} state",
                self.port
            ),
        }
    }

    fn current(
        &mut self,
        pdu: &Lacpdu,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        self.transition(ReceiveState::Current);

        self.update_selected(pdu, signals);
        let ntt = pdu.partner_info != *actor;
        let activity_changed = (pdu.actor_info.state & LacpState::ACTIVE)
            != (self.partner_info.state & LacpState::ACTIVE);

        self.record_pdu(pdu, actor, signals);
        actor.state.remove(LacpState::EXPIRED);

        signals.push(Signal::Select);
        if ntt {
            signals.push(Signal::Ntt);
        }
        if activity_changed {
            signals.push(Signal::RestartPeriodic);
        }

        timers.schedule(self.port, TimerKind::RxEpoch, Self::epoch_duration(actor));
    }

    fn expired(
        &mut self,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        self.transition(ReceiveState::Expired);
        // Ask the partner for fast refreshes while we wait for it to
        // reappear.
        self.partner_info.state.insert(LacpState::SHORT_TIMEOUT);
        self.partner_info.state.remove(LacpState::IN_SYNC);
        signals.push(Signal::NotMatched);
        actor.state.insert(LacpState::EXPIRED);
        timers.schedule(self.port, TimerKind::RxEpoch, FAST_EPOCH);
    }

    fn defaulted(&mut self, actor: &mut ParticipantInfo, signals: &mut Vec<Signal>) {
        self.transition(ReceiveState::Defaulted);
        if ParticipantInfo::default() != self.partner_info {
            signals.push(Signal::Unselected);
        }
        // The mismatch was already signaled on the way through EXPIRED;
        // falling back to the administrative defaults only records them.
        self.record_default(actor);
        actor.state.remove(LacpState::EXPIRED);
    }

    fn disabled(
        &mut self,
        _actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
        timers: &mut dyn Scheduler,
    ) {
        timers.cancel(self.port, TimerKind::RxEpoch);
        self.transition(ReceiveState::Disabled);
        self.partner_info.state.remove(LacpState::IN_SYNC);
        signals.push(Signal::NotMatched);
    }

    /// The partner described in this PDU differs from the recorded one in a
    /// way that invalidates the current selection.
    fn update_selected(&self, pdu: &Lacpdu, signals: &mut Vec<Signal>) {
        if !pdu.actor_info.selection_compatible(&self.partner_info) {
            debug!(
                port = %self.port,
                old = %self.partner_info,
                new = %pdu.actor_info,
                "partner changed, unselecting"
            );
            signals.push(Signal::Unselected);
        }
    }

    fn record_pdu(
        &mut self,
        pdu: &Lacpdu,
        actor: &mut ParticipantInfo,
        signals: &mut Vec<Signal>,
    ) {
        // Matched: the partner sees us as we are (or is an individual link)
        // and believes the exchange is in sync.
        let agrees_about_us = pdu.partner_info == *actor
            || !pdu.actor_info.state.contains(LacpState::AGGREGATABLE);

        self.partner_info = pdu.actor_info;
        actor.state.remove(LacpState::DEFAULTED);

        if agrees_about_us && pdu.actor_info.state.contains(LacpState::IN_SYNC) {
            self.partner_info.state.insert(LacpState::IN_SYNC);
            signals.push(Signal::Matched);
        } else {
            self.partner_info.state.remove(LacpState::IN_SYNC);
            signals.push(Signal::NotMatched);
        }
    }

    fn record_default(&mut self, actor: &mut ParticipantInfo) {
        self.partner_info = ParticipantInfo::default();
        actor.state.insert(LacpState::DEFAULTED);
    }

    fn epoch_duration(actor: &ParticipantInfo) -> Duration {
        if actor.state.contains(LacpState::SHORT_TIMEOUT) {
            FAST_EPOCH
        } else {
            SLOW_EPOCH
        }
    }

    fn transition(&mut self, to: ReceiveState) {
        debug!(port = %self.port, from = %self.state, to = %to, "receive machine transition");
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::testing::RecordingScheduler;
    use pretty_assertions::assert_eq;
    use switchd_types::MacAddress;

    fn actor() -> ParticipantInfo {
        ParticipantInfo {
            system_priority: 32768,
            system_id: MacAddress::from_u64(0x02_00_00_00_00_01),
            key: 1,
            port_priority: 32768,
            port: 1,
            state: LacpState::ACTIVE | LacpState::SHORT_TIMEOUT | LacpState::AGGREGATABLE,
        }
    }

    fn partner() -> ParticipantInfo {
        ParticipantInfo {
            system_priority: 32768,
            system_id: MacAddress::from_u64(0x02_00_00_00_00_02),
            key: 2,
            port_priority: 32768,
            port: 7,
            state: LacpState::ACTIVE | LacpState::AGGREGATABLE | LacpState::IN_SYNC,
        }
    }

    fn started_up() -> (ReceiveMachine, ParticipantInfo, RecordingScheduler) {
        let mut machine = ReceiveMachine::new(PortId(1));
        let mut actor = actor();
        let mut timers = RecordingScheduler::default();
        let mut signals = Vec::new();
        machine.start(&mut actor, &mut signals, &mut timers);
        machine.port_up(&mut actor, &mut signals, &mut timers);
        (machine, actor, timers)
    }

    #[test]
    fn matched_pdu_records_partner_and_signals() {
        let (mut machine, mut actor, mut timers) = started_up();

        // Partner that sees us exactly and is in sync.
        let pdu = Lacpdu::new(partner(), actor);
        let mut signals = Vec::new();
        machine.rx(&pdu, &mut actor, &mut signals, &mut timers);

        assert_eq!(machine.state(), ReceiveState::Current);
        assert!(signals.contains(&Signal::Matched));
        assert!(signals.contains(&Signal::Select));
        assert!(machine.partner_info().state.contains(LacpState::IN_SYNC));
        assert!(!actor.state.contains(LacpState::EXPIRED));
        // Actor advertises the short timeout, so the fast epoch applies.
        assert_eq!(timers.last_armed(TimerKind::RxEpoch), Some(FAST_EPOCH));
    }

    #[test]
    fn mismatched_partner_view_is_not_matched() {
        let (mut machine, mut actor, mut timers) = started_up();

        // Partner reports a stale view of us.
        let mut stale_view = actor;
        stale_view.port = 99;
        let pdu = Lacpdu::new(partner(), stale_view);
        let mut signals = Vec::new();
        machine.rx(&pdu, &mut actor, &mut signals, &mut timers);

        assert!(signals.contains(&Signal::NotMatched));
        assert!(!machine.partner_info().state.contains(LacpState::IN_SYNC));
    }

    #[test]
    fn individual_link_matches_without_agreement() {
        let (mut machine, mut actor, mut timers) = started_up();

        let mut individual = partner();
        individual.state.remove(LacpState::AGGREGATABLE);
        let pdu = Lacpdu::new(individual, ParticipantInfo::default());
        let mut signals = Vec::new();
        machine.rx(&pdu, &mut actor, &mut signals, &mut timers);

        assert!(signals.contains(&Signal::Matched));
    }

    #[test]
    fn expiry_degrades_current_to_expired_then_defaulted() {
        let (mut machine, mut actor, mut timers) = started_up();

        let pdu = Lacpdu::new(partner(), actor);
        machine.rx(&pdu, &mut actor, &mut Vec::new(), &mut timers);
        assert_eq!(machine.state(), ReceiveState::Current);

        let mut signals = Vec::new();
        machine.timeout_expired(&mut actor, &mut signals, &mut timers);
        assert_eq!(machine.state(), ReceiveState::Expired);
        assert!(actor.state.contains(LacpState::EXPIRED));
        assert!(signals.contains(&Signal::NotMatched));
        // The expired partner record asks for fast refreshes.
        assert!(machine
            .partner_info()
            .state
            .contains(LacpState::SHORT_TIMEOUT));

        let mut signals = Vec::new();
        machine.timeout_expired(&mut actor, &mut signals, &mut timers);
        assert_eq!(machine.state(), ReceiveState::Defaulted);
        assert_eq!(machine.partner_info(), ParticipantInfo::default());
        assert!(actor.state.contains(LacpState::DEFAULTED));
        // Falling back to defaults invalidates the selection but does not
        // repeat the mismatch already raised by the EXPIRED transition.
        assert_eq!(signals, vec![Signal::Unselected]);
    }

    #[test]
    #[should_panic(expected = "epoch timer fired")]
    fn expiry_in_defaulted_state_aborts() {
        let (mut machine, mut actor, mut timers) = started_up();
        let pdu = Lacpdu::new(partner(), actor);
        machine.rx(&pdu, &mut actor, &mut Vec::new(), &mut timers);
        machine.timeout_expired(&mut actor, &mut Vec::new(), &mut timers);
        machine.timeout_expired(&mut actor, &mut Vec::new(), &mut timers);
        // Now DEFAULTED; a third expiry is impossible unless the timer
        // bookkeeping is broken.
        machine.timeout_expired(&mut actor, &mut Vec::new(), &mut timers);
    }

    #[test]
    fn pdus_are_ignored_while_disabled() {
        let mut machine = ReceiveMachine::new(PortId(1));
        let mut actor = actor();
        let mut timers = RecordingScheduler::default();
        machine.start(&mut actor, &mut Vec::new(), &mut timers);

        let pdu = Lacpdu::new(partner(), actor);
        let mut signals = Vec::new();
        machine.rx(&pdu, &mut actor, &mut signals, &mut timers);
        assert_eq!(machine.state(), ReceiveState::Disabled);
        assert!(signals.is_empty());
    }

    #[test]
    fn partner_change_unselects() {
        let (mut machine, mut actor, mut timers) = started_up();

        let pdu = Lacpdu::new(partner(), actor);
        machine.rx(&pdu, &mut actor, &mut Vec::new(), &mut timers);

        // Same system, different key: the selection no longer stands.
        let mut changed = partner();
        changed.key = 3;
        let pdu = Lacpdu::new(changed, actor);
        let mut signals = Vec::new();
        machine.rx(&pdu, &mut actor, &mut signals, &mut timers);
        assert!(signals.contains(&Signal::Unselected));
    }
}
