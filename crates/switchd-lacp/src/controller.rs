//! Per-port LACP controller.
//!
//! Owns the four machines for one member port and routes the signals they
//! raise: selection requests go to the shared [`Selector`], match results to
//! the mux machine, NTT to the transmit machine. Signals addressed to other
//! ports (batch promotions, demotions) are returned to the caller, which is
//! the manager task that owns every controller.

use crate::machines::{
    MuxMachine, PeriodicTransmissionMachine, ReceiveMachine, Scheduler, Signal, TimerKind,
    TransmitMachine,
};
use crate::pdu::Lacpdu;
use crate::selector::{SelectionSignal, Selector};
use crate::servicer::LacpServicer;
use crate::types::{LacpState, ParticipantInfo};
use switchd_types::{AggregatePortId, MacAddress, PortId};

/// LACPDU exchange cadence requested from the partner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LacpRate {
    #[default]
    Slow,
    Fast,
}

/// Whether this side sends periodic LACPDUs unprompted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LacpActivity {
    #[default]
    Active,
    Passive,
}

/// Static per-port LACP configuration.
#[derive(Clone, Debug)]
pub struct PortConfig {
    pub port: PortId,
    pub aggregate: AggregatePortId,
    pub system_priority: u16,
    pub system_id: MacAddress,
    pub port_priority: u16,
    pub min_link_count: u8,
    pub rate: LacpRate,
    pub activity: LacpActivity,
}

impl PortConfig {
    fn base_actor_state(&self) -> LacpState {
        let mut state = LacpState::AGGREGATABLE;
        if self.activity == LacpActivity::Active {
            state |= LacpState::ACTIVE;
        }
        if self.rate == LacpRate::Fast {
            state |= LacpState::SHORT_TIMEOUT;
        }
        state
    }
}

/// Shared collaborators a controller call runs against, all owned by the
/// manager task.
pub struct LacpContext<'a> {
    pub selector: &'a mut Selector,
    pub timers: &'a mut dyn Scheduler,
    pub servicer: &'a dyn LacpServicer,
}

/// Selection verdicts addressed to (possibly other) ports, to be routed by
/// the manager.
pub type PeerSignals = Vec<(PortId, SelectionSignal)>;

pub struct LacpController {
    config: PortConfig,
    actor_info: ParticipantInfo,
    rx: ReceiveMachine,
    periodic: PeriodicTransmissionMachine,
    tx: TransmitMachine,
    mux: MuxMachine,
}

impl LacpController {
    pub fn new(config: PortConfig) -> Self {
        let actor_info = ParticipantInfo {
            system_priority: config.system_priority,
            system_id: config.system_id,
            key: config.aggregate.raw(),
            port_priority: config.port_priority,
            port: config.port.raw(),
            state: config.base_actor_state(),
        };
        LacpController {
            rx: ReceiveMachine::new(config.port),
            periodic: PeriodicTransmissionMachine::new(config.port),
            tx: TransmitMachine::new(config.port),
            mux: MuxMachine::new(config.port, config.aggregate),
            actor_info,
            config,
        }
    }

    pub fn port(&self) -> PortId {
        self.config.port
    }

    pub fn aggregate(&self) -> AggregatePortId {
        self.config.aggregate
    }

    pub fn actor_info(&self) -> ParticipantInfo {
        self.actor_info
    }

    pub fn partner_info(&self) -> ParticipantInfo {
        self.rx.partner_info()
    }

    pub fn mux(&self) -> &MuxMachine {
        &self.mux
    }

    pub fn start(&mut self, ctx: &mut LacpContext<'_>) -> PeerSignals {
        self.tx.start(ctx.timers);
        let partner = self.rx.partner_info();
        self.periodic.start(&self.actor_info, &partner, ctx.timers);

        let mut signals = Vec::new();
        self.rx.start(&mut self.actor_info, &mut signals, ctx.timers);
        self.drain(signals, ctx)
    }

    /// Tears the port down and cancels every timer. The returned signals
    /// cover co-member demotions.
    pub fn stop(&mut self, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut signals = Vec::new();
        self.rx
            .port_down(&mut self.actor_info, &mut signals, ctx.timers);
        if ctx.selector.selection(self.config.port).is_some() {
            signals.push(Signal::Unselected);
        }
        let peers = self.drain(signals, ctx);

        self.periodic.stop(ctx.timers);
        self.tx.stop(ctx.timers);
        ctx.timers.cancel(self.config.port, TimerKind::AggregateWait);
        ctx.timers.cancel(self.config.port, TimerKind::RxEpoch);
        peers
    }

    pub fn port_up(&mut self, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut signals = Vec::new();
        self.rx
            .port_up(&mut self.actor_info, &mut signals, ctx.timers);
        let partner = self.rx.partner_info();
        self.periodic.start(&self.actor_info, &partner, ctx.timers);
        self.drain(signals, ctx)
    }

    pub fn port_down(&mut self, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut signals = Vec::new();
        self.rx
            .port_down(&mut self.actor_info, &mut signals, ctx.timers);
        if ctx.selector.selection(self.config.port).is_some() {
            signals.push(Signal::Unselected);
        }
        self.periodic.stop(ctx.timers);
        self.drain(signals, ctx)
    }

    pub fn received_pdu(&mut self, pdu: &Lacpdu, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut signals = Vec::new();
        self.rx
            .rx(pdu, &mut self.actor_info, &mut signals, ctx.timers);
        self.drain(signals, ctx)
    }

    pub fn timer_expired(&mut self, kind: TimerKind, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut signals = Vec::new();
        match kind {
            TimerKind::RxEpoch => {
                self.rx
                    .timeout_expired(&mut self.actor_info, &mut signals, ctx.timers);
            }
            TimerKind::Periodic => {
                let partner = self.rx.partner_info();
                self.periodic.timeout_expired(
                    &self.actor_info,
                    &partner,
                    &mut signals,
                    ctx.timers,
                );
            }
            TimerKind::TxReplenish => {
                self.tx.replenish(ctx.timers);
            }
            TimerKind::AggregateWait => {
                self.mux.timeout_expired(
                    &mut self.actor_info,
                    &mut signals,
                    ctx.timers,
                    ctx.servicer,
                );
            }
        }
        self.drain(signals, ctx)
    }

    /// Applies a selection verdict routed by the manager (possibly raised
    /// by a different port's selection pass).
    pub fn apply_selection(
        &mut self,
        signal: SelectionSignal,
        ctx: &mut LacpContext<'_>,
    ) -> PeerSignals {
        let mut signals = Vec::new();
        match signal {
            SelectionSignal::Selected => {
                ctx.selector.mark_selected(self.config.port);
                self.mux.selected(
                    &mut self.actor_info,
                    &mut signals,
                    ctx.timers,
                    ctx.servicer,
                );
            }
            SelectionSignal::Standby => {
                ctx.selector.mark_standby(self.config.port);
                self.mux.standby(
                    &mut self.actor_info,
                    &mut signals,
                    ctx.timers,
                    ctx.servicer,
                );
            }
        }
        self.drain(signals, ctx)
    }

    /// Routes machine signals until the queue settles; signals addressed to
    /// other ports are collected for the manager.
    fn drain(&mut self, mut queue: Vec<Signal>, ctx: &mut LacpContext<'_>) -> PeerSignals {
        let mut peers = Vec::new();
        let mut i = 0;
        while i < queue.len() {
            let signal = queue[i];
            i += 1;
            match signal {
                Signal::Select => {
                    let partner = self.rx.partner_info();
                    peers.extend(ctx.selector.select(
                        self.config.port,
                        &self.actor_info,
                        &partner,
                        self.config.aggregate,
                        self.config.min_link_count,
                    ));
                }
                Signal::Unselected => {
                    peers.extend(ctx.selector.unselected(self.config.port));
                    let mut more = Vec::new();
                    self.mux.unselected(
                        &mut self.actor_info,
                        &mut more,
                        ctx.timers,
                        ctx.servicer,
                    );
                    queue.extend(more);
                }
                Signal::Matched => {
                    let mut more = Vec::new();
                    self.mux
                        .matched(&mut self.actor_info, &mut more, ctx.servicer);
                    queue.extend(more);
                }
                Signal::NotMatched => {
                    let mut more = Vec::new();
                    self.mux.not_matched(
                        &mut self.actor_info,
                        &mut more,
                        ctx.timers,
                        ctx.servicer,
                    );
                    queue.extend(more);
                }
                Signal::RestartPeriodic => {
                    let partner = self.rx.partner_info();
                    self.periodic
                        .start(&self.actor_info, &partner, ctx.timers);
                }
                Signal::Ntt => self.transmit(ctx),
            }
        }
        peers
    }

    fn transmit(&mut self, ctx: &mut LacpContext<'_>) {
        let pdu = Lacpdu::new(self.actor_info, self.rx.partner_info());
        let src_mac = ctx.servicer.source_mac(self.config.port);
        let vlan = ctx.servicer.ingress_vlan(self.config.port);
        self.tx.ntt(pdu, src_mac, vlan, ctx.servicer);
    }
}
