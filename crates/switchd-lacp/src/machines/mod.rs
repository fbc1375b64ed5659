//! The four per-port LACP state machines.
//!
//! Each machine is a plain synchronous struct. Timers and cross-machine
//! effects are externalized: machines ask a [`Scheduler`] to arm or disarm
//! named timers and push [`Signal`]s into an outbox, which the controller
//! routes. This keeps every transition deterministic and directly testable.

mod mux;
mod periodic;
mod rx;
mod tx;

pub use mux::{MuxMachine, MuxState, ProgramForwardingState};
pub use periodic::{PeriodicState, PeriodicTransmissionMachine};
pub use rx::{ReceiveMachine, ReceiveState};
pub use tx::TransmitMachine;

use std::time::Duration;
use switchd_types::PortId;

/// The timers the machines multiplex through one shared delay queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Partner freshness window (receive machine).
    RxEpoch,
    /// Next periodic transmission.
    Periodic,
    /// Transmit rate limiter token refill.
    TxReplenish,
    /// Mux WAITING dwell before attaching to the aggregator.
    AggregateWait,
}

/// Timer surface the machines program against. At most one timer per
/// (port, kind) pair is armed at a time; scheduling replaces any pending
/// instance.
pub trait Scheduler {
    fn schedule(&mut self, port: PortId, kind: TimerKind, after: Duration);
    fn cancel(&mut self, port: PortId, kind: TimerKind);
}

/// Signals the machines raise for the controller to route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Partner information changed; run aggregate selection for this port.
    Select,
    /// The recorded partner no longer stands; tear down this port's
    /// selection and detach.
    Unselected,
    /// The partner's view of us agrees with ours and it is in sync.
    Matched,
    /// The partner fell out of sync or disagrees about us.
    NotMatched,
    /// Need To Transmit: send an LACPDU, subject to the rate limiter.
    Ntt,
    /// Activity or timeout parameters changed; recompute the periodic rate.
    RestartPeriodic,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Scheduler, TimerKind};
    use std::time::Duration;
    use switchd_types::PortId;

    /// Records schedule/cancel calls for assertions; nothing ever fires by
    /// itself, tests deliver expirations by hand.
    #[derive(Default)]
    pub struct RecordingScheduler {
        pub armed: Vec<(PortId, TimerKind, Duration)>,
        pub canceled: Vec<(PortId, TimerKind)>,
    }

    impl RecordingScheduler {
        pub fn last_armed(&self, kind: TimerKind) -> Option<Duration> {
            self.armed
                .iter()
                .rev()
                .find(|(_, k, _)| *k == kind)
                .map(|(_, _, d)| *d)
        }
    }

    impl Scheduler for RecordingScheduler {
        fn schedule(&mut self, port: PortId, kind: TimerKind, after: Duration) {
            self.armed.push((port, kind, after));
        }

        fn cancel(&mut self, port: PortId, kind: TimerKind) {
            self.canceled.push((port, kind));
        }
    }
}
