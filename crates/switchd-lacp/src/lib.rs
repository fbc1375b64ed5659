//! Link aggregation (LACP, IEEE 802.1AX) for switchd.
//!
//! Four per-port state machines (receive, periodic transmission, transmit
//! rate limiting and mux) cooperate under a per-port
//! [`controller::LacpController`]. A single
//! [`manager::LinkAggregationManager`] task owns every controller plus the
//! shared [`selector::Selector`] and all protocol timers, so the whole
//! ensemble runs without locks. Forwarding decisions land in the switch
//! state tree as copy-on-write transforms.

pub mod controller;
pub mod error;
pub mod machines;
pub mod manager;
pub mod pdu;
pub mod selector;
pub mod servicer;
pub mod types;

pub use controller::{LacpActivity, LacpController, LacpRate, PortConfig};
pub use error::{LacpError, Result};
pub use machines::{MuxState, PeriodicState, ReceiveState, Signal, TimerKind};
pub use manager::{LagHandle, LinkAggregationManager};
pub use pdu::{Lacpdu, ETHERTYPE_SLOW_PROTOCOLS, SLOW_PROTOCOLS_DST_MAC};
pub use selector::{SelectionSignal, SelectionState, Selector};
pub use servicer::{LacpServicer, OutboundFrame, SwitchServicer};
pub use types::{LacpState, LagId, ParticipantInfo};
