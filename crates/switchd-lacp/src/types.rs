//! Core LACP protocol types.
//!
//! `LacpState` is the actor/partner state octet from the LACPDU, kept as a
//! transparent flag byte so it can round-trip the wire unchanged.
//! `ParticipantInfo` is the (system, key, port) tuple both sides exchange;
//! structural equality on it is what the receive machine's matched/selection
//! logic is built on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::time::Duration;
use switchd_types::MacAddress;

/// How long a CURRENT partner stays fresh when the *actor* advertises the
/// short timeout, and the interval the partner is expected to transmit at
/// in that mode.
pub const FAST_EPOCH: Duration = Duration::from_secs(3);
/// Freshness window under the long timeout.
pub const SLOW_EPOCH: Duration = Duration::from_secs(90);
/// Periodic transmission interval when the partner wants fast refreshes.
pub const SHORT_PERIOD: Duration = Duration::from_secs(1);
/// Periodic transmission interval under the long timeout.
pub const LONG_PERIOD: Duration = Duration::from_secs(30);
/// Token replenish interval for the transmit rate limiter.
pub const TX_REPLENISH_PERIOD: Duration = Duration::from_secs(1);
/// Maximum LACPDUs transmitted per replenish interval.
pub const MAX_TRANSMISSIONS_PER_PERIOD: u8 = 3;
/// Dwell time in the mux WAITING state before attaching to the aggregator.
pub const AGGREGATE_WAIT: Duration = Duration::from_secs(2);

/// The LACP state octet, one flag per bit as laid out on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LacpState(u8);

impl LacpState {
    pub const NONE: LacpState = LacpState(0);
    pub const ACTIVE: LacpState = LacpState(1 << 0);
    pub const SHORT_TIMEOUT: LacpState = LacpState(1 << 1);
    pub const AGGREGATABLE: LacpState = LacpState(1 << 2);
    pub const IN_SYNC: LacpState = LacpState(1 << 3);
    pub const COLLECTING: LacpState = LacpState(1 << 4);
    pub const DISTRIBUTING: LacpState = LacpState(1 << 5);
    pub const DEFAULTED: LacpState = LacpState(1 << 6);
    pub const EXPIRED: LacpState = LacpState(1 << 7);

    pub const fn from_bits(bits: u8) -> Self {
        LacpState(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: LacpState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: LacpState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LacpState) {
        self.0 &= !other.0;
    }
}

impl BitOr for LacpState {
    type Output = LacpState;
    fn bitor(self, rhs: LacpState) -> LacpState {
        LacpState(self.0 | rhs.0)
    }
}

impl BitOrAssign for LacpState {
    fn bitor_assign(&mut self, rhs: LacpState) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LacpState {
    type Output = LacpState;
    fn bitand(self, rhs: LacpState) -> LacpState {
        LacpState(self.0 & rhs.0)
    }
}

impl BitAndAssign for LacpState {
    fn bitand_assign(&mut self, rhs: LacpState) {
        self.0 &= rhs.0;
    }
}

impl Not for LacpState {
    type Output = LacpState;
    fn not(self) -> LacpState {
        LacpState(!self.0)
    }
}

impl fmt::Debug for LacpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(LacpState, &str); 8] = [
            (LacpState::ACTIVE, "ACTIVE"),
            (LacpState::SHORT_TIMEOUT, "SHORT_TIMEOUT"),
            (LacpState::AGGREGATABLE, "AGGREGATABLE"),
            (LacpState::IN_SYNC, "IN_SYNC"),
            (LacpState::COLLECTING, "COLLECTING"),
            (LacpState::DISTRIBUTING, "DISTRIBUTING"),
            (LacpState::DEFAULTED, "DEFAULTED"),
            (LacpState::EXPIRED, "EXPIRED"),
        ];
        if self.0 == 0 {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Display for LacpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One side's identity and state as carried in a LACPDU actor/partner TLV.
///
/// The all-zero default is significant: it is the administrative default
/// partner the receive machine assumes while DEFAULTED, and what the
/// partner TLV carries before the first PDU from the peer arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub system_priority: u16,
    pub system_id: MacAddress,
    pub key: u16,
    pub port_priority: u16,
    pub port: u16,
    pub state: LacpState,
}

impl ParticipantInfo {
    /// Whether `other` describes the same participant for selection
    /// purposes: identity fields plus the AGGREGATABLE bit, ignoring the
    /// rest of the state octet.
    pub fn selection_compatible(&self, other: &ParticipantInfo) -> bool {
        self.system_priority == other.system_priority
            && self.system_id == other.system_id
            && self.key == other.key
            && self.port_priority == other.port_priority
            && self.port == other.port
            && (self.state & LacpState::AGGREGATABLE) == (other.state & LacpState::AGGREGATABLE)
    }
}

impl fmt::Display for ParticipantInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(sys {}/{}, key {}, port {}/{}, state {})",
            self.system_priority, self.system_id, self.key, self.port_priority, self.port,
            self.state
        )
    }
}

/// Identity of a link aggregation group: the (priority, system, key)
/// triple of both participants. Ports attached to the same group carry
/// identical group ids, which is what the selection logic keys on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LagId {
    pub actor_system_priority: u16,
    pub actor_system_id: MacAddress,
    pub actor_key: u16,
    pub partner_system_priority: u16,
    pub partner_system_id: MacAddress,
    pub partner_key: u16,
}

impl LagId {
    pub fn new(actor: &ParticipantInfo, partner: &ParticipantInfo) -> Self {
        LagId {
            actor_system_priority: actor.system_priority,
            actor_system_id: actor.system_id,
            actor_key: actor.key,
            partner_system_priority: partner.system_priority,
            partner_system_id: partner.system_id,
            partner_key: partner.key,
        }
    }
}

impl fmt::Display for LagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[({}, {}, {}), ({}, {}, {})]",
            self.actor_system_priority,
            self.actor_system_id,
            self.actor_key,
            self.partner_system_priority,
            self.partner_system_id,
            self.partner_key
        )
    }
}
