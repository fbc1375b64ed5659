//! Common types for the switchd control plane.
//!
//! This crate provides type-safe representations of the primitives shared by
//! the state tree and the protocol subsystems:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`PortId`], [`AggregatePortId`], [`InterfaceId`]: switch entity identifiers
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod id;
mod mac;
mod vlan;

pub use id::{AggregatePortId, InterfaceId, PortId};
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
