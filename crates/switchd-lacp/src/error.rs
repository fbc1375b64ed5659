//! Error types for the LACP subsystem.

use thiserror::Error;

/// Errors that can occur in the LACP subsystem.
///
/// Parse errors cover malformed inbound frames; they are logged and the
/// frame is dropped, never escalated. Illegal state-machine transitions are
/// *not* modeled here: those are invariant violations that abort the
/// process (see the machine modules).
#[derive(Debug, Error)]
pub enum LacpError {
    #[error("LACPDU too short: {0} bytes (need {expected})", expected = crate::pdu::Lacpdu::LENGTH)]
    PduTooShort(usize),

    #[error("unexpected slow-protocols subtype {0:#04x}")]
    BadSubtype(u8),

    #[error("malformed TLV: expected type {expected_type:#04x} length {expected_len:#04x}, got type {got_type:#04x} length {got_len:#04x}")]
    BadTlv {
        expected_type: u8,
        expected_len: u8,
        got_type: u8,
        got_len: u8,
    },

    #[error("link aggregation manager has shut down")]
    ShutDown,
}

/// Result type alias for LACP operations.
pub type Result<T> = std::result::Result<T, LacpError>;
