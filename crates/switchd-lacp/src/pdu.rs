//! LACPDU wire format.
//!
//! The LACPDU is a fixed 110-octet layout: subtype, version, actor and
//! partner TLVs (type/length 0x01/0x14 and 0x02/0x14), the collector TLV
//! (0x03/0x10) and a terminator followed by 50 reserved octets. Serialization
//! always emits the full layout; parsing validates the TLV skeleton and
//! rejects anything malformed so a bad peer can never feed garbage into the
//! state machines.

use crate::error::{LacpError, Result};
use crate::types::{LacpState, ParticipantInfo};
use byteorder::{BigEndian, ByteOrder};
use switchd_types::{MacAddress, VlanId};

/// Destination of every LACPDU, the slow-protocols group address.
pub const SLOW_PROTOCOLS_DST_MAC: MacAddress =
    MacAddress::new([0x01, 0x80, 0xc2, 0x00, 0x00, 0x02]);

/// EtherType for slow protocols.
pub const ETHERTYPE_SLOW_PROTOCOLS: u16 = 0x8809;

/// Slow-protocols subtype identifying LACP.
pub const LACP_SUBTYPE: u8 = 0x01;

/// LACP protocol version transmitted in every PDU.
pub const LACP_VERSION: u8 = 0x01;

const TLV_TYPE_ACTOR: u8 = 0x01;
const TLV_TYPE_PARTNER: u8 = 0x02;
const TLV_TYPE_COLLECTOR: u8 = 0x03;
const TLV_TYPE_TERMINATOR: u8 = 0x00;
const TLV_LENGTH_PARTICIPANT: u8 = 0x14;
const TLV_LENGTH_COLLECTOR: u8 = 0x10;

const ACTOR_TLV_OFFSET: usize = 2;
const PARTNER_TLV_OFFSET: usize = 22;
const COLLECTOR_TLV_OFFSET: usize = 42;
const TERMINATOR_OFFSET: usize = 58;

/// A parsed or to-be-transmitted LACPDU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lacpdu {
    pub actor_info: ParticipantInfo,
    pub partner_info: ParticipantInfo,
    pub collector_max_delay: u16,
}

impl Lacpdu {
    /// Size of the LACPDU on the wire, from the subtype octet through the
    /// trailing reserved block.
    pub const LENGTH: usize = 110;

    pub fn new(actor_info: ParticipantInfo, partner_info: ParticipantInfo) -> Self {
        Lacpdu {
            actor_info,
            partner_info,
            collector_max_delay: 0,
        }
    }

    /// Serializes the full 110-octet PDU into `buf`, which must be at least
    /// [`Lacpdu::LENGTH`] bytes.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        buf[..Self::LENGTH].fill(0);
        buf[0] = LACP_SUBTYPE;
        buf[1] = LACP_VERSION;

        write_participant_tlv(
            &mut buf[ACTOR_TLV_OFFSET..],
            TLV_TYPE_ACTOR,
            &self.actor_info,
        );
        write_participant_tlv(
            &mut buf[PARTNER_TLV_OFFSET..],
            TLV_TYPE_PARTNER,
            &self.partner_info,
        );

        buf[COLLECTOR_TLV_OFFSET] = TLV_TYPE_COLLECTOR;
        buf[COLLECTOR_TLV_OFFSET + 1] = TLV_LENGTH_COLLECTOR;
        BigEndian::write_u16(
            &mut buf[COLLECTOR_TLV_OFFSET + 2..],
            self.collector_max_delay,
        );
        // Terminator TLV is type 0, length 0; it and the reserved tail are
        // already zeroed.
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LENGTH];
        self.serialize_into(&mut buf);
        buf
    }

    /// Parses a LACPDU from `data`, which starts at the slow-protocols
    /// subtype octet. Trailing padding beyond the PDU is ignored.
    pub fn parse(data: &[u8]) -> Result<Lacpdu> {
        if data.len() < Self::LENGTH {
            return Err(LacpError::PduTooShort(data.len()));
        }
        if data[0] != LACP_SUBTYPE {
            return Err(LacpError::BadSubtype(data[0]));
        }

        let actor_info =
            read_participant_tlv(&data[ACTOR_TLV_OFFSET..], TLV_TYPE_ACTOR)?;
        let partner_info =
            read_participant_tlv(&data[PARTNER_TLV_OFFSET..], TLV_TYPE_PARTNER)?;

        expect_tlv_header(
            &data[COLLECTOR_TLV_OFFSET..],
            TLV_TYPE_COLLECTOR,
            TLV_LENGTH_COLLECTOR,
        )?;
        let collector_max_delay = BigEndian::read_u16(&data[COLLECTOR_TLV_OFFSET + 2..]);

        expect_tlv_header(&data[TERMINATOR_OFFSET..], TLV_TYPE_TERMINATOR, 0)?;

        Ok(Lacpdu {
            actor_info,
            partner_info,
            collector_max_delay,
        })
    }
}

fn write_participant_tlv(buf: &mut [u8], tlv_type: u8, info: &ParticipantInfo) {
    buf[0] = tlv_type;
    buf[1] = TLV_LENGTH_PARTICIPANT;
    BigEndian::write_u16(&mut buf[2..], info.system_priority);
    buf[4..10].copy_from_slice(info.system_id.as_bytes());
    BigEndian::write_u16(&mut buf[10..], info.key);
    BigEndian::write_u16(&mut buf[12..], info.port_priority);
    BigEndian::write_u16(&mut buf[14..], info.port);
    buf[16] = info.state.bits();
    // 3 reserved octets follow, already zeroed.
}

fn read_participant_tlv(buf: &[u8], tlv_type: u8) -> Result<ParticipantInfo> {
    expect_tlv_header(buf, tlv_type, TLV_LENGTH_PARTICIPANT)?;
    let mut system_id = [0u8; 6];
    system_id.copy_from_slice(&buf[4..10]);
    Ok(ParticipantInfo {
        system_priority: BigEndian::read_u16(&buf[2..]),
        system_id: MacAddress::new(system_id),
        key: BigEndian::read_u16(&buf[10..]),
        port_priority: BigEndian::read_u16(&buf[12..]),
        port: BigEndian::read_u16(&buf[14..]),
        state: LacpState::from_bits(buf[16]),
    })
}

fn expect_tlv_header(buf: &[u8], tlv_type: u8, tlv_len: u8) -> Result<()> {
    if buf[0] != tlv_type || buf[1] != tlv_len {
        return Err(LacpError::BadTlv {
            expected_type: tlv_type,
            expected_len: tlv_len,
            got_type: buf[0],
            got_len: buf[1],
        });
    }
    Ok(())
}

/// VLAN-tagged Ethernet header length for an outbound LACPDU frame.
pub const ETHERNET_HEADER_LENGTH: usize = 18;
/// Total outbound frame length: tagged header plus PDU.
pub const FRAME_LENGTH: usize = ETHERNET_HEADER_LENGTH + Lacpdu::LENGTH;

/// Writes a VLAN-tagged Ethernet header addressed to the slow-protocols
/// group into the front of `buf`.
pub fn write_ethernet_header(buf: &mut [u8], src_mac: MacAddress, vlan: VlanId) {
    buf[0..6].copy_from_slice(SLOW_PROTOCOLS_DST_MAC.as_bytes());
    buf[6..12].copy_from_slice(src_mac.as_bytes());
    BigEndian::write_u16(&mut buf[12..], 0x8100);
    BigEndian::write_u16(&mut buf[14..], vlan.as_u16());
    BigEndian::write_u16(&mut buf[16..], ETHERTYPE_SLOW_PROTOCOLS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pdu() -> Lacpdu {
        let actor_info = ParticipantInfo {
            system_priority: 32768,
            system_id: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            key: 10,
            port_priority: 32768,
            port: 5,
            state: LacpState::ACTIVE
                | LacpState::SHORT_TIMEOUT
                | LacpState::AGGREGATABLE
                | LacpState::IN_SYNC,
        };
        let partner_info = ParticipantInfo {
            system_priority: 4096,
            system_id: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            key: 20,
            port_priority: 128,
            port: 17,
            state: LacpState::ACTIVE | LacpState::AGGREGATABLE,
        };
        Lacpdu::new(actor_info, partner_info)
    }

    #[test]
    fn serialized_layout_is_byte_exact() {
        let pdu = sample_pdu();
        let bytes = pdu.serialize();
        assert_eq!(bytes.len(), Lacpdu::LENGTH);

        assert_eq!(bytes[0], 0x01); // subtype
        assert_eq!(bytes[1], 0x01); // version
        assert_eq!(&bytes[2..4], &[0x01, 0x14]); // actor TLV header
        assert_eq!(&bytes[4..6], &[0x80, 0x00]); // actor system priority
        assert_eq!(&bytes[6..12], &[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&bytes[12..14], &[0x00, 0x0a]); // actor key
        assert_eq!(&bytes[16..18], &[0x00, 0x05]); // actor port
        assert_eq!(bytes[18], 0b0000_1111); // actor state octet
        assert_eq!(&bytes[19..22], &[0, 0, 0]); // reserved
        assert_eq!(&bytes[22..24], &[0x02, 0x14]); // partner TLV header
        assert_eq!(&bytes[42..44], &[0x03, 0x10]); // collector TLV header
        assert_eq!(&bytes[44..46], &[0x00, 0x00]); // collector max delay
        assert_eq!(&bytes[58..60], &[0x00, 0x00]); // terminator
        assert!(bytes[60..110].iter().all(|&b| b == 0));
    }

    #[test]
    fn parse_round_trips() {
        let pdu = sample_pdu();
        let parsed = Lacpdu::parse(&pdu.serialize()).unwrap();
        assert_eq!(parsed, pdu);
    }

    #[test]
    fn parse_tolerates_trailing_padding() {
        let mut bytes = sample_pdu().serialize();
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(Lacpdu::parse(&bytes).is_ok());
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let bytes = sample_pdu().serialize();
        assert!(matches!(
            Lacpdu::parse(&bytes[..60]),
            Err(LacpError::PduTooShort(60))
        ));
    }

    #[test]
    fn parse_rejects_foreign_subtype() {
        let mut bytes = sample_pdu().serialize();
        bytes[0] = 0x02; // marker PDU
        assert!(matches!(
            Lacpdu::parse(&bytes),
            Err(LacpError::BadSubtype(0x02))
        ));
    }

    #[test]
    fn parse_rejects_mangled_tlv() {
        let mut bytes = sample_pdu().serialize();
        bytes[23] = 0x15; // partner TLV length
        let err = Lacpdu::parse(&bytes).unwrap_err();
        assert!(matches!(err, LacpError::BadTlv { got_len: 0x15, .. }));
    }

    #[test]
    fn ethernet_header_addresses_slow_protocols_group() {
        let mut frame = vec![0u8; FRAME_LENGTH];
        write_ethernet_header(
            &mut frame,
            MacAddress::new([0x02, 0, 0, 0, 0, 0x01]),
            VlanId::new(4094).unwrap(),
        );
        assert_eq!(&frame[0..6], &[0x01, 0x80, 0xc2, 0x00, 0x00, 0x02]);
        assert_eq!(&frame[12..14], &[0x81, 0x00]);
        assert_eq!(&frame[14..16], &[0x0f, 0xfe]);
        assert_eq!(&frame[16..18], &[0x88, 0x09]);
    }
}
