//! Advertising channel PDU construction.
//!
//! This controller only ever emits `ADV_IND`-shaped PDUs: the advertising type configured via
//! `LE Set Advertising Parameters` is accepted and stored, but the PDU header byte transmitted
//! on air is always `0x00`, regardless of the configured type. Kept as-is rather than "fixed",
//! since downstream timing/byte-layout tests are written against it (see DESIGN.md).

use super::device_address::DeviceAddress;
use byteorder::{ByteOrder, LittleEndian};

/// Maximum advertising/scan-response data length, in octets.
pub const MAX_AD_DATA_LEN: usize = 31;

/// Builds the on-air bytes of an advertising channel PDU: a hardcoded `0x00` header byte, a
/// length byte covering the advertiser address plus AD data, the 6-byte advertiser address
/// (LSB first), and the AD data itself.
pub fn build_adv_ind_pdu(advertiser_address: &DeviceAddress, adv_data: &[u8]) -> Vec<u8> {
    assert!(adv_data.len() <= MAX_AD_DATA_LEN);

    let mut pdu = Vec::with_capacity(2 + 6 + adv_data.len());
    pdu.push(0x00);
    pdu.push((6 + adv_data.len()) as u8);
    pdu.extend_from_slice(advertiser_address.raw());
    pdu.extend_from_slice(adv_data);
    pdu
}

/// Splits a received advertising PDU back into its advertiser address and AD data, as needed to
/// build an LE Advertising Report event.
///
/// `pdu` must be at least 8 bytes (2-byte header + 6-byte address); shorter PDUs are a protocol
/// violation from whichever simulated peer sent them.
pub fn split_adv_ind_pdu(pdu: &[u8]) -> Option<(&[u8], &[u8])> {
    if pdu.len() < 8 {
        return None;
    }
    Some((&pdu[2..8], &pdu[8..]))
}

/// 16-bit advertising channel PDU header, bit-packed as the Bluetooth Core Spec describes it.
///
/// Not used by [`build_adv_ind_pdu`] (see the module doc), but kept available for parsing PDUs
/// received from other controllers, and for any future PDU type that does vary its header.
#[derive(Copy, Clone)]
pub struct Header(u16);

const TXADD_MASK: u16 = 0b0000_0000_0100_0000;
const RXADD_MASK: u16 = 0b0000_0000_1000_0000;

impl Header {
    pub fn new(pdu_type: u8) -> Self {
        Header(u16::from(pdu_type))
    }

    pub fn parse(raw: &[u8]) -> Self {
        Header(LittleEndian::read_u16(raw))
    }

    pub fn to_u16(self) -> u16 {
        self.0
    }

    pub fn pdu_type(&self) -> u8 {
        (self.0 & 0b1111) as u8
    }

    pub fn tx_add(&self) -> bool {
        self.0 & TXADD_MASK != 0
    }

    pub fn set_tx_add(&mut self, value: bool) {
        if value {
            self.0 |= TXADD_MASK;
        } else {
            self.0 &= !TXADD_MASK;
        }
    }

    pub fn rx_add(&self) -> bool {
        self.0 & RXADD_MASK != 0
    }

    pub fn set_rx_add(&mut self, value: bool) {
        if value {
            self.0 |= RXADD_MASK;
        } else {
            self.0 &= !RXADD_MASK;
        }
    }

    pub fn payload_length(&self) -> u8 {
        ((self.0 & 0b0011_1111_0000_0000) >> 8) as u8
    }

    pub fn set_payload_length(&mut self, length: u8) {
        assert!((6..=37).contains(&length));
        let header = self.0 & !0b0011_1111_0000_0000;
        self.0 = header | (u16::from(length) << 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::device_address::AddressKind;

    #[test]
    fn adv_ind_layout_matches_wire_format() {
        let addr = DeviceAddress::new([0x01, 0x00, 0x00, 0x00, 0x00, 0x7F], AddressKind::Public);
        let pdu = build_adv_ind_pdu(&addr, &[0x02, 0x01, 0x06]);
        assert_eq!(pdu, vec![0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x7F, 0x02, 0x01, 0x06]);
    }

    #[test]
    fn round_trips_through_split() {
        let addr = DeviceAddress::new([0xAA; 6], AddressKind::Public);
        let pdu = build_adv_ind_pdu(&addr, &[0xDE, 0xAD]);
        let (addr_bytes, data) = split_adv_ind_pdu(&pdu).unwrap();
        assert_eq!(addr_bytes, &[0xAA; 6]);
        assert_eq!(data, &[0xDE, 0xAD]);
    }
}
