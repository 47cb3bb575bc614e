//! LE Advertising Report event encoding.

use super::event::{code, le_subevent};
use crate::link::DeliveredAdvertisingReport;

/// Fixed RSSI reported for every delivery: the simulator models no path loss, so every received
/// PDU looks equally strong.
const SIMULATED_RSSI: i8 = -60;

/// Encodes a delivered advertisement as an `LE Advertising Report` event (LE meta event 0x3E,
/// subevent 0x02): `[0x02, num_reports=1, event_type=0x00, addr_type=0x00, addr[6], data_len,
/// data[..], rssi]`.
pub fn encode(report: &DeliveredAdvertisingReport) -> Vec<u8> {
    let mut params = Vec::with_capacity(10 + report.data.len());
    params.push(le_subevent::ADVERTISING_REPORT);
    params.push(1); // num_reports
    params.push(0x00); // event_type: ADV_IND
    params.push(0x00); // address type: public
    params.extend_from_slice(&report.advertiser_address);
    params.push(report.data.len() as u8);
    params.extend_from_slice(&report.data);
    params.push(SIMULATED_RSSI as u8);

    super::codec::encode_event(code::LE_META, &params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_cross_client_reception_scenario() {
        let report = DeliveredAdvertisingReport {
            advertiser_address: [0, 0, 0, 0, 0, 0],
            data: vec![0xAA, 0xBB, 0xCC],
        };
        let event = encode(&report);
        assert_eq!(event[0], 0x04);
        assert_eq!(event[1], 0x3E);
        assert_eq!(event[3], 0x02); // subevent
        let data_len_offset = 3 + 4 + 6;
        assert_eq!(event[data_len_offset], 3);
        assert_eq!(&event[data_len_offset + 1..data_len_offset + 4], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(*event.last().unwrap(), (-60i8) as u8);
    }
}
