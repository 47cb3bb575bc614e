//! HCI packet framing: splitting commands out of a byte stream and encoding events back onto
//! one.

use super::event::code;
use super::opcode::Opcode;
use byteorder::{ByteOrder, LittleEndian};

pub const HCI_COMMAND: u8 = 0x01;
pub const HCI_DATA: u8 = 0x02;
pub const HCI_EVENT: u8 = 0x04;

/// A parsed HCI command: opcode plus raw parameter bytes.
#[derive(Debug)]
pub struct Command<'a> {
    pub opcode: Opcode,
    pub parameters: &'a [u8],
}

/// Outcome of scanning the front of a read buffer for one HCI frame.
pub enum FrameResult<'a> {
    /// Not enough bytes buffered yet.
    Incomplete,
    /// A full command frame was extracted; `consumed` bytes should be dropped from the buffer.
    Command { command: Command<'a>, consumed: usize },
    /// The leading byte isn't a recognised HCI packet type, or is a data packet this controller
    /// doesn't act on; the connection should be torn down.
    Invalid,
}

/// Attempts to extract one complete HCI command from the front of `buffer`.
///
/// Any packet type byte other than [`HCI_COMMAND`] is a protocol violation from this
/// controller's perspective (it only accepts commands from a host); the caller should tear the
/// connection down when it sees one.
pub fn extract_frame(buffer: &[u8]) -> FrameResult<'_> {
    if buffer.is_empty() {
        return FrameResult::Incomplete;
    }

    match buffer[0] {
        HCI_COMMAND => {
            if buffer.len() < 4 {
                return FrameResult::Incomplete;
            }
            let opcode = LittleEndian::read_u16(&buffer[1..3]);
            let plen = buffer[3] as usize;
            if buffer.len() < plen + 4 {
                return FrameResult::Incomplete;
            }
            FrameResult::Command {
                command: Command {
                    opcode: Opcode::from_u16(opcode),
                    parameters: &buffer[4..4 + plen],
                },
                consumed: plen + 4,
            }
        }
        HCI_DATA => {
            // ACL data is recognised but not handled by this controller; the frame still has to
            // be skipped so stream sync isn't lost.
            if buffer.len() < 5 {
                return FrameResult::Incomplete;
            }
            let dlen = LittleEndian::read_u16(&buffer[3..5]) as usize;
            if buffer.len() < dlen + 5 {
                return FrameResult::Incomplete;
            }
            FrameResult::Invalid
        }
        _ => FrameResult::Invalid,
    }
}

/// Encodes an event frame: `[0x04][event_code][plen][parameters]`.
pub fn encode_event(event_code: u8, parameters: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + parameters.len());
    buf.push(HCI_EVENT);
    buf.push(event_code);
    buf.push(parameters.len() as u8);
    buf.extend_from_slice(parameters);
    buf
}

/// Encodes a Command Complete event: `[num_hci_command_packets][opcode][status][return params]`.
pub fn encode_command_complete(opcode: Opcode, status: u8, return_params: &[u8]) -> Vec<u8> {
    let mut params = Vec::with_capacity(4 + return_params.len());
    params.push(1); // num_hci_command_packets: this controller only ever has one in flight
    let mut opcode_bytes = [0u8; 2];
    LittleEndian::write_u16(&mut opcode_bytes, opcode.to_u16());
    params.extend_from_slice(&opcode_bytes);
    params.push(status);
    params.extend_from_slice(return_params);
    encode_event(code::COMMAND_COMPLETE, &params)
}

/// Encodes a Command Status event: `[status][num_hci_command_packets][opcode]`.
pub fn encode_command_status(opcode: Opcode, status: u8) -> Vec<u8> {
    let mut params = [0u8; 4];
    params[0] = status;
    params[1] = 1;
    LittleEndian::write_u16(&mut params[2..4], opcode.to_u16());
    encode_event(code::COMMAND_STATUS, &params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_reset_command() {
        let buf = [0x01, 0x03, 0x0C, 0x00];
        match extract_frame(&buf) {
            FrameResult::Command { command, consumed } => {
                assert_eq!(consumed, 4);
                assert_eq!(command.opcode, Opcode::Reset);
                assert!(command.parameters.is_empty());
            }
            _ => panic!("expected a command"),
        }
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let buf = [0x01, 0x03, 0x0C, 0x02, 0xAA];
        assert!(matches!(extract_frame(&buf), FrameResult::Incomplete));
    }

    #[test]
    fn command_complete_matches_reset_scenario() {
        let event = encode_command_complete(Opcode::Reset, 0x00, &[]);
        assert_eq!(event, vec![0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]);
    }

    #[test]
    fn unrecognised_packet_type_is_invalid() {
        let buf = [0xFF, 0x00];
        assert!(matches!(extract_frame(&buf), FrameResult::Invalid));
    }
}
