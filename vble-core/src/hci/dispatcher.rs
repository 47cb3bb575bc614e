//! Maps an incoming HCI command to its handler, and formats the mandatory reply.

use super::codec::{encode_command_complete, encode_command_status, Command};
use super::event::ErrorCode;
use super::opcode::Opcode;
use crate::controller::{status_from_bool, Controller};
use crate::link::advertising::MAX_AD_DATA_LEN;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

/// Dispatches `command` against `controller`, returning the encoded event(s) to send back.
///
/// Every accepted command yields exactly one Command Complete event (after mutating
/// `controller`'s state as needed); an opcode this controller doesn't recognise instead yields a
/// Command Status event carrying `EC_UNKNOWN_HCI_COMMAND`, per the HCI convention for unsolicited
/// commands.
pub fn dispatch(controller: &mut Controller, command: &Command<'_>, start_time_ticks: u32) -> Vec<u8> {
    let opcode = command.opcode;
    let params = command.parameters;

    debug!("dispatching {:?} ({} parameter bytes)", opcode, params.len());

    match opcode {
        Opcode::Unknown(_) => {
            warn!("unknown opcode {:?}", opcode);
            return encode_command_status(opcode, ErrorCode::UnknownHciCommand.as_u8());
        }

        Opcode::SetEventMask => {
            if params.len() != 8 {
                return bad_params(opcode);
            }
            controller.hci.event_mask = LittleEndian::read_u64(params);
            complete_ok(opcode, &[])
        }

        Opcode::Reset => {
            controller.reset(start_time_ticks);
            complete_ok(opcode, &[])
        }

        Opcode::WriteLeHostSupported => complete_ok(opcode, &[]),

        Opcode::ReadLocalVersionInformation => {
            let mut ret = [0u8; 8];
            ret[0] = controller.hci.hci_version;
            LittleEndian::write_u16(&mut ret[1..3], controller.hci.hci_revision);
            ret[3] = controller.hci.lmp_version;
            LittleEndian::write_u16(&mut ret[4..6], controller.hci.manufacturer_name);
            LittleEndian::write_u16(&mut ret[6..8], controller.hci.lmp_subversion);
            complete_ok(opcode, &ret)
        }

        Opcode::ReadLocalSupportedCommands => complete_ok(opcode, &controller.hci.supported_commands),

        Opcode::ReadLocalSupportedFeatures => {
            let mut ret = [0u8; 8];
            LittleEndian::write_u64(&mut ret, controller.hci.lmp_features);
            complete_ok(opcode, &ret)
        }

        Opcode::ReadLocalExtendedFeatures => {
            if params.len() != 1 {
                return bad_params(opcode);
            }
            let page = params[0];
            let mut ret = [0u8; 10];
            ret[0] = page;
            ret[1] = 0; // max_page_number: only page 0 is populated
            if page == 0 {
                LittleEndian::write_u64(&mut ret[2..10], controller.hci.lmp_features);
            }
            complete_ok(opcode, &ret)
        }

        Opcode::ReadBufferSize => {
            // No BR/EDR ACL/SCO buffers modelled; report zero capacity for those fields.
            complete_ok(opcode, &[0, 0, 0, 0, 0, 0, 0])
        }

        Opcode::ReadBdAddr => complete_ok(opcode, controller.link.dev_addr().raw()),

        Opcode::LeSetEventMask => {
            if params.len() != 8 {
                return bad_params(opcode);
            }
            controller.hci.le_event_mask = LittleEndian::read_u64(params);
            complete_ok(opcode, &[])
        }

        Opcode::LeReadBufferSize => {
            let mut ret = [0u8; 3];
            LittleEndian::write_u16(&mut ret[0..2], controller.hci.le_acl_data_packet_length);
            ret[2] = controller.hci.total_num_le_acl_data_packets;
            complete_ok(opcode, &ret)
        }

        Opcode::LeReadLocalSupportedFeatures => {
            let mut ret = [0u8; 8];
            LittleEndian::write_u64(&mut ret, controller.hci.le_features);
            complete_ok(opcode, &ret)
        }

        Opcode::LeSetAdvertisingParameters => {
            if params.len() != 15 {
                return bad_params(opcode);
            }
            controller.link.advertising_config.interval_min = LittleEndian::read_u16(&params[0..2]);
            controller.link.advertising_config.interval_max = LittleEndian::read_u16(&params[2..4]);
            controller.link.advertising_config.advertising_type = params[4];
            controller.link.advertising_config.own_address_type = params[5];
            controller.link.advertising_config.direct_address_type = params[6];
            // params[7..13] is the direct address itself; unused since directed advertising
            // isn't modelled.
            controller.link.advertising_config.channel_map = params[13];
            controller.link.advertising_config.filter_policy = params[14];
            complete_ok(opcode, &[])
        }

        Opcode::LeReadAdvertisingChannelTxPower => complete_ok(opcode, &[0]),

        Opcode::LeSetAdvertisingData => {
            if params.is_empty() || params[0] as usize != params.len() - 1 {
                return bad_params(opcode);
            }
            let len = (params[0] as usize).min(MAX_AD_DATA_LEN);
            controller.link.advertising_data = params[1..1 + len].to_vec();
            complete_ok(opcode, &[])
        }

        Opcode::LeSetScanResponseData => {
            if params.is_empty() || params[0] as usize != params.len() - 1 {
                return bad_params(opcode);
            }
            let len = (params[0] as usize).min(MAX_AD_DATA_LEN);
            controller.link.scan_response_data = params[1..1 + len].to_vec();
            complete_ok(opcode, &[])
        }

        Opcode::LeSetAdvertiseEnable => {
            if params.len() != 1 {
                return bad_params(opcode);
            }
            let ok = if params[0] != 0 {
                controller.link.enable_advertising()
            } else {
                controller.link.disable_advertising()
            };
            complete_status(opcode, ok)
        }

        Opcode::LeSetScanParameters => {
            if params.len() != 7 {
                return bad_params(opcode);
            }
            controller.link.scan_config.scan_type = params[0];
            controller.link.scan_config.interval = LittleEndian::read_u16(&params[1..3]);
            controller.link.scan_config.window = LittleEndian::read_u16(&params[3..5]);
            controller.link.scan_config.own_address_type = params[5];
            controller.link.scan_config.filter_policy = params[6];
            complete_ok(opcode, &[])
        }

        Opcode::LeSetScanEnable => {
            if params.len() != 2 {
                return bad_params(opcode);
            }
            let ok = if params[0] != 0 {
                controller.link.enable_scanning()
            } else {
                controller.link.disable_scanning()
            };
            complete_status(opcode, ok)
        }

        Opcode::LeReadWhiteListSize => complete_ok(opcode, &[1]),

        Opcode::LeReadSupportedStates => {
            let mut ret = [0u8; 8];
            LittleEndian::write_u64(&mut ret, controller.hci.le_states);
            complete_ok(opcode, &ret)
        }
    }
}

fn complete_ok(opcode: Opcode, return_params: &[u8]) -> Vec<u8> {
    encode_command_complete(opcode, ErrorCode::Success.as_u8(), return_params)
}

fn complete_status(opcode: Opcode, ok: bool) -> Vec<u8> {
    encode_command_complete(opcode, status_from_bool(ok), &[])
}

fn bad_params(opcode: Opcode) -> Vec<u8> {
    encode_command_complete(opcode, ErrorCode::InvalidHciCommandParameters.as_u8(), &[])
}
