//! HCI event codes and the Bluetooth HCI error code table.

/// HCI event codes used by this controller.
pub mod code {
    pub const COMMAND_COMPLETE: u8 = 0x0E;
    pub const COMMAND_STATUS: u8 = 0x0F;
    pub const NUMBER_OF_COMPLETED_PACKETS: u8 = 0x13;
    pub const LE_META: u8 = 0x3E;
}

/// LE meta-event subevent codes.
pub mod le_subevent {
    pub const CONNECTION_COMPLETE: u8 = 0x01;
    pub const ADVERTISING_REPORT: u8 = 0x02;
    pub const CONNECTION_UPDATE_COMPLETE: u8 = 0x03;
    pub const READ_REMOTE_USED_FEATURES_COMPLETE: u8 = 0x04;
    pub const LONG_TERM_KEY_REQUEST: u8 = 0x05;
}

/// Bluetooth HCI error codes, as reported in Command Complete/Status and used as `status` bytes
/// throughout.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorCode {
    Success = 0x00,
    UnknownHciCommand = 0x01,
    UnknownConnectionIdentifier = 0x02,
    HardwareFailure = 0x03,
    PageTimeout = 0x04,
    AuthenticationFailure = 0x05,
    PinOrKeyMissing = 0x06,
    MemoryCapacityExceeded = 0x07,
    ConnectionTimeout = 0x08,
    ConnectionLimitExceeded = 0x09,
    CommandDisallowed = 0x0C,
    UnsupportedFeatureOrParameterValue = 0x11,
    InvalidHciCommandParameters = 0x12,
    UnspecifiedError = 0x1F,
}

impl ErrorCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
