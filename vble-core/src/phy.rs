//! Channel numbering for the three primary advertising channels.

/// One of the three primary advertising channels (RF channels 37, 38, 39).
///
/// Mirrors the channel-index abstraction in a hardware BLE stack's `phy` module, but only the
/// advertising subset is needed here: this simulator never opens a data connection, so there is
/// no `DataChannel` counterpart.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AdvertisingChannel(u8);

impl AdvertisingChannel {
    /// The first channel in advertising channel order (index 0, RF channel 37).
    pub fn first() -> Self {
        AdvertisingChannel(0)
    }

    /// Index of this channel within the advertising cycle, in `0..3`.
    pub fn index(&self) -> u8 {
        self.0
    }

    /// Builds the advertising channel with the given cycle index (`0..3`).
    pub fn from_index(index: u8) -> Self {
        assert!(index < 3, "advertising channel index out of range: {}", index);
        AdvertisingChannel(index)
    }

    /// The next channel in the 37 -> 38 -> 39 -> 37 cycle.
    pub fn cycle(&self) -> Self {
        AdvertisingChannel((self.0 + 1) % 3)
    }

    /// `true` if this call to `cycle` wrapped back around to channel 37.
    pub fn wrapped_to_first(&self) -> bool {
        self.0 == 0
    }

    /// The RF channel number (37, 38, or 39).
    pub fn rf_channel(&self) -> u8 {
        37 + self.0
    }
}

/// Access address reserved for all advertising channel PDUs.
pub const ADVERTISING_ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// Preamble byte used ahead of an access address: `0xAA` if the access address's LSB is 0,
/// `0x55` if it's 1 (the preamble alternates bits with the first transmitted symbol).
pub fn preamble_for_access_address(access_address: u32) -> u8 {
    if access_address & 1 == 0 {
        0xAA
    } else {
        0x55
    }
}
