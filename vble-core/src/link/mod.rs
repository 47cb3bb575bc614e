//! Per-controller link-layer state: device address, advertising/scan configuration, and the
//! fixed-size array of state machines that produce and consume physical-layer packets.

pub mod advertising;
pub mod device_address;
pub mod state_machine;

use self::device_address::DeviceAddress;
use self::state_machine::{
    get_next_packet, AdvertisingParams, AdvertisingState, AdvertisingSubState, PhysicalPacket,
    ScanningParams, ScanningState, ScanningSubState, StateMachine, MAX_STATE_MACHINES,
};
use crate::time::Instant;
use rand::Rng;

/// Advertising parameters settable via `LE Set Advertising Parameters`.
#[derive(Clone, Debug)]
pub struct AdvertisingConfig {
    pub interval_min: u16,
    pub interval_max: u16,
    pub advertising_type: u8,
    pub own_address_type: u8,
    pub direct_address_type: u8,
    pub channel_map: u8,
    pub filter_policy: u8,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        AdvertisingConfig {
            interval_min: 0x0800,
            interval_max: 0x0800,
            advertising_type: 0,
            own_address_type: 0,
            direct_address_type: 0,
            channel_map: 0x07,
            filter_policy: 0,
        }
    }
}

/// Scan parameters settable via `LE Set Scan Parameters`.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub scan_type: u8,
    pub interval: u16,
    pub window: u16,
    pub own_address_type: u8,
    pub filter_policy: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            scan_type: 0,
            interval: 0x0010,
            window: 0x0010,
            own_address_type: 0,
            filter_policy: 0,
        }
    }
}

/// Per-controller link-layer state.
pub struct LinkLayer {
    pub dev_addr: DeviceAddress,
    pub advertising_config: AdvertisingConfig,
    pub advertising_data: Vec<u8>,
    pub scan_response_data: Vec<u8>,
    pub advertising_enabled: bool,
    pub scan_config: ScanConfig,
    pub scan_enabled: bool,
    machines: [StateMachine; MAX_STATE_MACHINES],
    last_machine: usize,
    last_clock: Instant,
}

/// The outcome of an `end_of_packet` delivery, handed back to the HCI layer so it can decide
/// whether to synthesise an LE Advertising Report event.
pub struct DeliveredAdvertisingReport {
    pub advertiser_address: [u8; 6],
    pub data: Vec<u8>,
}

impl LinkLayer {
    pub fn new(dev_addr: DeviceAddress) -> Self {
        LinkLayer {
            dev_addr,
            advertising_config: AdvertisingConfig::default(),
            advertising_data: Vec::new(),
            scan_response_data: Vec::new(),
            advertising_enabled: false,
            scan_config: ScanConfig::default(),
            scan_enabled: false,
            machines: [StateMachine::Idle, StateMachine::Idle],
            last_machine: 0,
            last_clock: Instant::ZERO,
        }
    }

    /// Resets every mutable field back to its power-on default; called by the HCI `Reset`
    /// command.
    pub fn reset(&mut self, dev_addr: DeviceAddress) {
        *self = LinkLayer::new(dev_addr);
    }

    pub fn dev_addr(&self) -> &DeviceAddress {
        &self.dev_addr
    }

    pub fn is_advertising(&self) -> bool {
        self.machines.iter().any(StateMachine::is_advertising)
    }

    pub fn is_scanning(&self) -> bool {
        self.machines.iter().any(StateMachine::is_scanning)
    }

    /// Finds the lowest-indexed idle state machine and transitions it to `Advertising`.
    ///
    /// Returns `false` (leaving state untouched) if advertising is already enabled or there is
    /// no free state machine slot, matching the HCI status the caller should report
    /// (`EC_INVALID_HCI_COMMAND_PARAMETERS`, see the error handling design).
    pub fn enable_advertising(&mut self) -> bool {
        if self.is_advertising() {
            return false;
        }
        let Some(index) = self.machines.iter().position(StateMachine::is_idle) else {
            return false;
        };

        self.machines[index] = StateMachine::Advertising(AdvertisingState {
            sub_state: AdvertisingSubState::Advertise,
            next_advertising_instant: self.last_clock,
            next_advertising_tx: self.last_clock,
            channel: crate::phy::AdvertisingChannel::first(),
        });
        self.advertising_enabled = true;
        true
    }

    pub fn disable_advertising(&mut self) -> bool {
        let Some(index) = self.machines.iter().position(StateMachine::is_advertising) else {
            return false;
        };
        self.machines[index] = StateMachine::Idle;
        self.advertising_enabled = false;
        true
    }

    pub fn enable_scanning(&mut self) -> bool {
        if self.is_scanning() {
            return false;
        }
        let Some(index) = self.machines.iter().position(StateMachine::is_idle) else {
            return false;
        };

        self.machines[index] = StateMachine::Scanning(ScanningState {
            sub_state: ScanningSubState::Scan,
            next_scanning_instant: self.last_clock,
            channel: crate::phy::AdvertisingChannel::first(),
        });
        self.scan_enabled = true;
        true
    }

    pub fn disable_scanning(&mut self) -> bool {
        let Some(index) = self.machines.iter().position(StateMachine::is_scanning) else {
            return false;
        };
        self.machines[index] = StateMachine::Idle;
        self.scan_enabled = false;
        true
    }

    /// Polls the state machines round-robin, starting just after `last_machine`, returning the
    /// first one with a packet due at or before `after`.
    pub fn next_packet(&mut self, after: Instant, rng: &mut impl Rng) -> Option<PhysicalPacket> {
        self.last_clock = after;

        let adv_params = AdvertisingParams {
            interval_min: self.advertising_config.interval_min,
            advertiser_address: self.dev_addr,
            adv_data: self.advertising_data.clone(),
        };
        let scan_params = ScanningParams {
            interval: self.scan_config.interval,
            window: self.scan_config.window,
        };

        for offset in 1..=MAX_STATE_MACHINES {
            let index = (self.last_machine + offset) % MAX_STATE_MACHINES;
            let adv = if self.machines[index].is_advertising() {
                Some(&adv_params)
            } else {
                None
            };
            let scan = if self.machines[index].is_scanning() {
                Some(&scan_params)
            } else {
                None
            };
            if let Some(packet) =
                get_next_packet(&mut self.machines[index], index, adv, scan, after, rng)
            {
                self.last_machine = index;
                return Some(packet);
            }
        }
        None
    }

    /// Called by the scheduler when a packet produced or awaited by `machine_index` completes.
    ///
    /// For a transmitted packet, `rx_data` is `None`. For a receive window, `rx_data` carries
    /// the delivered PDU bytes, if any arrived during the window. Returns a report to surface as
    /// an LE Advertising Report event iff the owning machine is scanning and a PDU was received.
    pub fn end_of_packet(
        &mut self,
        machine_index: usize,
        rx_data: Option<&[u8]>,
    ) -> Option<DeliveredAdvertisingReport> {
        let rx_data = rx_data?;
        if rx_data.is_empty() {
            return None;
        }
        if !self.machines[machine_index].is_scanning() {
            return None;
        }
        let (addr_bytes, data) = advertising::split_adv_ind_pdu(rx_data)?;
        let mut advertiser_address = [0u8; 6];
        advertiser_address.copy_from_slice(addr_bytes);
        Some(DeliveredAdvertisingReport {
            advertiser_address,
            data: data.to_vec(),
        })
    }
}
