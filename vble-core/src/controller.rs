//! The controller facade: binds one simulated client to an HCI command/event state and a
//! [`LinkLayer`], and implements [`RadioSource`] so the scheduler can drive it.

use crate::hci::event::ErrorCode;
use crate::link::device_address::DeviceAddress;
use crate::link::state_machine::PhysicalPacket;
use crate::link::LinkLayer;
use crate::time::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::mpsc::Sender;

/// Mutable HCI-level state that isn't part of the link layer: event masks, buffer sizing, and
/// the fields reported by the informational commands.
pub struct HciState {
    pub event_mask: u64,
    pub le_event_mask: u64,
    pub le_acl_data_packet_length: u16,
    pub total_num_le_acl_data_packets: u8,
    pub hci_version: u8,
    pub hci_revision: u16,
    pub lmp_version: u8,
    pub lmp_subversion: u16,
    pub manufacturer_name: u16,
    /// Page 0 of the 8-byte LMP feature bitmap.
    pub lmp_features: u64,
    pub le_features: u64,
    pub le_states: u64,
    pub supported_commands: [u8; 64],
}

impl HciState {
    /// Mandatory event bits Set Event Mask can never clear: Command Complete, Command Status,
    /// and Number of Completed Packets must always reach the host.
    const FORCED_EVENT_BITS: u64 = (1 << (0x0E - 1)) | (1 << (0x0F - 1)) | (1 << (0x13 - 1));

    pub fn new(start_time_ticks: u32) -> Self {
        let mut supported_commands = [0u8; 64];
        supported_commands[5] = 0b1100_0000; // Set Event Mask, Reset
        supported_commands[14] = 0b1110_1000; // Read {Version,Commands,Features,Ext Features}
        supported_commands[15] = 0b0000_0010; // Read Buffer Size
        supported_commands[24] = 0b0110_0000; // Read BD_ADDR, Write LE Host Supported
        supported_commands[25] = 0b1111_1111; // LE Set Event Mask .. LE Set Scan Response Data
        supported_commands[26] = 0b0011_1111; // LE Set Advertise Enable .. LE Read Supported States

        HciState {
            event_mask: 0x0000_1FFF_FFFF_FFFF,
            le_event_mask: 0x0000_0000_0000_001F,
            le_acl_data_packet_length: 27,
            total_num_le_acl_data_packets: 4,
            hci_version: 0x06,
            hci_revision: (start_time_ticks & 0xFFFF) as u16,
            lmp_version: 0x06,
            lmp_subversion: ((start_time_ticks >> 4) & 0xFFFF) as u16,
            manufacturer_name: 0xFFFF,
            lmp_features: 0x8000_0060_0000_0000,
            le_features: 0x0000_0000_0000_0000,
            le_states: 0x0000_0000_0000_0037,
            supported_commands,
        }
    }

    /// Whether event code `event` (1-based HCI event mask numbering) should be sent, honouring
    /// the forced-on Command Complete/Status/Number-of-Completed-Packets bits.
    pub fn event_enabled(&self, event_code: u8) -> bool {
        let bit = 1u64 << (event_code.saturating_sub(1));
        (self.event_mask | Self::FORCED_EVENT_BITS) & bit != 0
    }

    pub fn le_event_enabled(&self, subevent_code: u8) -> bool {
        let bit = 1u64 << (subevent_code.saturating_sub(1));
        self.le_event_mask & bit != 0
    }
}

/// One simulated controller: the HCI state plus the link layer it drives.
///
/// Command replies are returned directly from whatever dispatches the command (the connection's
/// read thread), but asynchronous LE Advertising Report events are produced by the scheduler
/// thread as a side effect of `end_of_packet`, which has no socket to write to -- so each
/// controller is handed the sending half of its connection's outgoing-event queue at
/// construction time.
pub struct Controller {
    pub hci: HciState,
    pub link: LinkLayer,
    pub delete_pending: bool,
    rng: StdRng,
    events_out: Sender<Vec<u8>>,
}

impl Controller {
    /// `seed_override` lets a deployment pin every connection's jitter RNG to the same seed
    /// (for reproducible scenario tests); `None` derives the seed from the peer's address and
    /// port, the default for a real deployment.
    pub fn new(
        peer_addr: u32,
        peer_port: u16,
        start_time_ticks: u32,
        seed_override: Option<u64>,
        events_out: Sender<Vec<u8>>,
    ) -> Self {
        let dev_addr = DeviceAddress::from_peer(peer_addr, peer_port);
        let seed = seed_override.unwrap_or(u64::from(peer_addr) << 16 | u64::from(peer_port));
        Controller {
            hci: HciState::new(start_time_ticks),
            link: LinkLayer::new(dev_addr),
            delete_pending: false,
            rng: StdRng::seed_from_u64(seed),
            events_out,
        }
    }

    pub fn reset(&mut self, start_time_ticks: u32) {
        let dev_addr = *self.link.dev_addr();
        self.hci = HciState::new(start_time_ticks);
        self.link.reset(dev_addr);
    }

    pub fn set_delete_pending(&mut self) {
        self.delete_pending = true;
    }

    pub fn is_delete_pending(&self) -> bool {
        self.delete_pending
    }
}

/// The interface the physical-layer scheduler drives every registered controller through.
///
/// Kept as a trait (rather than a concrete dependency on `Controller`) so the scheduler doesn't
/// need to know about HCI event encoding at all -- it only needs "give me a packet" and "here's
/// what happened to it", keeping the physical-layer timing model separate from the code that
/// interprets delivered packets into link-layer state changes.
pub trait RadioSource {
    fn get_next_packet(&mut self, after: Instant) -> Option<PhysicalPacket>;

    /// Called when a packet this source produced or was waiting to receive completes.
    /// `rx_data` carries the delivered PDU for a receive window that got a hit, or is `None`
    /// for a transmitted packet or an empty receive window. Any resulting event is pushed
    /// straight to the owning connection's outgoing queue; there is no reply to return here.
    fn end_of_packet(&mut self, machine_index: usize, rx_data: Option<&[u8]>);

    fn is_delete_pending(&self) -> bool;
}

impl RadioSource for Controller {
    fn get_next_packet(&mut self, after: Instant) -> Option<PhysicalPacket> {
        self.link.next_packet(after, &mut self.rng)
    }

    fn end_of_packet(&mut self, machine_index: usize, rx_data: Option<&[u8]>) {
        if let Some(report) = self.link.end_of_packet(machine_index, rx_data) {
            if !self.hci.le_event_enabled(crate::hci::event::le_subevent::ADVERTISING_REPORT) {
                return;
            }
            let event = crate::hci::advertising_report::encode(&report);
            // The peer may have disconnected already; a dropped receiver just means the
            // event is discarded, which is what should happen once the connection is gone.
            let _ = self.events_out.send(event);
        }
    }

    fn is_delete_pending(&self) -> bool {
        self.delete_pending
    }
}

/// Helper for command handlers: maps a link-layer setter's `bool` success into the HCI status
/// byte it should report.
pub fn status_from_bool(ok: bool) -> u8 {
    if ok {
        ErrorCode::Success.as_u8()
    } else {
        ErrorCode::InvalidHciCommandParameters.as_u8()
    }
}
