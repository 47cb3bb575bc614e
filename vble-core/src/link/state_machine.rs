//! Per-connection link-layer state machines: advertising and scanning.
//!
//! A [`LinkLayer`](super::LinkLayer) owns a small fixed-size array of these so that, in
//! principle, a controller could advertise and scan at once. Only `Advertising` and `Scanning`
//! are reachable states in this simulator; `Initiator`/`Slave`/`Master` exist as enum members
//! reserved for a future data-channel implementation but are never entered.

use super::advertising::build_adv_ind_pdu;
use super::device_address::DeviceAddress;
use crate::phy::{preamble_for_access_address, AdvertisingChannel, ADVERTISING_ACCESS_ADDRESS};
use crate::time::{Duration, Instant};
use rand::Rng;

/// One simulation tick is nominally one nanosecond; this constant converts the 625-unit slot
/// size BLE timing parameters are expressed in directly into ticks, matching the rest of the
/// simulator's "1 bit of air time == 1 tick" convention (see `PhysicalPacket::tx_end_time`).
pub const TICKS_PER_SLOT: i64 = 625;

/// Maximum number of link-layer state machines a single controller may run concurrently.
pub const MAX_STATE_MACHINES: usize = 2;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Direction {
    Tx,
    Rx,
}

/// A scheduled (or in-flight) packet on the shared physical layer.
#[derive(Clone, Debug)]
pub struct PhysicalPacket {
    pub direction: Direction,
    /// RF channel number, 37-39 for the advertising channels used in this core.
    pub channel: u8,
    pub start_time: Instant,
    pub end_time: Instant,
    pub access_address: u32,
    pub preamble: u8,
    /// PDU bytes for a Tx packet; empty for an Rx packet (filled in by the scheduler on
    /// delivery).
    pub pdu: Vec<u8>,
    /// Index of the state machine that produced this packet, for routing `end_of_packet` back.
    pub machine_index: usize,
}

impl PhysicalPacket {
    /// `start + (preamble(8) + access_address(32) + crc(24) + 8*pdu_len)`, in ticks.
    ///
    /// The "8 *" factor treats each PDU octet as 8 ticks of air time, i.e. 1 tick == 1 bit. This
    /// is dimensionally a microsecond at 1 Mbit/s, not a nanosecond, but the simulator's ticks
    /// are an abstract unit shared by every timing computation, so the formula is kept exactly
    /// as it decides collisions and delivery windows throughout this module.
    fn tx_end_time(start_time: Instant, pdu_len: usize) -> Instant {
        start_time + Duration::from_nanos(8 + 32 + 24 + 8 * pdu_len as i64)
    }
}

/// Advertising sub-states. `AdvertiseRequest`/`AdvertiseResponse` are reserved for a future
/// active-scan response handshake and are never entered by this core.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AdvertisingSubState {
    Advertise,
    AdvertiseRequest,
    AdvertiseResponse,
}

/// Scanning sub-states. `ScanRequest`/`ScanResponse` are reserved, as above.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ScanningSubState {
    Scan,
    ScanRequest,
    ScanResponse,
}

/// Advertising-specific mutable state carried by a state machine while `Advertising`.
#[derive(Clone, Debug)]
pub struct AdvertisingState {
    pub sub_state: AdvertisingSubState,
    pub next_advertising_instant: Instant,
    pub next_advertising_tx: Instant,
    pub channel: AdvertisingChannel,
}

/// Scanning-specific mutable state carried by a state machine while `Scanning`.
#[derive(Clone, Debug)]
pub struct ScanningState {
    pub sub_state: ScanningSubState,
    pub next_scanning_instant: Instant,
    pub channel: AdvertisingChannel,
}

/// One link-layer state machine slot.
#[derive(Clone, Debug)]
pub enum StateMachine {
    Idle,
    Advertising(AdvertisingState),
    Scanning(ScanningState),
}

impl StateMachine {
    pub fn is_idle(&self) -> bool {
        matches!(self, StateMachine::Idle)
    }

    pub fn is_advertising(&self) -> bool {
        matches!(self, StateMachine::Advertising(_))
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, StateMachine::Scanning(_))
    }
}

/// Parameters needed to poll a state machine for its next packet; owned by the enclosing
/// `LinkLayer`, passed in rather than stored on the state machine itself since they're shared
/// across enable/disable cycles.
pub struct AdvertisingParams {
    pub interval_min: u16,
    pub advertiser_address: DeviceAddress,
    pub adv_data: Vec<u8>,
}

pub struct ScanningParams {
    pub interval: u16,
    pub window: u16,
}

/// Polls `machine` (index `machine_index`) for whether it has a packet due at or before `after`.
///
/// Returns the packet to schedule, if any, and advances the machine's own timing fields in
/// place, following the round-robin packet generation algorithm: a machine whose next
/// transmission is still in the future relative to `after` is skipped this poll (not "caught
/// up"); a machine whose next transmission already fell behind `after` has its schedule
/// advanced by one interval without transmitting, so a stalled connection can't flood the
/// channel with backlog once polling resumes.
pub fn get_next_packet(
    machine: &mut StateMachine,
    machine_index: usize,
    adv: Option<&AdvertisingParams>,
    scan: Option<&ScanningParams>,
    after: Instant,
    rng: &mut impl Rng,
) -> Option<PhysicalPacket> {
    match machine {
        StateMachine::Idle => None,
        StateMachine::Advertising(state) => {
            let adv = adv.expect("advertising state machine without advertising params");
            advertise_next_packet(state, machine_index, adv, after, rng)
        }
        StateMachine::Scanning(state) => {
            let scan = scan.expect("scanning state machine without scanning params");
            scan_next_packet(state, machine_index, scan, after)
        }
    }
}

fn advertise_next_packet(
    state: &mut AdvertisingState,
    machine_index: usize,
    adv: &AdvertisingParams,
    after: Instant,
    rng: &mut impl Rng,
) -> Option<PhysicalPacket> {
    if state.next_advertising_tx < after {
        // Fell behind: skip straight to the next interval rather than transmitting a backlog
        // of stale packets.
        catch_up(state, adv, rng);
        return None;
    }

    if state.next_advertising_tx == after {
        // Due exactly now but not yet past due: defer to the next poll rather than firing on
        // the `==` edge (see DESIGN.md for why this asymmetric strict-due condition is kept).
        return None;
    }

    let pdu = build_adv_ind_pdu(&adv.advertiser_address, &adv.adv_data);
    let start_time = state.next_advertising_tx;
    let end_time = PhysicalPacket::tx_end_time(start_time, pdu.len());
    let pdu_len = pdu.len();
    let packet = PhysicalPacket {
        direction: Direction::Tx,
        channel: state.channel.rf_channel(),
        start_time,
        end_time,
        access_address: ADVERTISING_ACCESS_ADDRESS,
        preamble: preamble_for_access_address(ADVERTISING_ACCESS_ADDRESS),
        pdu,
        machine_index,
    };

    advance_interval(state, adv, pdu_len, rng);
    Some(packet)
}

/// Advances `state` to the next scheduled transmission after emitting (or skipping) one packet.
///
/// On wrap back to channel 37, the next instant moves a full advertising interval ahead, with a
/// fresh random delay of 0-15 slots layered on top (the BLE "advDelay"). Otherwise the next
/// channel's transmission follows immediately after this packet's on-air time plus the
/// interframe space.
fn advance_interval(
    state: &mut AdvertisingState,
    adv: &AdvertisingParams,
    pdu_len: usize,
    rng: &mut impl Rng,
) {
    state.channel = state.channel.cycle();

    if state.channel == AdvertisingChannel::first() {
        state.next_advertising_instant +=
            Duration::from_nanos(i64::from(adv.interval_min) * TICKS_PER_SLOT);
        let jitter = rng.gen_range(0..16) as i64 * TICKS_PER_SLOT;
        state.next_advertising_tx = state.next_advertising_instant + Duration::from_nanos(jitter);
    } else {
        state.next_advertising_tx +=
            Duration::from_nanos(8 + 32 + 8 * pdu_len as i64 + 24 + TIFS_TICKS);
    }
}

const TIFS_TICKS: i64 = 150;

fn catch_up(state: &mut AdvertisingState, adv: &AdvertisingParams, rng: &mut impl Rng) {
    state.next_advertising_instant +=
        Duration::from_nanos(i64::from(adv.interval_min) * TICKS_PER_SLOT);
    let jitter = rng.gen_range(0..16) as i64 * TICKS_PER_SLOT;
    state.next_advertising_tx = state.next_advertising_instant + Duration::from_nanos(jitter);
}

fn scan_next_packet(
    state: &mut ScanningState,
    machine_index: usize,
    scan: &ScanningParams,
    after: Instant,
) -> Option<PhysicalPacket> {
    if state.next_scanning_instant < after {
        state.next_scanning_instant +=
            Duration::from_nanos(i64::from(scan.interval) * TICKS_PER_SLOT);
        return None;
    }

    if state.next_scanning_instant == after {
        return None;
    }

    let start_time = state.next_scanning_instant;
    let window_ticks = i64::from(scan.window) * TICKS_PER_SLOT - TIFS_TICKS;
    let end_time = start_time + Duration::from_nanos(window_ticks.max(0));

    let packet = PhysicalPacket {
        direction: Direction::Rx,
        channel: state.channel.rf_channel(),
        start_time,
        end_time,
        access_address: ADVERTISING_ACCESS_ADDRESS,
        preamble: preamble_for_access_address(ADVERTISING_ACCESS_ADDRESS),
        pdu: Vec::new(),
        machine_index,
    };

    state.next_scanning_instant += Duration::from_nanos(i64::from(scan.interval) * TICKS_PER_SLOT);
    state.channel = state.channel.cycle();

    Some(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::device_address::AddressKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn addr() -> DeviceAddress {
        DeviceAddress::new([1, 0, 0, 0, 0, 0x7F], AddressKind::Public)
    }

    #[test]
    fn advertising_cycles_through_all_three_channels() {
        let mut state = AdvertisingState {
            sub_state: AdvertisingSubState::Advertise,
            next_advertising_instant: Instant::ZERO,
            next_advertising_tx: Instant::ZERO,
            channel: AdvertisingChannel::first(),
        };
        let params = AdvertisingParams {
            interval_min: 0x0800,
            advertiser_address: addr(),
            adv_data: vec![0x02, 0x01, 0x06],
        };
        let mut rng = StdRng::seed_from_u64(0);

        let mut channels = Vec::new();
        let mut after = Instant::from_raw_nanos(-1);
        for _ in 0..4 {
            let pkt = advertise_next_packet(&mut state, 0, &params, after, &mut rng)
                .expect("packet due");
            channels.push(pkt.channel);
            after = pkt.start_time;
        }
        assert_eq!(channels, vec![37, 38, 39, 37]);
    }

    #[test]
    fn advertising_skips_when_not_yet_due() {
        let mut state = AdvertisingState {
            sub_state: AdvertisingSubState::Advertise,
            next_advertising_instant: Instant::ZERO,
            next_advertising_tx: Instant::from_raw_nanos(1000),
            channel: AdvertisingChannel::first(),
        };
        let params = AdvertisingParams {
            interval_min: 0x0800,
            advertiser_address: addr(),
            adv_data: vec![],
        };
        let mut rng = StdRng::seed_from_u64(0);

        assert!(advertise_next_packet(&mut state, 0, &params, Instant::from_raw_nanos(500), &mut rng).is_none());
        assert_eq!(state.next_advertising_tx, Instant::from_raw_nanos(1000));
    }

    #[test]
    fn falling_behind_advances_the_interval_without_touching_the_channel() {
        let mut state = AdvertisingState {
            sub_state: AdvertisingSubState::Advertise,
            next_advertising_instant: Instant::ZERO,
            next_advertising_tx: Instant::ZERO,
            channel: AdvertisingChannel::from_index(1),
        };
        let params = AdvertisingParams {
            interval_min: 0x0800,
            advertiser_address: addr(),
            adv_data: vec![],
        };
        let mut rng = StdRng::seed_from_u64(0);

        let result = advertise_next_packet(&mut state, 0, &params, Instant::from_raw_nanos(1), &mut rng);
        assert!(result.is_none(), "an overdue poll must not transmit");
        assert_eq!(state.channel, AdvertisingChannel::from_index(1), "catch-up must not reset the channel");
    }

    #[test]
    fn scanning_falling_behind_advances_the_interval_without_touching_the_channel() {
        let mut state = ScanningState {
            sub_state: ScanningSubState::Scan,
            next_scanning_instant: Instant::ZERO,
            channel: AdvertisingChannel::from_index(2),
        };
        let params = ScanningParams { interval: 0x0010, window: 0x0010 };

        let result = scan_next_packet(&mut state, 0, &params, Instant::from_raw_nanos(1));
        assert!(result.is_none(), "an overdue poll must not schedule a window");
        assert_eq!(state.channel, AdvertisingChannel::from_index(2), "falling behind must not cycle the channel");
    }

    #[test]
    fn scanning_window_covers_requested_span() {
        let mut state = ScanningState {
            sub_state: ScanningSubState::Scan,
            next_scanning_instant: Instant::from_raw_nanos(0),
            channel: AdvertisingChannel::first(),
        };
        let params = ScanningParams { interval: 0x0010, window: 0x0010 };

        let pkt = scan_next_packet(&mut state, 1, &params, Instant::from_raw_nanos(-1)).unwrap();
        assert_eq!(pkt.direction, Direction::Rx);
        assert_eq!(pkt.channel, 37);
        assert!(pkt.end_time > pkt.start_time);
    }
}
