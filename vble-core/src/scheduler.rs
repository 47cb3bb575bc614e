//! The shared physical-layer scheduler: one time-stepped loop that polls every registered radio
//! for its next packet, advances a simulated clock, detects per-channel collisions, and
//! delivers received PDUs to overlapping receivers.

use crate::controller::{Controller, RadioSource};
use crate::link::state_machine::{Direction, PhysicalPacket};
use crate::time::{Duration, Instant};
use log::trace;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

/// Number of RF channels tracked for collision bookkeeping (37 advertising + data channels,
/// even though only the advertising channels are ever scheduled in this core).
const NUM_CHANNELS: usize = 40;

/// Default sleep between scheduler iterations when nothing is transmitting.
const IDLE_SLEEP_TICKS: i64 = 12_500;
/// Sleep while at least one transmission is pending, to catch its start/end promptly.
const BUSY_SLEEP_TICKS: i64 = 1_250;
/// Extra real time added to every sleep, covering scheduling jitter in the host OS.
const SLEEP_SLACK_TICKS: i64 = 1_010;

/// A controller registered with the scheduler, identified by an opaque handle so entries can be
/// removed without invalidating other handles.
struct Slot {
    handle: u64,
    controller: Controller,
    current: Option<PhysicalPacket>,
}

/// Global scheduler state, protected by one mutex -- the "global mutex" the concurrency model
/// describes, shared between the scheduler thread and whichever connection thread dispatches an
/// HCI command against one of the registered controllers. There is deliberately only the one
/// lock: a connection handling `LE Set Advertising Parameters` and the scheduler thread about to
/// poll that same controller for its next packet must never observe a half-mutated `LinkLayer`.
pub struct Scheduler {
    inner: Mutex<Inner>,
}

struct Inner {
    clock: Instant,
    slots: Vec<Slot>,
    next_handle: u64,
    transmitting: [u32; NUM_CHANNELS],
    bad_transmission: [bool; NUM_CHANNELS],
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            inner: Mutex::new(Inner {
                clock: Instant::ZERO,
                slots: Vec::new(),
                next_handle: 1,
                transmitting: [0; NUM_CHANNELS],
                bad_transmission: [false; NUM_CHANNELS],
            }),
        }
    }

    /// Registers a controller, returning a handle to unregister it with later.
    pub fn register(&self, controller: Controller) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.slots.push(Slot { handle, controller, current: None });
        handle
    }

    /// Removes a controller. Safe to call even if it already marked itself delete-pending and
    /// was removed by the scheduler loop itself; a handle that's no longer present is a no-op.
    pub fn unregister(&self, handle: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.retain(|s| s.handle != handle);
    }

    /// The scheduler's current simulated time, for callers (e.g. the HCI dispatcher) that need
    /// a timestamp but aren't themselves driving the scheduling loop.
    pub fn now(&self) -> Instant {
        self.inner.lock().unwrap().clock
    }

    /// Runs `f` against the registered controller's HCI/link-layer state under the global lock.
    /// This is how a connection thread handling an incoming command mutates state the scheduler
    /// thread also reads, without a second, controller-local mutex. Returns `None` if `handle`
    /// has already been torn down.
    pub fn with_controller<R>(&self, handle: u64, f: impl FnOnce(&mut Controller) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.slots.iter_mut().find(|s| s.handle == handle)?;
        Some(f(&mut slot.controller))
    }

    /// Runs one scheduling iteration: poll, order, advance, deliver. Returns the real-time
    /// sleep duration the caller should wait before calling again.
    pub fn step(&self) -> StdDuration {
        let mut inner = self.inner.lock().unwrap();
        inner.step()
    }

    /// Runs the scheduler loop forever (intended to be the body of the dedicated scheduler
    /// thread). Never returns.
    pub fn run_forever(&self) -> ! {
        loop {
            let sleep_for = self.step();
            std::thread::sleep(sleep_for);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn step(&mut self) -> StdDuration {
        // Remove any controller that asked to be torn down since the last iteration.
        self.slots.retain(|s| !s.controller.is_delete_pending());

        for slot in &mut self.slots {
            if slot.current.is_none() {
                slot.current = slot.controller.get_next_packet(self.clock);
            }
        }

        let mut transmitter_indices: Vec<usize> = (0..self.slots.len())
            .filter(|&i| matches!(self.slots[i].current.as_ref().map(|p| p.direction), Some(Direction::Tx)))
            .collect();
        transmitter_indices.sort_by_key(|&i| self.slots[i].current.as_ref().unwrap().start_time);

        let mut receiver_indices: Vec<usize> = (0..self.slots.len())
            .filter(|&i| matches!(self.slots[i].current.as_ref().map(|p| p.direction), Some(Direction::Rx)))
            .collect();
        receiver_indices.sort_by_key(|&i| self.slots[i].current.as_ref().unwrap().start_time);

        let mut dt = IDLE_SLEEP_TICKS;
        if !transmitter_indices.is_empty() {
            dt = dt.min(BUSY_SLEEP_TICKS);
        }

        let mut completed_tx = Vec::new();
        for &i in &transmitter_indices {
            let pkt = self.slots[i].current.as_ref().unwrap().clone();
            if pkt.end_time == self.clock {
                let channel = pkt.channel as usize;
                if !self.bad_transmission[channel] {
                    for &j in &receiver_indices {
                        let rx = self.slots[j].current.as_ref().unwrap();
                        if rx.start_time <= pkt.start_time
                            && rx.end_time >= pkt.start_time + Duration::from_nanos(40)
                            && rx.channel == pkt.channel
                        {
                            completed_tx.push((j, Some(pkt.pdu.clone())));
                        }
                    }
                }
                self.transmitting[channel] = self.transmitting[channel].saturating_sub(1);
                if self.transmitting[channel] == 0 {
                    self.bad_transmission[channel] = false;
                }
                completed_tx.push((i, None));
                dt = dt.min(1);
            } else if pkt.start_time < self.clock && self.clock < pkt.end_time {
                dt = dt.min((pkt.end_time - self.clock).as_nanos());
            } else if pkt.start_time == self.clock {
                self.transmitting[pkt.channel as usize] += 1;
                if self.transmitting[pkt.channel as usize] >= 2 {
                    self.bad_transmission[pkt.channel as usize] = true;
                }
                dt = dt.min((pkt.end_time - self.clock).as_nanos());
            } else if pkt.start_time > self.clock {
                dt = dt.min((pkt.start_time - self.clock).as_nanos());
            }
        }

        let mut completed_rx = Vec::new();
        for &i in &receiver_indices {
            let pkt = self.slots[i].current.as_ref().unwrap().clone();
            if pkt.end_time == self.clock {
                completed_rx.push(i);
                dt = dt.min(1);
            } else if (pkt.start_time < self.clock && self.clock < pkt.end_time) || pkt.start_time == self.clock {
                dt = dt.min((pkt.end_time - self.clock).as_nanos());
            } else if pkt.start_time > self.clock {
                dt = dt.min((pkt.start_time - self.clock).as_nanos());
            }
        }

        // Deliveries are applied after scanning every packet so a receiver can be hit by
        // multiple transmitters ending at this tick before its own completion fires.
        for (i, rx_data) in completed_tx {
            let machine_index = self.slots[i].current.as_ref().unwrap().machine_index;
            self.slots[i]
                .controller
                .end_of_packet(machine_index, rx_data.as_deref());
            if rx_data.is_none() {
                self.slots[i].current = None;
            }
        }
        for i in completed_rx {
            // Only finalise receivers that weren't already delivered to above (their `current`
            // would have been cleared by a matching Tx completion only once we clear it here).
            if let Some(pkt) = self.slots[i].current.take() {
                self.slots[i].controller.end_of_packet(pkt.machine_index, None);
            }
        }

        self.clock += Duration::from_nanos(dt);
        trace!("scheduler advanced to {}", self.clock);

        StdDuration::from_nanos((dt + SLEEP_SLACK_TICKS).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn advertiser(peer_port: u16, data: Vec<u8>) -> (Controller, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let mut c = Controller::new(0x7F000001, peer_port, 0, Some(0), tx);
        c.link.enable_advertising();
        c.link.advertising_data = data;
        (c, rx)
    }

    fn scanner(peer_port: u16) -> (Controller, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let mut c = Controller::new(0x7F000001, peer_port, 0, Some(0), tx);
        c.link.enable_scanning();
        (c, rx)
    }

    fn slot(handle: u64, controller: Controller) -> Slot {
        Slot { handle, controller, current: None }
    }

    /// Two advertisers whose first packets collide on channel 37 must not be delivered to a
    /// scanner sharing the same medium, even though each transmitter completes normally.
    #[test]
    fn colliding_advertisers_are_received_by_neither_scanner() {
        let (a, _a_rx) = advertiser(1, vec![0xAA]);
        let (b, _b_rx) = advertiser(2, vec![0xBB]);
        let (c, c_rx) = scanner(3);

        let mut inner = Inner {
            clock: Instant::from_raw_nanos(-1),
            slots: vec![slot(1, a), slot(2, b), slot(3, c)],
            next_handle: 4,
            transmitting: [0; NUM_CHANNELS],
            bad_transmission: [false; NUM_CHANNELS],
        };

        for _ in 0..50 {
            inner.step();
        }

        assert!(c_rx.try_recv().is_err(), "colliding PDUs must not be delivered to the scanner");
    }

    /// With only one advertiser sharing the medium, the scanner behind it does receive a report --
    /// the control case confirming the collision above is a property of the overlap, not of the
    /// scheduler dropping every packet regardless.
    #[test]
    fn single_advertiser_is_received_by_a_scanner() {
        let (a, _a_rx) = advertiser(1, vec![0xAA]);
        let (c, c_rx) = scanner(3);

        let mut inner = Inner {
            clock: Instant::from_raw_nanos(-1),
            slots: vec![slot(1, a), slot(3, c)],
            next_handle: 4,
            transmitting: [0; NUM_CHANNELS],
            bad_transmission: [false; NUM_CHANNELS],
        };

        for _ in 0..50 {
            inner.step();
        }

        assert!(c_rx.try_recv().is_ok(), "a lone advertiser's packet should reach the scanner");
    }
}
