//! Per-connection I/O: one reader thread draining the socket into HCI commands, one writer
//! thread draining a queue of outbound event frames onto the same socket.
//!
//! Grounded in `server/src/client_socket.cpp`'s buffer handling, adapted from its single
//! `select`-driven reactor to a thread pair since std has no cheap multiplexing primitive in this
//! dependency stack (see the design notes on the TCP framing layer).

use log::{info, warn};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use vble_core::config::ServerConfig;
use vble_core::hci::codec::{extract_frame, FrameResult};
use vble_core::hci::dispatcher::dispatch;
use vble_core::{Controller, Scheduler};

/// Read and write buffers grow in this increment.
const BUFFER_CHUNK: usize = 64 * 1024;

pub fn handle(stream: TcpStream, scheduler: Arc<Scheduler>, config: &ServerConfig) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let (peer_addr, peer_port) = bd_addr_components(peer);
    info!("accepted connection from {}", peer);

    let writer_stream = stream.try_clone()?;
    let (tx, rx) = mpsc::channel::<Vec<u8>>();

    let start_time_ticks = scheduler.now().raw_nanos() as u32;
    let controller = Controller::new(peer_addr, peer_port, start_time_ticks, config.deterministic_seed, tx.clone());
    let handle = scheduler.register(controller);

    let writer = thread::spawn(move || run_writer(writer_stream, rx));

    let result = run_reader(stream, &scheduler, handle, tx);

    // Two-phase teardown: mark delete-pending now so the scheduler stops polling this
    // controller and its next iteration drops it from the registry.
    scheduler.with_controller(handle, Controller::set_delete_pending);
    let _ = writer.join();

    result
}

fn run_reader(mut stream: TcpStream, scheduler: &Scheduler, handle: u64, tx: Sender<Vec<u8>>) -> io::Result<()> {
    let mut buf = Vec::with_capacity(BUFFER_CHUNK);
    let mut chunk = vec![0u8; BUFFER_CHUNK];

    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            info!("peer closed the connection");
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        loop {
            let (reply, consumed) = match extract_frame(&buf) {
                FrameResult::Incomplete => break,
                FrameResult::Invalid => {
                    warn!("protocol violation on read, closing connection");
                    return Ok(());
                }
                FrameResult::Command { command, consumed } => {
                    let start_time_ticks = scheduler.now().raw_nanos() as u32;
                    let reply = scheduler.with_controller(handle, |controller| {
                        dispatch(controller, &command, start_time_ticks)
                    });
                    (reply, consumed)
                }
            };
            buf.drain(..consumed);
            match reply {
                Some(reply) => {
                    if tx.send(reply).is_err() {
                        return Ok(());
                    }
                }
                None => {
                    // The controller was already torn down from under us.
                    return Ok(());
                }
            }
        }
    }
}

fn run_writer(mut stream: TcpStream, rx: mpsc::Receiver<Vec<u8>>) {
    while let Ok(bytes) = rx.recv() {
        if let Err(e) = stream.write_all(&bytes) {
            warn!("write failed, closing connection: {}", e);
            break;
        }
    }
}

/// Derives the `(peer_addr, peer_port)` pair the BD_ADDR formula expects. An IPv6 peer (not
/// BLE-addressable in reality) falls back to its low 32 bits, purely so local testing over `::1`
/// still produces a usable device address.
fn bd_addr_components(peer: SocketAddr) -> (u32, u16) {
    match peer {
        SocketAddr::V4(v4) => (u32::from(*v4.ip()), v4.port()),
        SocketAddr::V6(v6) => {
            let octets = v6.ip().octets();
            let low32 = u32::from_be_bytes([octets[12], octets[13], octets[14], octets[15]]);
            (low32, v6.port())
        }
    }
}
