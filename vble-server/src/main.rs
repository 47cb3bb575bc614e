//! Accepts TCP connections, each one a simulated BLE controller bound to a host; runs the shared
//! physical-layer scheduler on its own thread so every controller advertises/scans against the
//! same virtual RF medium.

mod connection;

use clap::Parser;
use log::{info, warn};
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::thread;
use vble_core::config::{ServerConfig, DEFAULT_PORT};
use vble_core::Scheduler;

#[derive(Parser, Debug)]
#[clap(name = "vble-server", about = "Virtual Bluetooth Low Energy controller server")]
struct Cli {
    /// Address to listen on.
    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// TCP port to listen on.
    #[clap(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Pin every connection's jitter RNG to this seed, for reproducible runs.
    #[clap(long)]
    deterministic_seed: Option<u64>,
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = ServerConfig {
        bind_addr: cli.bind,
        port: cli.port,
        deterministic_seed: cli.deterministic_seed,
    };

    let scheduler = Arc::new(Scheduler::new());
    {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || scheduler.run_forever());
    }

    let listener = TcpListener::bind((config.bind_addr, config.port))?;
    info!("listening on {}", listener.local_addr()?);

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let scheduler = Arc::clone(&scheduler);
        let config = config.clone();
        thread::spawn(move || {
            if let Err(e) = connection::handle(stream, scheduler, &config) {
                warn!("connection error: {}", e);
            }
        });
    }

    Ok(())
}
