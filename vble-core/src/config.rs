//! Configuration shared between the TCP accept loop and the scheduler.
//!
//! This plays the role the hardware-facing `Config` trait plays in an embedded BLE stack --
//! binding together the pieces a concrete deployment supplies -- but since every deployment of
//! this controller is the same std TCP server, a plain struct is enough; there's no hardware
//! abstraction to generalise over.

/// TCP port the virtual HCI controller listens on (`0xB1EE`).
pub const DEFAULT_PORT: u16 = 0xB1EE;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the HCI listener on.
    pub bind_addr: std::net::IpAddr,
    pub port: u16,
    /// Fixes the jitter RNG seed for every connection, for reproducible tests; `None` seeds
    /// from each connection's peer address/port instead.
    pub deterministic_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            deterministic_seed: None,
        }
    }
}
