//! Protocol and simulation core for the virtual BLE controller server: HCI command/event framing,
//! the link-layer state machines that turn enabled advertising/scanning into physical packets,
//! and the shared discrete-event scheduler that ties every connected controller to one simulated
//! RF medium.
//!
//! The TCP accept loop and connection plumbing live in the `vble-server` binary crate; everything
//! here is transport-agnostic and driven purely through in-memory byte buffers and the scheduler.

pub mod config;
pub mod controller;
pub mod error;
pub mod hci;
pub mod link;
pub mod phy;
pub mod scheduler;
pub mod time;

pub use controller::Controller;
pub use error::{Error, Result};
pub use scheduler::Scheduler;
