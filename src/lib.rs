//! # Art-Net Controller
//!
//! Sends and receives DMX512 lighting data over UDP using the Art-Net
//! protocol, and discovers nodes on the network.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Controller (controller)                        │
//! │                                                                         │
//! │  set_dmx_data() ──► DMX buffer ──► send_dmx() ──┐                       │
//! │                                                 │                       │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────▼──────┐                │
//! │  │  Generator  │──►│ Frame Queue  │──►│ Frame Scheduler│──┐             │
//! │  │  (caller)   │   │ (4, drop old)│   │ artnet-frames  │  │             │
//! │  └─────────────┘   └──────────────┘   └────────────────┘  │             │
//! │                                                           ▼             │
//! │                                               ┌─────────────────────┐   │
//! │                                               │  codec::encoder     │   │
//! │                                               │  ArtDmx / ArtPoll   │   │
//! │                                               └──────────┬──────────┘   │
//! │                                                          │              │
//! │  ┌────────────────────────────────────────────────────────▼──────────┐  │
//! │  │            NetworkInterface (network::udp) - Single Socket        │  │
//! │  └────────────────────────────────────────────────────────┬──────────┘  │
//! │                                                          │              │
//! │  ┌───────────────────────────────────────────────────────▼───────────┐  │
//! │  │            Receive Dispatcher (network::receiver) artnet-receive  │  │
//! │  │   ArtDmx ──► filter ──► data callback                             │  │
//! │  │   ArtPoll ──► ArtPollReply unicast to sender                      │  │
//! │  │   ArtPollReply ──► Node Registry (nodes)                          │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod network;
pub mod nodes;
pub mod protocol;
pub mod stats;

pub use config::ControllerConfig;
pub use controller::{Controller, ControllerState};
pub use error::{Error, Result};
pub use network::{channel_callback, DataCallback, NetworkInterface, ReceivedDmx};
pub use nodes::NodeInfo;
pub use protocol::PortAddress;

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default output rate in frames per second
    pub const DEFAULT_FRAME_RATE: u32 = 40;

    /// Socket read timeout; bounds how long stop() waits for the receive thread
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

    /// Pause after a receive error before retrying
    pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(10);
}
