//! Art-Net wire constants and addressing
//!
//! Packet layouts live in [`crate::codec`]; this module only holds the
//! values shared by the encoder, the decoder and the controller.

pub mod address;

pub use address::{pack, unpack, PortAddress};

/// Packet identifier: "Art-Net" followed by a zero byte
pub const ARTNET_ID: [u8; 8] = *b"Art-Net\0";

/// Default UDP port for all Art-Net traffic
pub const ARTNET_PORT: u16 = 6454;

/// Protocol revision carried in every versioned packet
pub const PROTOCOL_VERSION: u16 = 14;

/// Identifier plus opcode plus protocol version
pub const HEADER_SIZE: usize = 12;

/// Fixed part of an ArtDmx packet preceding the channel data
pub const DMX_HEADER_SIZE: usize = 18;

/// Maximum number of DMX512 channels in one universe
pub const MAX_DMX_SIZE: usize = 512;

/// Encoded size of the ArtPoll packet this controller sends
pub const POLL_SIZE: usize = 22;

/// Shortest ArtPoll a node may send (identifier through DiagPriority)
pub const POLL_MIN_SIZE: usize = 14;

/// Full ArtPollReply size including trailing filler
pub const POLL_REPLY_SIZE: usize = 239;

/// Shortest legal ArtPollReply (identifier through MAC address)
pub const POLL_REPLY_MIN_SIZE: usize = 207;

/// Largest datagram the receive loop accepts
pub const MAX_PACKET_SIZE: usize = 2048;

/// Packet kind carried in bytes 8..10 (low byte first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Poll,
    PollReply,
    DiagData,
    Command,
    DataRequest,
    DataReply,
    Dmx,
    Nzs,
    Sync,
    Address,
    Input,
    TodRequest,
    TodData,
    TodControl,
    Rdm,
    RdmSub,
    /// Anything this controller has no name for
    Unknown(u16),
}

impl OpCode {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x2000 => OpCode::Poll,
            0x2100 => OpCode::PollReply,
            0x2300 => OpCode::DiagData,
            0x2400 => OpCode::Command,
            0x2700 => OpCode::DataRequest,
            0x2800 => OpCode::DataReply,
            0x5000 => OpCode::Dmx,
            0x5100 => OpCode::Nzs,
            0x5200 => OpCode::Sync,
            0x6000 => OpCode::Address,
            0x7000 => OpCode::Input,
            0x8000 => OpCode::TodRequest,
            0x8100 => OpCode::TodData,
            0x8200 => OpCode::TodControl,
            0x8300 => OpCode::Rdm,
            0x8400 => OpCode::RdmSub,
            other => OpCode::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            OpCode::Poll => 0x2000,
            OpCode::PollReply => 0x2100,
            OpCode::DiagData => 0x2300,
            OpCode::Command => 0x2400,
            OpCode::DataRequest => 0x2700,
            OpCode::DataReply => 0x2800,
            OpCode::Dmx => 0x5000,
            OpCode::Nzs => 0x5100,
            OpCode::Sync => 0x5200,
            OpCode::Address => 0x6000,
            OpCode::Input => 0x7000,
            OpCode::TodRequest => 0x8000,
            OpCode::TodData => 0x8100,
            OpCode::TodControl => 0x8200,
            OpCode::Rdm => 0x8300,
            OpCode::RdmSub => 0x8400,
            OpCode::Unknown(value) => value,
        }
    }

    /// Wire representation, low byte first
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.as_u16().to_le_bytes()
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpCode::Unknown(value) => write!(f, "Op({:#06x})", value),
            other => write!(f, "{:?}", other),
        }
    }
}
