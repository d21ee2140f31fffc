//! Network subsystem for Art-Net transport

pub mod memory;
pub mod receiver;
pub mod udp;

pub use memory::{MemoryNetwork, SentPacket};
pub use receiver::{channel_callback, CallbackSlot, DataCallback, Dispatch, ReceiveDispatcher, ReceivedDmx};
pub use udp::{create_socket, local_ip_for, NetworkInterface, UdpTransport};
