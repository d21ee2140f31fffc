//! Art-Net packet codec
//!
//! Explicit field-by-field serialization of ArtDmx, ArtPoll and
//! ArtPollReply. Nothing here depends on in-memory struct layout or host
//! endianness, and nothing performs I/O.

pub mod decoder;
pub mod encoder;

pub use decoder::{decode_dmx, decode_header, decode_poll, decode_poll_reply, DmxPacket, Header, PollPacket};
pub use encoder::{encode_dmx, encode_poll, encode_poll_reply, ReplyContext, SequenceCounter};

use std::net::Ipv4Addr;

/// Every field of an ArtPollReply, in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReply {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub version_info: u16,
    pub net_switch: u8,
    pub sub_switch: u8,
    pub oem: u16,
    pub ubea_version: u8,
    pub status1: u8,
    pub esta_manufacturer: u16,
    pub short_name: String,
    pub long_name: String,
    pub node_report: String,
    pub num_ports: u16,
    pub port_types: [u8; 4],
    pub good_input: [u8; 4],
    pub good_output_a: [u8; 4],
    pub sw_in: [u8; 4],
    pub sw_out: [u8; 4],
    pub acn_priority: u8,
    pub sw_macro: u8,
    pub sw_remote: u8,
    pub style: u8,
    pub mac: [u8; 6],
    pub bind_ip: Ipv4Addr,
    pub bind_index: u8,
    pub status2: u8,
    pub good_output_b: [u8; 4],
    pub status3: u8,
    pub default_responder: [u8; 6],
    pub user: u16,
    pub refresh_rate: u16,
    pub background_queue_policy: u8,
}

impl Default for PollReply {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            port: crate::protocol::ARTNET_PORT,
            version_info: 0,
            net_switch: 0,
            sub_switch: 0,
            oem: 0,
            ubea_version: 0,
            status1: 0,
            esta_manufacturer: 0,
            short_name: String::new(),
            long_name: String::new(),
            node_report: String::new(),
            num_ports: 0,
            port_types: [0; 4],
            good_input: [0; 4],
            good_output_a: [0; 4],
            sw_in: [0; 4],
            sw_out: [0; 4],
            acn_priority: 0,
            sw_macro: 0,
            sw_remote: 0,
            style: 0,
            mac: [0; 6],
            bind_ip: Ipv4Addr::UNSPECIFIED,
            bind_index: 0,
            status2: 0,
            good_output_b: [0; 4],
            status3: 0,
            default_responder: [0; 6],
            user: 0,
            refresh_rate: 0,
            background_queue_policy: 0,
        }
    }
}

/// Width of the ShortName field, terminator included
pub const SHORT_NAME_LEN: usize = 18;

/// Width of the LongName field, terminator included
pub const LONG_NAME_LEN: usize = 64;

/// Width of the NodeReport field, terminator included
pub const NODE_REPORT_LEN: usize = 64;
