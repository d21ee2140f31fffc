//! Art-Net packet encoders

use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::codec::{PollReply, LONG_NAME_LEN, NODE_REPORT_LEN, SHORT_NAME_LEN};
use crate::config::ControllerConfig;
use crate::error::ValidationError;
use crate::protocol::{
    OpCode, PortAddress, ARTNET_ID, DMX_HEADER_SIZE, MAX_DMX_SIZE, POLL_REPLY_SIZE, POLL_SIZE,
    PROTOCOL_VERSION,
};

/// PortTypes bits: can output from and input onto the network
const PORT_TYPE_OUTPUT: u8 = 0x80;
const PORT_TYPE_INPUT: u8 = 0x40;

/// Status2 bit: node supports 15-bit Port-Addresses
const STATUS2_PORT_ADDRESS_15: u8 = 0x08;

/// Style code for a controller (StController)
const STYLE_CONTROLLER: u8 = 0x01;

/// ArtDmx sequence number, wrapping through 0..=255
///
/// Post-increments on every encoded packet. Atomic so that a controller
/// sending from both the caller thread and the scheduler stays memory safe;
/// interleaving between the two writers is still up to the caller.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU8,
}

impl SequenceCounter {
    pub fn new(initial: u8) -> Self {
        Self {
            next: AtomicU8::new(initial),
        }
    }

    /// Take the current value and advance
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next packet will carry
    pub fn peek(&self) -> u8 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Addressing information the reply cannot learn from the identity alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    /// Address advertised in the IP and BindIp fields
    pub local_ip: Ipv4Addr,
}

fn put_header(buf: &mut BytesMut, opcode: OpCode) {
    buf.put_slice(&ARTNET_ID);
    buf.put_slice(&opcode.to_le_bytes());
}

/// Fixed-width, zero padded, always null terminated ASCII field
fn put_fixed_str(buf: &mut BytesMut, value: &str, width: usize) {
    let mut written = 0;
    for ch in value.chars().take(width - 1) {
        buf.put_u8(if ch.is_ascii() { ch as u8 } else { b'?' });
        written += 1;
    }
    buf.put_bytes(0, width - written);
}

/// Build an ArtDmx packet
///
/// Payloads over 512 bytes are rejected before anything is encoded, and the
/// sequence counter is left untouched in that case.
pub fn encode_dmx(
    sequence: &SequenceCounter,
    address: PortAddress,
    payload: &[u8],
) -> Result<Bytes, ValidationError> {
    if payload.len() > MAX_DMX_SIZE {
        return Err(ValidationError::PayloadTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(DMX_HEADER_SIZE + payload.len());
    put_header(&mut buf, OpCode::Dmx);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(sequence.next());
    buf.put_u8(0); // physical port
    buf.put_u8(address.sub_uni());
    buf.put_u8(address.net());
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Build an ArtPoll with all flags, targets and codes zeroed
pub fn encode_poll() -> Bytes {
    let mut buf = BytesMut::with_capacity(POLL_SIZE);
    put_header(&mut buf, OpCode::Poll);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(0); // flags
    buf.put_u8(0); // diag priority
    buf.put_u16(0); // target port address top
    buf.put_u16(0); // target port address bottom
    buf.put_u16(0); // ESTA manufacturer
    buf.put_u16(0); // OEM
    debug_assert_eq!(buf.len(), POLL_SIZE);
    buf.freeze()
}

impl PollReply {
    /// Reply describing a controller with the given identity
    pub fn from_identity(identity: &ControllerConfig, context: &ReplyContext) -> Self {
        let address = identity.address;
        let mut reply = PollReply {
            ip: context.local_ip,
            port: identity.port,
            net_switch: address.net(),
            sub_switch: address.subnet(),
            oem: identity.oem,
            esta_manufacturer: identity.esta_manufacturer,
            short_name: identity.short_name.clone(),
            long_name: identity.long_name.clone(),
            node_report: identity.node_report.clone(),
            num_ports: 1,
            style: STYLE_CONTROLLER,
            mac: identity.mac,
            bind_ip: context.local_ip,
            bind_index: 1,
            status2: STATUS2_PORT_ADDRESS_15,
            ..Default::default()
        };
        reply.port_types[0] = PORT_TYPE_OUTPUT | PORT_TYPE_INPUT;
        reply.sw_in[0] = address.universe();
        reply.sw_out[0] = address.universe();
        reply
    }

    /// Serialize to the full 239-byte layout
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(POLL_REPLY_SIZE);
        put_header(&mut buf, OpCode::PollReply);
        buf.put_slice(&self.ip.octets());
        buf.put_u16(self.port);
        buf.put_u16(self.version_info);
        buf.put_u8(self.net_switch);
        buf.put_u8(self.sub_switch);
        buf.put_u16(self.oem);
        buf.put_u8(self.ubea_version);
        buf.put_u8(self.status1);
        buf.put_u16(self.esta_manufacturer);
        put_fixed_str(&mut buf, &self.short_name, SHORT_NAME_LEN);
        put_fixed_str(&mut buf, &self.long_name, LONG_NAME_LEN);
        put_fixed_str(&mut buf, &self.node_report, NODE_REPORT_LEN);
        buf.put_u16(self.num_ports);
        buf.put_slice(&self.port_types);
        buf.put_slice(&self.good_input);
        buf.put_slice(&self.good_output_a);
        buf.put_slice(&self.sw_in);
        buf.put_slice(&self.sw_out);
        buf.put_u8(self.acn_priority);
        buf.put_u8(self.sw_macro);
        buf.put_u8(self.sw_remote);
        buf.put_bytes(0, 3); // spare
        buf.put_u8(self.style);
        buf.put_slice(&self.mac);
        buf.put_slice(&self.bind_ip.octets());
        buf.put_u8(self.bind_index);
        buf.put_u8(self.status2);
        buf.put_slice(&self.good_output_b);
        buf.put_u8(self.status3);
        buf.put_slice(&self.default_responder);
        buf.put_u16(self.user);
        buf.put_u16(self.refresh_rate);
        buf.put_u8(self.background_queue_policy);
        buf.put_bytes(0, 10); // filler
        debug_assert_eq!(buf.len(), POLL_REPLY_SIZE);
        buf.freeze()
    }
}

/// Build the ArtPollReply this controller answers an ArtPoll with
pub fn encode_poll_reply(identity: &ControllerConfig, context: &ReplyContext) -> Bytes {
    PollReply::from_identity(identity, context).encode()
}
