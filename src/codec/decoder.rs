//! Art-Net packet decoders
//!
//! Every decoder validates length and identifier before touching a field, so
//! arbitrary network input yields an error rather than a panic.

use std::net::Ipv4Addr;

use crate::codec::{PollReply, LONG_NAME_LEN, NODE_REPORT_LEN, SHORT_NAME_LEN};
use crate::error::ValidationError;
use crate::protocol::{
    OpCode, PortAddress, ARTNET_ID, DMX_HEADER_SIZE, HEADER_SIZE, MAX_DMX_SIZE, POLL_MIN_SIZE,
    POLL_REPLY_MIN_SIZE,
};

/// Common packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: OpCode,
}

/// Borrowed view of a decoded ArtDmx packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmxPacket<'a> {
    pub sequence: u8,
    pub physical: u8,
    pub address: PortAddress,
    pub data: &'a [u8],
}

/// Decoded ArtPoll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPacket {
    pub version: u16,
    pub flags: u8,
    pub diag_priority: u8,
}

fn require(bytes: &[u8], expected: usize) -> Result<(), ValidationError> {
    if bytes.len() < expected {
        return Err(ValidationError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn expect_opcode(bytes: &[u8], opcode: OpCode) -> Result<(), ValidationError> {
    let header = decode_header(bytes)?;
    if header.opcode != opcode {
        return Err(ValidationError::UnexpectedOpCode(header.opcode.as_u16()));
    }
    Ok(())
}

/// Validate the identifier and extract the opcode
pub fn decode_header(bytes: &[u8]) -> Result<Header, ValidationError> {
    require(bytes, HEADER_SIZE)?;
    if bytes[..8] != ARTNET_ID {
        return Err(ValidationError::InvalidMagic);
    }
    let opcode = OpCode::from_u16(u16::from_le_bytes([bytes[8], bytes[9]]));
    Ok(Header { opcode })
}

/// Decode an ArtDmx packet
///
/// The Length field must fit inside the datagram; trailing bytes beyond it
/// are ignored.
pub fn decode_dmx(bytes: &[u8]) -> Result<DmxPacket<'_>, ValidationError> {
    expect_opcode(bytes, OpCode::Dmx)?;
    require(bytes, DMX_HEADER_SIZE)?;

    let declared = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
    if declared > MAX_DMX_SIZE {
        return Err(ValidationError::PayloadTooLarge(declared));
    }
    let available = bytes.len() - DMX_HEADER_SIZE;
    if declared > available {
        return Err(ValidationError::LengthMismatch { declared, available });
    }

    Ok(DmxPacket {
        sequence: bytes[12],
        physical: bytes[13],
        address: PortAddress::from_wire(bytes[14], bytes[15]),
        data: &bytes[DMX_HEADER_SIZE..DMX_HEADER_SIZE + declared],
    })
}

/// Decode an ArtPoll; only the mandatory leading fields are read
pub fn decode_poll(bytes: &[u8]) -> Result<PollPacket, ValidationError> {
    expect_opcode(bytes, OpCode::Poll)?;
    require(bytes, POLL_MIN_SIZE)?;
    Ok(PollPacket {
        version: u16::from_be_bytes([bytes[10], bytes[11]]),
        flags: bytes[12],
        diag_priority: bytes[13],
    })
}

/// Sequential reader yielding zeros for optional fields past the end
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn u8(&mut self) -> u8 {
        let value = self.bytes.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        value
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        for slot in out.iter_mut() {
            *slot = self.u8();
        }
        out
    }

    fn u16_be(&mut self) -> u16 {
        u16::from_be_bytes(self.array())
    }

    fn ipv4(&mut self) -> Ipv4Addr {
        Ipv4Addr::from(self.array::<4>())
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    /// Fixed-width null terminated text
    fn fixed_str(&mut self, width: usize) -> String {
        let start = self.pos.min(self.bytes.len());
        let end = (self.pos + width).min(self.bytes.len());
        self.pos += width;
        let field = &self.bytes[start..end];
        let text = field.split(|b| *b == 0).next().unwrap_or(&[]);
        String::from_utf8_lossy(text).into_owned()
    }
}

/// Decode an ArtPollReply
///
/// Requires the fields up to and including the MAC address; later fields
/// read as zero when a node omits them.
pub fn decode_poll_reply(bytes: &[u8]) -> Result<PollReply, ValidationError> {
    expect_opcode(bytes, OpCode::PollReply)?;
    require(bytes, POLL_REPLY_MIN_SIZE)?;

    let mut r = FieldReader::new(bytes, 10);
    let ip = r.ipv4();
    let port = r.u16_be();
    let version_info = r.u16_be();
    let net_switch = r.u8();
    let sub_switch = r.u8();
    let oem = r.u16_be();
    let ubea_version = r.u8();
    let status1 = r.u8();
    let esta_manufacturer = r.u16_be();
    let short_name = r.fixed_str(SHORT_NAME_LEN);
    let long_name = r.fixed_str(LONG_NAME_LEN);
    let node_report = r.fixed_str(NODE_REPORT_LEN);
    let num_ports = r.u16_be();
    let port_types = r.array();
    let good_input = r.array();
    let good_output_a = r.array();
    let sw_in = r.array();
    let sw_out = r.array();
    let acn_priority = r.u8();
    let sw_macro = r.u8();
    let sw_remote = r.u8();
    r.skip(3);
    let style = r.u8();
    let mac = r.array();
    let bind_ip = r.ipv4();
    let bind_index = r.u8();
    let status2 = r.u8();
    let good_output_b = r.array();
    let status3 = r.u8();
    let default_responder = r.array();
    let user = r.u16_be();
    let refresh_rate = r.u16_be();
    let background_queue_policy = r.u8();

    Ok(PollReply {
        ip,
        port,
        version_info,
        net_switch: net_switch & 0x7F,
        sub_switch: sub_switch & 0x0F,
        oem,
        ubea_version,
        status1,
        esta_manufacturer,
        short_name,
        long_name,
        node_report,
        num_ports,
        port_types,
        good_input,
        good_output_a,
        sw_in,
        sw_out,
        acn_priority,
        sw_macro,
        sw_remote,
        style,
        mac,
        bind_ip,
        bind_index,
        status2,
        good_output_b,
        status3,
        default_responder,
        user,
        refresh_rate,
        background_queue_policy,
    })
}
