//! Port-Address handling
//!
//! A Port-Address is 15 bits: net (7 bits), subnet (4 bits) and universe
//! (4 bits). Out-of-range inputs are masked, never rejected.

use serde::{Deserialize, Serialize};

/// Pack net/subnet/universe into a 15-bit Port-Address
pub fn pack(net: u8, subnet: u8, universe: u8) -> u16 {
    (((net & 0x7F) as u16) << 8) | (((subnet & 0x0F) as u16) << 4) | ((universe & 0x0F) as u16)
}

/// Split a Port-Address into (net, subnet, universe)
pub fn unpack(value: u16) -> (u8, u8, u8) {
    (
        ((value >> 8) & 0x7F) as u8,
        ((value >> 4) & 0x0F) as u8,
        (value & 0x0F) as u8,
    )
}

/// Net/subnet/universe triple identifying one DMX stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawPortAddress", into = "RawPortAddress")]
pub struct PortAddress {
    net: u8,
    subnet: u8,
    universe: u8,
}

impl PortAddress {
    pub fn new(net: u8, subnet: u8, universe: u8) -> Self {
        Self {
            net: net & 0x7F,
            subnet: subnet & 0x0F,
            universe: universe & 0x0F,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        let (net, subnet, universe) = unpack(value);
        Self { net, subnet, universe }
    }

    pub fn to_u16(self) -> u16 {
        pack(self.net, self.subnet, self.universe)
    }

    pub fn net(self) -> u8 {
        self.net
    }

    pub fn subnet(self) -> u8 {
        self.subnet
    }

    pub fn universe(self) -> u8 {
        self.universe
    }

    /// SubUni byte of ArtDmx: subnet in the high nibble
    pub fn sub_uni(self) -> u8 {
        (self.subnet << 4) | self.universe
    }

    /// Rebuild from the ArtDmx SubUni and Net bytes
    pub fn from_wire(sub_uni: u8, net: u8) -> Self {
        Self::new(net, sub_uni >> 4, sub_uni & 0x0F)
    }

    /// True when all three fields are equal
    pub fn matches(self, other: PortAddress) -> bool {
        self.net == other.net && self.subnet == other.subnet && self.universe == other.universe
    }
}

impl std::fmt::Display for PortAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.net, self.subnet, self.universe)
    }
}

/// On-disk form; values are masked when converted back
#[derive(Serialize, Deserialize)]
struct RawPortAddress {
    #[serde(default)]
    net: u8,
    #[serde(default)]
    subnet: u8,
    #[serde(default)]
    universe: u8,
}

impl From<RawPortAddress> for PortAddress {
    fn from(raw: RawPortAddress) -> Self {
        PortAddress::new(raw.net, raw.subnet, raw.universe)
    }
}

impl From<PortAddress> for RawPortAddress {
    fn from(address: PortAddress) -> Self {
        Self {
            net: address.net,
            subnet: address.subnet,
            universe: address.universe,
        }
    }
}
