//! Node registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::Ipv4Addr;

use crate::codec::PollReply;
use crate::protocol::PortAddress;

/// PortTypes bits describing port direction
const PORT_OUTPUTS_FROM_NETWORK: u8 = 0x80;
const PORT_INPUTS_TO_NETWORK: u8 = 0x40;

/// A peer learned from discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub oem: u16,
    pub esta_manufacturer: u16,
    pub net: u8,
    pub subnet: u8,
    pub short_name: String,
    pub long_name: String,
    pub node_report: String,
    pub mac: [u8; 6],
    /// Port-Addresses of the node's active input and output ports
    pub subscribed_universes: Vec<PortAddress>,
    pub last_seen: DateTime<Utc>,
}

impl NodeInfo {
    pub fn from_poll_reply(reply: &PollReply) -> Self {
        let ports = (reply.num_ports as usize).min(4);
        let mut universes = Vec::with_capacity(ports * 2);
        for i in 0..ports {
            let kind = reply.port_types[i];
            if kind & PORT_OUTPUTS_FROM_NETWORK != 0 {
                universes.push(PortAddress::new(reply.net_switch, reply.sub_switch, reply.sw_out[i]));
            }
            if kind & PORT_INPUTS_TO_NETWORK != 0 {
                universes.push(PortAddress::new(reply.net_switch, reply.sub_switch, reply.sw_in[i]));
            }
        }
        universes.sort();
        universes.dedup();

        Self {
            ip: reply.ip,
            port: reply.port,
            oem: reply.oem,
            esta_manufacturer: reply.esta_manufacturer,
            net: reply.net_switch,
            subnet: reply.sub_switch,
            short_name: reply.short_name.clone(),
            long_name: reply.long_name.clone(),
            node_report: reply.node_report.clone(),
            mac: reply.mac,
            subscribed_universes: universes,
            last_seen: Utc::now(),
        }
    }

    /// True when one of the node's ports uses `address`
    pub fn subscribes_to(&self, address: PortAddress) -> bool {
        self.subscribed_universes.iter().any(|u| u.matches(address))
    }
}

/// Concurrent map of discovered nodes
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<Ipv4Addr, NodeInfo>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `ip`; returns true for a new node
    pub fn upsert(&self, ip: Ipv4Addr, info: NodeInfo) -> bool {
        self.nodes.insert(ip, info).is_none()
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<NodeInfo> {
        self.nodes.get(&ip).map(|entry| entry.value().clone())
    }

    /// All nodes, ordered by IP
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.nodes.iter().map(|entry| entry.value().clone()).collect();
        nodes.sort_by_key(|node| node.ip);
        nodes
    }

    /// Nodes with a port on `address`
    pub fn interested_in(&self, address: PortAddress) -> Vec<NodeInfo> {
        self.nodes()
            .into_iter()
            .filter(|node| node.subscribes_to(address))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&self) {
        self.nodes.clear();
    }
}
