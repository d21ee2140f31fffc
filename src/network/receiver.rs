//! Receive loop and packet dispatch
//!
//! Reads datagrams, validates them and routes ArtDmx to the data callback,
//! ArtPoll to a unicast ArtPollReply and ArtPollReply to the node registry.
//! Nothing a peer sends can stop the loop.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, TrySendError};
use parking_lot::RwLock;
use std::net::{IpAddr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::codec::{decode_dmx, decode_header, decode_poll, decode_poll_reply, encode_poll_reply, ReplyContext};
use crate::config::ControllerConfig;
use crate::constants::RECEIVE_ERROR_BACKOFF;
use crate::error::ValidationError;
use crate::network::udp::{local_ip_for, NetworkInterface};
use crate::nodes::{NodeInfo, NodeRegistry};
use crate::protocol::{OpCode, PortAddress, MAX_PACKET_SIZE};
use crate::stats::ReceiverStats;

/// Receives (port address, channel data) for matching ArtDmx packets
///
/// Runs on the receive thread and must return quickly.
pub type DataCallback = Arc<dyn Fn(PortAddress, &[u8]) + Send + Sync>;

/// Synchronized holder for the installed [`DataCallback`]
#[derive(Default)]
pub struct CallbackSlot {
    callback: RwLock<Option<DataCallback>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the callback; `None` disables delivery
    pub fn set(&self, callback: Option<DataCallback>) {
        *self.callback.write() = callback;
    }

    pub fn get(&self) -> Option<DataCallback> {
        self.callback.read().clone()
    }
}

/// ArtDmx payload forwarded by [`channel_callback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDmx {
    pub address: PortAddress,
    pub data: Bytes,
}

/// Callback that forwards frames into a bounded channel
///
/// Uses `try_send`, so a slow consumer loses frames instead of stalling
/// reception.
pub fn channel_callback(capacity: usize) -> (DataCallback, Receiver<ReceivedDmx>) {
    let (tx, rx) = bounded(capacity);
    let callback: DataCallback = Arc::new(move |address: PortAddress, data: &[u8]| {
        let frame = ReceivedDmx {
            address,
            data: Bytes::copy_from_slice(data),
        };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("DMX channel full, frame dropped"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    });
    (callback, rx)
}

/// Outcome of dispatching one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// ArtDmx for our address, handed to the callback
    Delivered,
    /// ArtDmx for our address, but no callback installed
    NoCallback,
    /// ArtDmx for a different address
    Filtered(PortAddress),
    /// ArtPoll answered with a reply to this address
    PollAnswered(SocketAddr),
    /// ArtPollReply recorded in the registry
    NodeLearned { new: bool },
    /// Valid packet of a kind this controller does not handle
    Ignored(OpCode),
    /// Malformed packet
    Invalid(ValidationError),
    /// A reply or delivery step failed
    Failed(String),
}

/// Routes inbound datagrams
pub struct ReceiveDispatcher {
    network: Arc<dyn NetworkInterface>,
    identity: Arc<ControllerConfig>,
    nodes: Arc<NodeRegistry>,
    callback: Arc<CallbackSlot>,
    stats: Arc<ReceiverStats>,
}

impl ReceiveDispatcher {
    pub fn new(
        network: Arc<dyn NetworkInterface>,
        identity: Arc<ControllerConfig>,
        nodes: Arc<NodeRegistry>,
        callback: Arc<CallbackSlot>,
        stats: Arc<ReceiverStats>,
    ) -> Self {
        Self {
            network,
            identity,
            nodes,
            callback,
            stats,
        }
    }

    /// Validate and route one datagram
    pub fn dispatch(&self, datagram: &[u8], from: SocketAddr) -> Dispatch {
        self.stats.record_packet(datagram.len());

        let header = match decode_header(datagram) {
            Ok(header) => header,
            Err(e) => return self.invalid(e, from),
        };

        match header.opcode {
            OpCode::Dmx => self.handle_dmx(datagram, from),
            OpCode::Poll => self.handle_poll(datagram, from),
            OpCode::PollReply => self.handle_poll_reply(datagram, from),
            other => {
                tracing::trace!("Ignoring {} from {}", other, from);
                Dispatch::Ignored(other)
            }
        }
    }

    fn invalid(&self, error: ValidationError, from: SocketAddr) -> Dispatch {
        self.stats.record_invalid();
        tracing::trace!("Dropping packet from {}: {}", from, error);
        Dispatch::Invalid(error)
    }

    fn handle_dmx(&self, datagram: &[u8], from: SocketAddr) -> Dispatch {
        let packet = match decode_dmx(datagram) {
            Ok(packet) => packet,
            Err(e) => return self.invalid(e, from),
        };

        if !self.identity.address.matches(packet.address) {
            self.stats.record_filtered();
            return Dispatch::Filtered(packet.address);
        }

        let Some(callback) = self.callback.get() else {
            return Dispatch::NoCallback;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| callback(packet.address, packet.data))) {
            Ok(()) => {
                self.stats.record_delivered();
                Dispatch::Delivered
            }
            Err(_) => {
                tracing::error!("DMX data callback panicked");
                Dispatch::Failed("data callback panicked".to_string())
            }
        }
    }

    fn handle_poll(&self, datagram: &[u8], from: SocketAddr) -> Dispatch {
        if let Err(e) = decode_poll(datagram) {
            return self.invalid(e, from);
        }

        let IpAddr::V4(peer) = from.ip() else {
            return Dispatch::Ignored(OpCode::Poll);
        };
        let local_ip = if self.identity.bind_address.is_unspecified() {
            local_ip_for(peer).unwrap_or(self.identity.bind_address)
        } else {
            self.identity.bind_address
        };

        let reply = encode_poll_reply(&self.identity, &ReplyContext { local_ip });
        match self.network.send_to(&reply, from) {
            Ok(_) => {
                self.stats.record_poll_answered();
                tracing::debug!("Answered ArtPoll from {}", from);
                Dispatch::PollAnswered(from)
            }
            Err(e) => {
                tracing::warn!("Failed to send ArtPollReply to {}: {}", from, e);
                Dispatch::Failed(e.to_string())
            }
        }
    }

    fn handle_poll_reply(&self, datagram: &[u8], from: SocketAddr) -> Dispatch {
        let reply = match decode_poll_reply(datagram) {
            Ok(reply) => reply,
            Err(e) => return self.invalid(e, from),
        };
        let IpAddr::V4(source) = from.ip() else {
            return Dispatch::Ignored(OpCode::PollReply);
        };

        let info = NodeInfo::from_poll_reply(&reply);
        let new = self.nodes.upsert(source, info);
        self.stats.record_reply();
        if new {
            tracing::info!(
                "Discovered node {} \"{}\" ({}:{})",
                source,
                reply.short_name,
                reply.net_switch,
                reply.sub_switch
            );
        }
        Dispatch::NodeLearned { new }
    }

    /// Receive and dispatch until `running` is cleared
    pub fn run(self, running: &AtomicBool) {
        tracing::info!(
            "Receive loop started on {}",
            self.network
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "<closed>".to_string())
        );

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        while running.load(Ordering::Acquire) {
            match self.network.receive(&mut buf) {
                Ok(Some((len, from))) => {
                    self.dispatch(&buf[..len], from);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Receive error: {}", e);
                    // Persistent socket errors must not spin the loop.
                    thread::sleep(RECEIVE_ERROR_BACKOFF);
                }
            }
        }

        tracing::info!("Receive loop stopped");
    }

    pub fn spawn(
        self,
        running: Arc<AtomicBool>,
        span: tracing::Span,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("artnet-receive".to_string())
            .spawn(move || {
                let _guard = span.enter();
                self.run(&running);
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_dmx, encode_poll, SequenceCounter};
    use crate::network::memory::MemoryNetwork;
    use crate::protocol::{ARTNET_ID, POLL_REPLY_MIN_SIZE};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    struct Fixture {
        network: Arc<MemoryNetwork>,
        nodes: Arc<NodeRegistry>,
        callback: Arc<CallbackSlot>,
        stats: Arc<ReceiverStats>,
        dispatcher: ReceiveDispatcher,
    }

    fn fixture(address: PortAddress) -> Fixture {
        let network = Arc::new(MemoryNetwork::new());
        network.open("127.0.0.1:6454".parse().unwrap()).unwrap();
        let identity = Arc::new(ControllerConfig {
            bind_address: Ipv4Addr::LOCALHOST,
            ..ControllerConfig::with_address(address)
        });
        let nodes = Arc::new(NodeRegistry::new());
        let callback = Arc::new(CallbackSlot::new());
        let stats = Arc::new(ReceiverStats::new());
        let dispatcher = ReceiveDispatcher::new(
            network.clone(),
            identity,
            nodes.clone(),
            callback.clone(),
            stats.clone(),
        );
        Fixture {
            network,
            nodes,
            callback,
            stats,
            dispatcher,
        }
    }

    fn peer() -> SocketAddr {
        "10.0.0.42:6454".parse().unwrap()
    }

    fn recorder(slot: &CallbackSlot) -> Arc<Mutex<Vec<(PortAddress, Vec<u8>)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        slot.set(Some(Arc::new(move |address: PortAddress, data: &[u8]| {
            sink.lock().push((address, data.to_vec()));
        })));
        seen
    }

    #[test]
    fn test_matching_dmx_delivered() {
        let f = fixture(PortAddress::new(0, 0, 5));
        let seen = recorder(&f.callback);
        let packet = encode_dmx(&SequenceCounter::default(), PortAddress::new(0, 0, 5), &[1, 2, 3]).unwrap();

        assert_eq!(f.dispatcher.dispatch(&packet, peer()), Dispatch::Delivered);
        assert_eq!(seen.lock().as_slice(), &[(PortAddress::new(0, 0, 5), vec![1, 2, 3])]);
    }

    #[test]
    fn test_other_address_filtered() {
        let f = fixture(PortAddress::new(0, 0, 5));
        let seen = recorder(&f.callback);
        let sequence = SequenceCounter::default();

        for other in [PortAddress::new(0, 0, 6), PortAddress::new(0, 1, 5), PortAddress::new(1, 0, 5)] {
            let packet = encode_dmx(&sequence, other, &[9]).unwrap();
            assert_eq!(f.dispatcher.dispatch(&packet, peer()), Dispatch::Filtered(other));
        }
        assert!(seen.lock().is_empty());
        assert_eq!(f.stats.snapshot().dmx_filtered, 3);
    }

    #[test]
    fn test_dmx_without_callback() {
        let f = fixture(PortAddress::default());
        let packet = encode_dmx(&SequenceCounter::default(), PortAddress::default(), &[1]).unwrap();
        assert_eq!(f.dispatcher.dispatch(&packet, peer()), Dispatch::NoCallback);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let f = fixture(PortAddress::default());
        f.callback.set(Some(Arc::new(|_: PortAddress, _: &[u8]| panic!("consumer bug"))));
        let packet = encode_dmx(&SequenceCounter::default(), PortAddress::default(), &[1]).unwrap();
        assert!(matches!(f.dispatcher.dispatch(&packet, peer()), Dispatch::Failed(_)));
    }

    #[test]
    fn test_poll_answered_by_unicast() {
        let f = fixture(PortAddress::default());
        assert_eq!(f.dispatcher.dispatch(&encode_poll(), peer()), Dispatch::PollAnswered(peer()));

        let sent = f.network.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, peer());
        let reply = decode_poll_reply(&sent[0].data).unwrap();
        assert_eq!(reply.ip, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_poll_reply_learned() {
        let f = fixture(PortAddress::default());
        let identity = ControllerConfig {
            short_name: "Dimmer rack".to_string(),
            ..ControllerConfig::with_address(PortAddress::new(0, 0, 3))
        };
        let packet = encode_poll_reply(&identity, &ReplyContext {
            local_ip: Ipv4Addr::new(10, 0, 0, 42),
        });

        assert_eq!(f.dispatcher.dispatch(&packet, peer()), Dispatch::NodeLearned { new: true });
        assert_eq!(f.dispatcher.dispatch(&packet, peer()), Dispatch::NodeLearned { new: false });

        let node = f.nodes.get(Ipv4Addr::new(10, 0, 0, 42)).unwrap();
        assert_eq!(node.short_name, "Dimmer rack");
        assert!(node.subscribes_to(PortAddress::new(0, 0, 3)));
    }

    #[test]
    fn test_short_poll_reply_rejected() {
        let f = fixture(PortAddress::default());
        let packet = encode_poll_reply(&ControllerConfig::default(), &ReplyContext {
            local_ip: Ipv4Addr::LOCALHOST,
        });
        assert!(matches!(
            f.dispatcher.dispatch(&packet[..POLL_REPLY_MIN_SIZE - 1], peer()),
            Dispatch::Invalid(ValidationError::TooShort { .. })
        ));
        assert!(f.nodes.is_empty());
    }

    #[test]
    fn test_garbage_and_unknown_opcodes() {
        let f = fixture(PortAddress::default());
        assert!(matches!(f.dispatcher.dispatch(b"hello", peer()), Dispatch::Invalid(_)));
        assert_eq!(
            f.dispatcher.dispatch(b"Art-Nex\0\x00\x50\x00\x0e", peer()),
            Dispatch::Invalid(ValidationError::InvalidMagic)
        );

        let mut sync = ARTNET_ID.to_vec();
        sync.extend_from_slice(&[0x00, 0x52, 0x00, 0x0e, 0x00, 0x00]);
        assert_eq!(f.dispatcher.dispatch(&sync, peer()), Dispatch::Ignored(OpCode::Sync));
        assert_eq!(f.stats.snapshot().invalid_packets, 2);
    }

    #[test]
    fn test_channel_callback_never_blocks() {
        let (callback, rx) = channel_callback(1);
        callback(PortAddress::default(), &[1]);
        callback(PortAddress::default(), &[2]);
        assert_eq!(rx.try_recv().unwrap().data.as_ref(), &[1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_receive_loop_survives_transport_errors() {
        let Fixture {
            network,
            dispatcher,
            ..
        } = fixture(PortAddress::default());
        network.fail_receives(3);
        network.inject(encode_poll(), peer());

        let running = Arc::new(AtomicBool::new(true));
        let handle = dispatcher
            .spawn(running.clone(), tracing::Span::none())
            .unwrap();
        let reply = network.next_sent(std::time::Duration::from_secs(2));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        let reply = reply.expect("loop stopped after receive errors");
        assert_eq!(reply.dest, peer());
        assert!(decode_poll_reply(&reply.data).is_ok());
    }

    proptest! {
        #[test]
        fn dispatch_survives_arbitrary_datagrams(bytes in proptest::collection::vec(any::<u8>(), 0..700)) {
            let f = fixture(PortAddress::default());
            let _ = f.dispatcher.dispatch(&bytes, peer());
        }
    }
}
