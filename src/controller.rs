//! Art-Net controller
//!
//! Owns the transport, the current DMX buffer, the frame queue, the node
//! registry and the statistics, and runs up to two worker threads: the
//! receive dispatcher (always) and the frame scheduler (when a frame
//! generator is attached).
//!
//! ```text
//!  Unconfigured --configure()--> Configured --start()--> Running
//!                                    ^                      |
//!                                    +-------stop()---------+
//! ```

use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::codec::{encode_dmx, encode_poll, SequenceCounter};
use crate::config::ControllerConfig;
use crate::error::{ConfigError, NetworkError, Result, ValidationError};
use crate::frame::{frame_interval, DmxFrame, FrameGenerator, FrameOutput, FrameQueue, FrameScheduler};
use crate::network::{CallbackSlot, DataCallback, NetworkInterface, ReceiveDispatcher, UdpTransport};
use crate::nodes::{NodeInfo, NodeRegistry};
use crate::protocol::MAX_DMX_SIZE;
use crate::stats::{ReceiverStats, ReceiverStatsSnapshot, Statistics, StatisticsSnapshot};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unconfigured,
    Configured,
    Running,
}

/// Encodes frames and broadcasts them, recording the last frame sent
struct Transmitter {
    network: Arc<dyn NetworkInterface>,
    sequence: Arc<SequenceCounter>,
    buffer: Arc<Mutex<Bytes>>,
    destination: SocketAddr,
}

impl FrameOutput for Transmitter {
    fn transmit(&self, frame: &DmxFrame) -> Result<()> {
        *self.buffer.lock() = frame.data.clone();
        let packet = encode_dmx(&self.sequence, frame.address, &frame.data)?;
        self.network.send_to(&packet, self.destination)?;
        Ok(())
    }
}

/// Art-Net controller for one universe
pub struct Controller {
    state: ControllerState,
    config: Option<Arc<ControllerConfig>>,
    network: Arc<dyn NetworkInterface>,
    buffer: Arc<Mutex<Bytes>>,
    sequence: Arc<SequenceCounter>,
    queue: Arc<FrameQueue>,
    nodes: Arc<NodeRegistry>,
    stats: Arc<Statistics>,
    receiver_stats: Arc<ReceiverStats>,
    callback: Arc<CallbackSlot>,
    running: Arc<AtomicBool>,
    sending_enabled: AtomicBool,
    scheduler_thread: Option<JoinHandle<()>>,
    receiver_thread: Option<JoinHandle<()>>,
    span: tracing::Span,
}

impl Controller {
    /// Controller using real UDP sockets
    pub fn new() -> Self {
        Self::with_network(Arc::new(UdpTransport::new()))
    }

    /// Controller using the given transport
    pub fn with_network(network: Arc<dyn NetworkInterface>) -> Self {
        Self {
            state: ControllerState::Unconfigured,
            config: None,
            network,
            buffer: Arc::new(Mutex::new(Bytes::new())),
            sequence: Arc::new(SequenceCounter::default()),
            queue: Arc::new(FrameQueue::default()),
            nodes: Arc::new(NodeRegistry::new()),
            stats: Arc::new(Statistics::new()),
            receiver_stats: Arc::new(ReceiverStats::new()),
            callback: Arc::new(CallbackSlot::new()),
            running: Arc::new(AtomicBool::new(false)),
            sending_enabled: AtomicBool::new(true),
            scheduler_thread: None,
            receiver_thread: None,
            span: tracing::Span::none(),
        }
    }

    /// Set the identity; rejected while running
    pub fn configure(&mut self, config: ControllerConfig) -> Result<()> {
        if self.state == ControllerState::Running {
            tracing::error!("Cannot configure while running");
            return Err(ConfigError::AlreadyRunning.into());
        }
        config.validate()?;

        self.span = tracing::info_span!(
            "artnet",
            address = %config.address,
            bind = %config.bind_socket_addr()
        );
        self.sending_enabled
            .store(config.sending_enabled, Ordering::Relaxed);
        self.config = Some(Arc::new(config));
        self.state = ControllerState::Configured;
        Ok(())
    }

    /// Open the transport and start the receive thread
    pub fn start(&mut self) -> Result<()> {
        let config = match self.state {
            ControllerState::Running => {
                tracing::error!("Already running");
                return Err(ConfigError::AlreadyRunning.into());
            }
            ControllerState::Unconfigured => {
                tracing::error!("Controller not configured, call configure() first");
                return Err(ConfigError::NotConfigured.into());
            }
            ControllerState::Configured => self.config.clone().ok_or(ConfigError::NotConfigured)?,
        };

        if let Err(e) = self.network.open(config.bind_socket_addr()) {
            tracing::error!("Failed to open {}: {}", config.bind_socket_addr(), e);
            return Err(e.into());
        }

        self.nodes.clear();
        self.queue.clear();
        self.stats.set_queue_depth(0);
        self.running.store(true, Ordering::Release);

        let dispatcher = ReceiveDispatcher::new(
            self.network.clone(),
            config.clone(),
            self.nodes.clone(),
            self.callback.clone(),
            self.receiver_stats.clone(),
        );
        match dispatcher.spawn(self.running.clone(), self.span.clone()) {
            Ok(handle) => self.receiver_thread = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.network.close();
                return Err(e.into());
            }
        }

        self.state = ControllerState::Running;
        self.span.in_scope(|| {
            tracing::info!(
                "Controller started on {} broadcasting to {}",
                config.bind_socket_addr(),
                config.broadcast_socket_addr()
            )
        });
        Ok(())
    }

    /// Start, then drive output from `generator` at `fps` frames per second
    pub fn start_with_generator(&mut self, generator: FrameGenerator, fps: u32) -> Result<()> {
        frame_interval(fps)?;
        self.start()?;
        let config = self.config.clone().ok_or(ConfigError::NotConfigured)?;

        let output = Arc::new(Transmitter {
            network: self.network.clone(),
            sequence: self.sequence.clone(),
            buffer: self.buffer.clone(),
            destination: config.broadcast_socket_addr(),
        });
        let scheduler = FrameScheduler::new(
            generator,
            config.address,
            fps,
            self.queue.clone(),
            self.stats.clone(),
            output,
        )?;

        match scheduler.spawn(self.running.clone(), self.span.clone()) {
            Ok(handle) => {
                self.scheduler_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e.into())
            }
        }
    }

    /// Stop worker threads and close the transport; always safe to call
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.scheduler_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Frame scheduler thread panicked");
            }
        }
        if let Some(handle) = self.receiver_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Receive thread panicked");
            }
        }

        if self.state == ControllerState::Running {
            self.network.close();
            self.state = ControllerState::Configured;
            self.span.in_scope(|| tracing::info!("Controller stopped"));
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ControllerState::Running
    }

    pub fn config(&self) -> Option<&ControllerConfig> {
        self.config.as_deref()
    }

    /// Replace the current DMX buffer for the configured universe
    pub fn set_dmx_data(&self, universe: u16, data: &[u8]) -> Result<()> {
        if data.len() > MAX_DMX_SIZE {
            tracing::warn!("DMX data exceeds max size: {} bytes", data.len());
            return Err(ValidationError::PayloadTooLarge(data.len()).into());
        }
        let config = self.config.as_ref().ok_or(ConfigError::NotConfigured)?;
        let expected = config.address.universe() as u16;
        if universe != expected {
            return Err(ValidationError::UniverseMismatch {
                expected,
                actual: universe,
            }
            .into());
        }

        *self.buffer.lock() = Bytes::copy_from_slice(data);
        Ok(())
    }

    /// Current DMX buffer, or empty when `universe` is not ours
    pub fn get_dmx_data(&self, universe: u16) -> Bytes {
        match &self.config {
            Some(config) if config.address.universe() as u16 == universe => self.buffer.lock().clone(),
            _ => Bytes::new(),
        }
    }

    /// Broadcast the current DMX buffer once
    ///
    /// Shares the sequence counter with the frame scheduler; callers that
    /// also run a generator get interleaved sequence numbers.
    pub fn send_dmx(&self) -> Result<()> {
        if !self.sending_enabled.load(Ordering::Relaxed) {
            tracing::trace!("DMX sending disabled, skipping send");
            return Ok(());
        }
        let config = self.config.as_ref().ok_or(ConfigError::NotConfigured)?;

        let data = self.buffer.lock().clone();
        if data.is_empty() {
            return Err(ValidationError::EmptyFrame.into());
        }
        if !self.is_running() {
            return Err(NetworkError::NotOpen.into());
        }

        let packet = encode_dmx(&self.sequence, config.address, &data)?;
        if let Err(e) = self.network.send_to(&packet, config.broadcast_socket_addr()) {
            tracing::error!("Error sending ArtDmx: {}", e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Broadcast an ArtPoll
    pub fn send_poll(&self) -> Result<()> {
        let config = self.config.as_ref().ok_or(ConfigError::NotConfigured)?;
        if !self.is_running() {
            return Err(NetworkError::NotOpen.into());
        }
        if let Err(e) = self.network.send_to(&encode_poll(), config.broadcast_socket_addr()) {
            tracing::error!("Error sending ArtPoll: {}", e);
            return Err(e.into());
        }
        tracing::debug!("ArtPoll sent to {}", config.broadcast_socket_addr());
        Ok(())
    }

    /// Install, replace or (with `None`) remove the DMX data callback
    pub fn register_data_callback(&self, callback: Option<DataCallback>) {
        self.callback.set(callback);
    }

    /// Enable or disable `send_dmx`
    pub fn set_sending_enabled(&self, enabled: bool) {
        self.sending_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn sending_enabled(&self) -> bool {
        self.sending_enabled.load(Ordering::Relaxed)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn receiver_statistics(&self) -> ReceiverStatsSnapshot {
        self.receiver_stats.snapshot()
    }

    /// Nodes discovered since the controller started
    pub fn discovered_nodes(&self) -> Vec<NodeInfo> {
        self.nodes.nodes()
    }

    /// Discovered nodes with a port on our Port-Address
    pub fn interested_nodes(&self) -> Vec<NodeInfo> {
        match &self.config {
            Some(config) => self.nodes.interested_in(config.address),
            None => Vec::new(),
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryNetwork;
    use crate::protocol::PortAddress;

    fn configured(network: Arc<MemoryNetwork>, universe: u8) -> Controller {
        let mut controller = Controller::with_network(network);
        controller
            .configure(ControllerConfig::with_address(PortAddress::new(0, 0, universe)))
            .unwrap();
        controller
    }

    #[test]
    fn test_state_transitions() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = Controller::with_network(network);
        assert_eq!(controller.state(), ControllerState::Unconfigured);
        assert!(matches!(
            controller.start(),
            Err(crate::Error::Config(ConfigError::NotConfigured))
        ));

        controller.configure(ControllerConfig::default()).unwrap();
        assert_eq!(controller.state(), ControllerState::Configured);

        controller.start().unwrap();
        assert_eq!(controller.state(), ControllerState::Running);
        assert!(matches!(
            controller.start(),
            Err(crate::Error::Config(ConfigError::AlreadyRunning))
        ));
        assert!(matches!(
            controller.configure(ControllerConfig::default()),
            Err(crate::Error::Config(ConfigError::AlreadyRunning))
        ));

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Configured);
    }

    #[test]
    fn test_failed_open_keeps_state() {
        let network = Arc::new(MemoryNetwork::new());
        network.set_fail_open(true);
        let mut controller = configured(network.clone(), 0);

        assert!(matches!(
            controller.start(),
            Err(crate::Error::Network(NetworkError::BindFailed(_)))
        ));
        assert_eq!(controller.state(), ControllerState::Configured);

        network.set_fail_open(false);
        controller.start().unwrap();
        assert!(controller.is_running());
    }

    #[test]
    fn test_set_dmx_data_rules() {
        let controller = configured(Arc::new(MemoryNetwork::new()), 5);

        controller.set_dmx_data(5, &[1, 2, 3]).unwrap();
        assert!(controller.set_dmx_data(6, &[9, 9]).is_err());
        assert!(controller.set_dmx_data(5, &[0u8; 513]).is_err());

        assert_eq!(controller.get_dmx_data(5).as_ref(), &[1, 2, 3]);
        assert!(controller.get_dmx_data(6).is_empty());
    }

    #[test]
    fn test_send_dmx_broadcasts_buffer() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = configured(network.clone(), 5);
        assert!(matches!(
            controller.send_dmx(),
            Err(crate::Error::Validation(ValidationError::EmptyFrame))
        ));

        controller.set_dmx_data(5, &[10, 20]).unwrap();
        controller.start().unwrap();
        controller.send_dmx().unwrap();
        controller.send_dmx().unwrap();

        let sent = network.drain_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].dest, "255.255.255.255:6454".parse().unwrap());
        assert_eq!(&sent[0].data[18..], &[10, 20]);
        assert_eq!(sent[1].data[12], sent[0].data[12].wrapping_add(1));
    }

    #[test]
    fn test_send_dmx_disabled_is_noop() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = configured(network.clone(), 0);
        controller.set_dmx_data(0, &[1]).unwrap();
        controller.start().unwrap();

        controller.set_sending_enabled(false);
        controller.send_dmx().unwrap();
        assert!(network.drain_sent().is_empty());
    }

    #[test]
    fn test_send_poll() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = configured(network.clone(), 0);
        assert!(controller.send_poll().is_err());

        controller.start().unwrap();
        controller.send_poll().unwrap();
        let sent = network.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0].data[8..10], &[0x00, 0x20]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = configured(network, 0);
        controller.stop();
        controller.start().unwrap();
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), ControllerState::Configured);
    }

    #[test]
    fn test_invalid_frame_rate_does_not_start() {
        let network = Arc::new(MemoryNetwork::new());
        let mut controller = configured(network.clone(), 0);
        let result = controller.start_with_generator(Box::new(|| Ok(vec![0u8; 4])), 0);
        assert!(matches!(
            result,
            Err(crate::Error::Config(ConfigError::InvalidFrameRate(0)))
        ));
        assert_eq!(controller.state(), ControllerState::Configured);
        assert_eq!(network.open_count(), 0);
    }
}
