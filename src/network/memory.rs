//! In-process transport
//!
//! Datagrams are injected through a channel and everything sent is
//! captured, which lets a full controller run without touching the OS
//! socket layer.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::NetworkError;
use crate::network::udp::NetworkInterface;

/// A datagram handed to [`MemoryNetwork::send_to`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub data: Bytes,
    pub dest: SocketAddr,
}

/// Channel-backed [`NetworkInterface`]
pub struct MemoryNetwork {
    inbound_tx: Sender<(Bytes, SocketAddr)>,
    inbound_rx: Receiver<(Bytes, SocketAddr)>,
    sent_tx: Sender<SentPacket>,
    sent_rx: Receiver<SentPacket>,
    local: Mutex<Option<SocketAddr>>,
    fail_open: AtomicBool,
    opens: AtomicUsize,
    receive_errors: AtomicUsize,
    poll_timeout: Duration,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        let (sent_tx, sent_rx) = unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            sent_tx,
            sent_rx,
            local: Mutex::new(None),
            fail_open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            receive_errors: AtomicUsize::new(0),
            poll_timeout: Duration::from_millis(20),
        }
    }

    /// Queue a datagram as if it arrived from `from`
    pub fn inject(&self, datagram: impl Into<Bytes>, from: SocketAddr) {
        let _ = self.inbound_tx.send((datagram.into(), from));
    }

    /// Wait for the next sent datagram
    pub fn next_sent(&self, timeout: Duration) -> Option<SentPacket> {
        self.sent_rx.recv_timeout(timeout).ok()
    }

    /// Everything sent since the last call
    pub fn drain_sent(&self) -> Vec<SentPacket> {
        self.sent_rx.try_iter().collect()
    }

    /// Make the next `open` calls fail with a bind error
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Relaxed);
    }

    /// Make the next `count` calls to `receive` fail
    pub fn fail_receives(&self, count: usize) {
        self.receive_errors.store(count, Ordering::Relaxed);
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInterface for MemoryNetwork {
    fn open(&self, bind: SocketAddr) -> Result<(), NetworkError> {
        if self.fail_open.load(Ordering::Relaxed) {
            return Err(NetworkError::BindFailed(format!("{}: address in use", bind)));
        }
        *self.local.lock() = Some(bind);
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn send_to(&self, packet: &[u8], dest: SocketAddr) -> Result<usize, NetworkError> {
        if self.local.lock().is_none() {
            return Err(NetworkError::NotOpen);
        }
        let _ = self.sent_tx.send(SentPacket {
            data: Bytes::copy_from_slice(packet),
            dest,
        });
        Ok(packet.len())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, NetworkError> {
        if self.local.lock().is_none() {
            return Err(NetworkError::NotOpen);
        }
        let injected = self
            .receive_errors
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(NetworkError::ReceiveFailed("injected failure".to_string()));
        }
        match self.inbound_rx.recv_timeout(self.poll_timeout) {
            Ok((datagram, from)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some((len, from)))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(NetworkError::ReceiveFailed("inbound channel closed".to_string()))
            }
        }
    }

    fn close(&self) {
        *self.local.lock() = None;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local.lock()
    }
}
