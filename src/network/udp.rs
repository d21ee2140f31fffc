//! UDP transport
//!
//! [`NetworkInterface`] is the seam between the controller and the socket
//! layer. [`UdpTransport`] is the one implementation for real sockets; the
//! platform differences are absorbed by `socket2`.

use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::constants::RECEIVE_TIMEOUT;
use crate::error::NetworkError;
use crate::protocol::ARTNET_PORT;

/// Send/receive capability used by the controller and its worker threads
pub trait NetworkInterface: Send + Sync {
    /// Create and bind the socket
    fn open(&self, bind: SocketAddr) -> Result<(), NetworkError>;

    /// Send one datagram
    fn send_to(&self, packet: &[u8], dest: SocketAddr) -> Result<usize, NetworkError>;

    /// Wait a bounded time for one datagram
    ///
    /// `Ok(None)` means nothing arrived before the timeout (or the wait was
    /// interrupted); callers simply try again.
    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, NetworkError>;

    /// Release the socket; safe to call when already closed
    fn close(&self);

    /// Bound address while open
    fn local_addr(&self) -> Option<SocketAddr>;

    fn is_open(&self) -> bool {
        self.local_addr().is_some()
    }
}

/// Create a broadcast-capable, address-reusing UDP socket with a read timeout
pub fn create_socket(bind: SocketAddr, read_timeout: Duration) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::SocketCreate(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::SocketCreate(format!("SO_REUSEADDR: {}", e)))?;
    socket
        .set_broadcast(true)
        .map_err(|e| NetworkError::SocketCreate(format!("SO_BROADCAST: {}", e)))?;
    if bind.is_ipv4() {
        socket
            .set_multicast_loop_v4(false)
            .map_err(|e| NetworkError::SocketCreate(format!("IP_MULTICAST_LOOP: {}", e)))?;
    }
    socket
        .set_read_timeout(Some(read_timeout))
        .map_err(|e| NetworkError::SocketCreate(format!("SO_RCVTIMEO: {}", e)))?;

    socket
        .bind(&bind.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind, e)))?;

    Ok(socket.into())
}

/// Local interface address the OS would use to reach `peer`
///
/// Connecting a UDP socket sends nothing; it only performs the route lookup.
pub fn local_ip_for(peer: Ipv4Addr) -> Option<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    probe.connect((peer, ARTNET_PORT)).ok()?;
    match probe.local_addr().ok()? {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(_) => None,
    }
}

/// Real UDP socket transport
pub struct UdpTransport {
    socket: RwLock<Option<UdpSocket>>,
    read_timeout: Duration,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::with_timeout(RECEIVE_TIMEOUT)
    }

    pub fn with_timeout(read_timeout: Duration) -> Self {
        Self {
            socket: RwLock::new(None),
            read_timeout,
        }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInterface for UdpTransport {
    fn open(&self, bind: SocketAddr) -> Result<(), NetworkError> {
        let socket = create_socket(bind, self.read_timeout)?;
        tracing::debug!("UDP socket bound to {}", bind);
        *self.socket.write() = Some(socket);
        Ok(())
    }

    fn send_to(&self, packet: &[u8], dest: SocketAddr) -> Result<usize, NetworkError> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or(NetworkError::NotOpen)?;
        socket
            .send_to(packet, dest)
            .map_err(|e| NetworkError::SendFailed(format!("{}: {}", dest, e)))
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, NetworkError> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or(NetworkError::NotOpen)?;
        match socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
        }
    }

    fn close(&self) {
        if self.socket.write().take().is_some() {
            tracing::debug!("UDP socket closed");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.read().as_ref().and_then(|s| s.local_addr().ok())
    }
}
