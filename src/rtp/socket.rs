//! Receive-only UDP socket for RTP.
//!
//! The socket is bound with a short read timeout so the receive loop wakes
//! regularly and can observe a stop request without any cross-thread close.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::error::{Result, RtpError};

/// UDP socket accepting RTP datagrams from any sender.
pub struct RtpSocket {
    /// The underlying UDP socket
    socket: UdpSocket,
    /// Local address this socket is bound to
    local_addr: SocketAddrV4,
}

impl RtpSocket {
    /// Bind to `interface:port` for receiving.
    ///
    /// `poll_interval` becomes the read timeout; it bounds how long a single
    /// [`recv`](Self::recv) call can block. Fails with [`RtpError::Bind`] if the
    /// port is unavailable. There is no retry.
    pub fn bind(
        port: u16,
        interface: Ipv4Addr,
        poll_interval: Duration,
        recv_buffer_size: usize,
    ) -> Result<Self> {
        Self::bind_socket(port, interface, poll_interval, recv_buffer_size)
            .map_err(|source| RtpError::Bind { port, source })
    }

    fn bind_socket(
        port: u16,
        interface: Ipv4Addr,
        poll_interval: Duration,
        recv_buffer_size: usize,
    ) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // No SO_REUSEADDR: a second listener on the same port must fail to bind
        let local_addr = SocketAddrV4::new(interface, port);
        socket.bind(&local_addr.into())?;

        // A zero timeout means "block forever" to the OS
        let timeout = poll_interval.max(Duration::from_millis(1));
        socket.set_read_timeout(Some(timeout))?;

        if recv_buffer_size > 0 {
            let _ = socket.set_recv_buffer_size(recv_buffer_size);
        }

        let socket: UdpSocket = socket.into();

        // Get the actual bound address (in case port was 0)
        let actual_local = match socket.local_addr()? {
            SocketAddr::V4(addr) => addr,
            _ => return Err(io::Error::new(ErrorKind::InvalidInput, "IPv4 only")),
        };

        Ok(RtpSocket {
            socket,
            local_addr: actual_local,
        })
    }

    /// Receive one datagram from any source.
    ///
    /// Returns `Ok(None)` when the read timeout elapsed with no data, and
    /// [`RtpError::SocketClosed`] for any error that ends the socket's usefulness.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((len, _addr)) => Ok(Some(len)),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(RtpError::SocketClosed(e)),
        }
    }

    /// Get the local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

impl std::fmt::Debug for RtpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
