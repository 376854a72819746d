//! UDP implementation of the datagram transport.

use async_trait::async_trait;
use flotilla_core::{DatagramTransport, FlotillaError, Result, TransportFactory};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::info;

/// Ceiling on accepted datagrams. Hello messages stay well under 1 KB;
/// anything larger is not ours.
const MAX_DATAGRAM_SIZE: usize = 4096;

/// Fire-and-forget transport over a single bound UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind to `addr`. Passing port 0 picks an ephemeral port; the bound
    /// address is reported by [`DatagramTransport::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| FlotillaError::transport(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| FlotillaError::transport(format!("failed to read local addr: {}", e)))?;

        info!("datagram transport bound to {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, target: SocketAddr, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, target)
            .await
            .map_err(|e| FlotillaError::transport(format!("send to {} failed: {}", target, e)))?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<(SocketAddr, Vec<u8>)> {
        let (len, from) = self
            .socket
            .recv_from(&mut self.buf)
            .await
            .map_err(|e| FlotillaError::transport(format!("recv failed: {}", e)))?;
        Ok((from, self.buf[..len].to_vec()))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Binds UDP sockets on all interfaces at the requested port.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransportFactory;

#[async_trait]
impl TransportFactory for UdpTransportFactory {
    async fn bind(&self, port: u16) -> Result<Box<dyn DatagramTransport>> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        Ok(Box::new(UdpTransport::bind(addr).await?))
    }
}
