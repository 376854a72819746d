//! Datagram transport contract.

use crate::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Connectionless send/receive of small textual messages.
///
/// No ordering, no delivery guarantee. A failed send is an error the
/// gossip layer logs and swallows; the next heartbeat is the retry.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    async fn send(&self, target: SocketAddr, payload: &[u8]) -> Result<()>;

    async fn recv(&mut self) -> Result<(SocketAddr, Vec<u8>)>;

    /// The endpoint peers should address this transport at.
    fn local_addr(&self) -> SocketAddr;
}

#[async_trait]
impl<T: DatagramTransport + ?Sized> DatagramTransport for Box<T> {
    async fn send(&self, target: SocketAddr, payload: &[u8]) -> Result<()> {
        (**self).send(target, payload).await
    }

    async fn recv(&mut self) -> Result<(SocketAddr, Vec<u8>)> {
        (**self).recv().await
    }

    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }
}

/// Opens datagram endpoints on demand.
///
/// The agent binds one socket for the fleet engine and one more per
/// floating-address sub-election, so it needs a way to mint transports
/// at arbitrary ports rather than a single pre-bound socket.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn bind(&self, port: u16) -> Result<Box<dyn DatagramTransport>>;
}
