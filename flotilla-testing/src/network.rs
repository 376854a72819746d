//! In-memory datagram network.
//!
//! A process-local stand-in for UDP: endpoints open against a shared
//! bus, sends route directly to the target's inbox, and unknown targets
//! silently eat the datagram the way the real network would. Detaching a
//! host is how tests kill an agent: its sockets stop sending and stop
//! receiving, and its peers find out the only way gossip ever does, by
//! silence.

use async_trait::async_trait;
use flotilla_core::{DatagramTransport, FlotillaError, Result, TransportFactory};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct BusInner {
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>>,
    dead_hosts: HashSet<IpAddr>,
}

/// The shared message bus every in-memory transport hangs off.
#[derive(Clone, Default)]
pub struct DatagramBus {
    inner: Arc<Mutex<BusInner>>,
}

impl DatagramBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an endpoint at `addr`. A later open at the same address
    /// replaces the earlier one, like rebinding a socket.
    pub fn open(&self, addr: SocketAddr) -> InMemoryDatagram {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().endpoints.insert(addr, tx);
        InMemoryDatagram {
            bus: self.clone(),
            addr,
            rx,
        }
    }

    /// Kill every endpoint on a host. Queued datagrams are not flushed;
    /// the host just goes dark.
    pub fn detach_host(&self, host: IpAddr) {
        self.inner.lock().unwrap().dead_hosts.insert(host);
    }

    /// Bring a previously detached host back.
    pub fn revive_host(&self, host: IpAddr) {
        self.inner.lock().unwrap().dead_hosts.remove(&host);
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, payload: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        if inner.dead_hosts.contains(&from.ip()) || inner.dead_hosts.contains(&to.ip()) {
            return;
        }
        if let Some(tx) = inner.endpoints.get(&to) {
            let _ = tx.send((from, payload));
        }
        // No endpoint: the datagram is lost, as on the real network.
    }

    /// Inject a raw datagram, e.g. garbage to exercise the decode path.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, payload: &[u8]) {
        self.route(from, to, payload.to_vec());
    }
}

/// One endpoint on the bus.
pub struct InMemoryDatagram {
    bus: DatagramBus,
    addr: SocketAddr,
    rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
}

#[async_trait]
impl DatagramTransport for InMemoryDatagram {
    async fn send(&self, target: SocketAddr, payload: &[u8]) -> Result<()> {
        self.bus.route(self.addr, target, payload.to_vec());
        Ok(())
    }

    async fn recv(&mut self) -> Result<(SocketAddr, Vec<u8>)> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| FlotillaError::transport("endpoint closed"))
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Mints bus endpoints for one simulated host, so an agent under test
/// binds its fleet and sub-election sockets the way the UDP factory
/// would on a real machine.
pub struct BusTransportFactory {
    bus: DatagramBus,
    host: IpAddr,
}

impl BusTransportFactory {
    pub fn new(bus: DatagramBus, host: IpAddr) -> Self {
        Self { bus, host }
    }
}

#[async_trait]
impl TransportFactory for BusTransportFactory {
    async fn bind(&self, port: u16) -> Result<Box<dyn DatagramTransport>> {
        Ok(Box::new(self.bus.open(SocketAddr::new(self.host, port))))
    }
}
