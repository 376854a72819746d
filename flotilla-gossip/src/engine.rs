//! Gossip engine: peer table, liveness tracking and leader election.
//!
//! Every `interval` the engine broadcasts a hello carrying its id, role
//! and known-alive peers. Silence past `timeout` marks a peer removed.
//! When no live leader is visible the engine arms a random backoff below
//! `interval` and claims leadership if the fleet is still leaderless when
//! it fires; simultaneous claimants are resolved deterministically, the
//! lowest id wins and everyone else reverts to citizen.
//!
//! The engine is one task. Events leave through a single channel in the
//! order they were decided, so a subscriber never observes two handlers
//! of the same engine interleaved.

use flotilla_core::{
    DatagramTransport, GossipMessage, InstanceId, PeerAnnouncement, PeerInfo, PeerRole, PeerStatus,
    Result,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::GossipConfig;

/// Lifecycle events decided by a gossip engine, in decision order.
#[derive(Debug, Clone)]
pub enum GossipEvent {
    /// A peer was sighted for the first time (or returned under a fresh
    /// incarnation after having been removed).
    Added(PeerInfo),
    /// A peer went silent past the liveness timeout. The carried role is
    /// the one the peer held when it vanished.
    Removed(PeerInfo),
    /// The local node won an election.
    Elected,
    /// A remote peer was recognized as leader.
    Leader(PeerInfo),
}

#[derive(Debug)]
struct Peer {
    endpoint: SocketAddr,
    last_heard: Instant,
    role: PeerRole,
    status: PeerStatus,
    incarnation: Uuid,
}

impl Peer {
    fn info(&self, id: &InstanceId) -> PeerInfo {
        PeerInfo {
            id: id.clone(),
            endpoint: self.endpoint,
            role: self.role,
            incarnation: self.incarnation,
        }
    }
}

/// Control handle to a running engine.
#[derive(Debug, Clone)]
pub struct GossipHandle {
    is_leader: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
}

impl GossipHandle {
    /// Whether the local node currently holds leadership on this engine.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    /// Ask the engine loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The membership/election substrate. One instance per election scope:
/// the fleet engine, plus one per floating-address group.
pub struct GossipEngine<T: DatagramTransport> {
    config: GossipConfig,
    transport: T,
    peers: HashMap<InstanceId, Peer>,
    role: PeerRole,
    events_tx: mpsc::UnboundedSender<GossipEvent>,
    is_leader: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
    election_deadline: Option<Instant>,
    rng: StdRng,
}

impl<T: DatagramTransport> GossipEngine<T> {
    pub fn new(
        config: GossipConfig,
        transport: T,
        events_tx: mpsc::UnboundedSender<GossipEvent>,
    ) -> (Self, GossipHandle) {
        let is_leader = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = GossipHandle {
            is_leader: is_leader.clone(),
            shutdown_tx,
        };

        let engine = Self {
            config,
            transport,
            peers: HashMap::new(),
            role: PeerRole::Citizen,
            events_tx,
            is_leader,
            shutdown_rx,
            election_deadline: None,
            rng: StdRng::from_entropy(),
        };

        (engine, handle)
    }

    /// Owning loop. Heartbeats and timeout sweeps fire on every tick
    /// regardless of what subscribers are doing with the events.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "gossip engine for {} starting with {} seed peer(s)",
            self.config.local_id,
            self.config.seed_peers.len()
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            let election_at = self.election_deadline;

            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_expired();
                    self.consider_election();
                    self.broadcast_hello().await;
                }

                _ = sleep_until(election_at.unwrap_or_else(Instant::now)), if election_at.is_some() => {
                    self.claim_leadership().await;
                }

                received = self.transport.recv() => {
                    match received {
                        Ok((from, payload)) => self.handle_datagram(from, &payload),
                        Err(e) => warn!("transport receive failed: {}", e),
                    }
                }

                _ = shutdown_rx.changed() => {
                    info!("gossip engine for {} shutting down", self.config.local_id);
                    break Ok(());
                }
            }
        }
    }

    fn handle_datagram(&mut self, from: SocketAddr, payload: &[u8]) {
        let message = match GossipMessage::decode(payload) {
            Ok(message) => message,
            Err(_) => {
                debug!("dropping malformed datagram from {}", from);
                return;
            }
        };

        let GossipMessage::Hello {
            id,
            role,
            incarnation,
            peers,
        } = message;

        // Our own broadcast reflected back.
        if id == self.config.local_id {
            return;
        }

        self.observe_hello(id, from, role, incarnation);
        for announced in peers {
            self.observe_announcement(announced);
        }
    }

    /// A direct hello: refreshes liveness and may add or revive the peer.
    fn observe_hello(
        &mut self,
        id: InstanceId,
        endpoint: SocketAddr,
        role: PeerRole,
        incarnation: Uuid,
    ) {
        let now = Instant::now();

        let (added, leader_transition) = match self.peers.get_mut(&id) {
            Some(peer) if peer.status == PeerStatus::Removed => {
                if peer.incarnation == incarnation {
                    // Dead under this incarnation; only a fresh boot
                    // brings the id back.
                    return;
                }
                peer.endpoint = endpoint;
                peer.last_heard = now;
                peer.role = role;
                peer.status = PeerStatus::Alive;
                peer.incarnation = incarnation;
                debug!("peer {} returned under a new incarnation", id);
                (Some(peer.info(&id)), role == PeerRole::Leader)
            }
            Some(peer) => {
                peer.endpoint = endpoint;
                peer.last_heard = now;
                peer.incarnation = incarnation;
                let was_leader = peer.role == PeerRole::Leader;
                peer.role = role;
                (None, role == PeerRole::Leader && !was_leader)
            }
            None => {
                let peer = Peer {
                    endpoint,
                    last_heard: now,
                    role,
                    status: PeerStatus::Alive,
                    incarnation,
                };
                let info = peer.info(&id);
                self.peers.insert(id.clone(), peer);
                (Some(info), role == PeerRole::Leader)
            }
        };

        if let Some(info) = added {
            self.emit(GossipEvent::Added(info));
        }
        if leader_transition {
            self.recognize_leader(&id);
        }
    }

    /// A peer learned second-hand from someone else's hello. Hearsay
    /// neither refreshes liveness nor revives the removed.
    fn observe_announcement(&mut self, announced: PeerAnnouncement) {
        if announced.id == self.config.local_id || self.peers.contains_key(&announced.id) {
            return;
        }

        let peer = Peer {
            endpoint: announced.endpoint,
            last_heard: Instant::now(),
            role: announced.role,
            status: PeerStatus::Alive,
            // Unknown until the peer speaks for itself.
            incarnation: Uuid::nil(),
        };
        let info = peer.info(&announced.id);
        self.peers.insert(announced.id.clone(), peer);

        debug!("learned of peer {} via gossip", announced.id);
        self.emit(GossipEvent::Added(info));
        if announced.role == PeerRole::Leader {
            self.recognize_leader(&announced.id);
        }
    }

    /// React to a remote leadership claim, resolving ties by lowest id.
    fn recognize_leader(&mut self, id: &InstanceId) {
        let Some(peer) = self.peers.get(id) else {
            return;
        };
        let info = peer.info(id);

        if self.role == PeerRole::Leader {
            if *id < self.config.local_id {
                info!("yielding leadership to lower-id peer {}", id);
                self.role = PeerRole::Citizen;
                self.is_leader.store(false, Ordering::Release);
                self.election_deadline = None;
                self.emit(GossipEvent::Leader(info));
            } else {
                debug!("ignoring leadership claim from higher-id peer {}", id);
            }
            return;
        }

        self.election_deadline = None;
        self.emit(GossipEvent::Leader(info));
    }

    /// Mark peers silent past the timeout as removed. Entries stay in the
    /// table so the departed role travels with the event and so the id
    /// cannot be resurrected by hearsay.
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let mut expired = Vec::new();

        for (id, peer) in self.peers.iter_mut() {
            if peer.status == PeerStatus::Alive
                && now.duration_since(peer.last_heard) > self.config.timeout
            {
                peer.status = PeerStatus::Removed;
                expired.push(peer.info(id));
            }
        }

        for info in expired {
            info!("peer {} timed out (was {})", info.id, info.role);
            self.emit(GossipEvent::Removed(info));
        }
    }

    fn live_leader_visible(&self) -> bool {
        self.peers
            .values()
            .any(|p| p.status == PeerStatus::Alive && p.role == PeerRole::Leader)
    }

    /// Arm the pre-claim backoff when the fleet looks leaderless.
    fn consider_election(&mut self) {
        if self.role == PeerRole::Leader || self.live_leader_visible() {
            self.election_deadline = None;
            return;
        }

        if self.election_deadline.is_none() {
            let interval_ms = self.config.interval.as_millis().max(1) as u64;
            let jitter = self.rng.gen_range(0..interval_ms);
            debug!("no live leader visible, arming election in {} ms", jitter);
            self.election_deadline = Some(Instant::now() + Duration::from_millis(jitter));
        }
    }

    /// The backoff fired with the fleet still leaderless: take over.
    async fn claim_leadership(&mut self) {
        self.election_deadline = None;
        if self.role == PeerRole::Leader || self.live_leader_visible() {
            return;
        }

        info!("{} claiming leadership", self.config.local_id);
        self.role = PeerRole::Leader;
        self.is_leader.store(true, Ordering::Release);
        self.emit(GossipEvent::Elected);
        self.broadcast_hello().await;
    }

    async fn broadcast_hello(&mut self) {
        let announcements: Vec<PeerAnnouncement> = self
            .peers
            .iter()
            .filter(|(_, p)| p.status == PeerStatus::Alive)
            .map(|(id, p)| PeerAnnouncement {
                id: id.clone(),
                endpoint: p.endpoint,
                role: p.role,
            })
            .collect();

        let message = GossipMessage::Hello {
            id: self.config.local_id.clone(),
            role: self.role,
            incarnation: self.config.incarnation,
            peers: announcements,
        };

        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode hello: {}", e);
                return;
            }
        };

        let mut targets: HashSet<SocketAddr> = self.config.seed_peers.iter().copied().collect();
        targets.extend(
            self.peers
                .values()
                .filter(|p| p.status == PeerStatus::Alive)
                .map(|p| p.endpoint),
        );

        for target in targets {
            // Losses are fine; the next heartbeat is the retry.
            if let Err(e) = self.transport.send(target, &payload).await {
                debug!("hello to {} failed: {}", target, e);
            }
        }
    }

    fn emit(&self, event: GossipEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("gossip event dropped, subscriber is gone");
        }
    }
}
