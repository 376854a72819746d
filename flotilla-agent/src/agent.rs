//! The agent: bootstrap, event dispatch, and the healing pipeline.
//!
//! Every fleet member runs the same agent. All of them watch the gossip
//! stream; only the one holding leadership issues mutating control-plane
//! calls. Events are handled strictly one at a time by a single dispatch
//! task, which is what makes the convergence logic safe to write as
//! read-compute-act without finer locking: the coarse state mutex exists
//! for `register_group` callers and is never held across a cloud call.

use crate::{AgentConfig, AgentError, AgentResult, PendingRemovals, ServerRegistry};
use flotilla_core::{
    provision_name, CloudProvider, GroupSpec, IdentityProvider, InstanceId, NodeRecord, PeerInfo,
    PeerRole, TransportFactory,
};
use flotilla_gossip::{GossipConfig, GossipEngine, GossipEvent, GossipHandle};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct AgentState {
    registry: ServerRegistry,
    groups: Vec<GroupSpec>,
    pending: PendingRemovals,
    /// A leader (local or remote) has been observed since startup.
    bootstrapped: bool,
    /// The one-shot bootstrap convergence has run.
    first_convergence_done: bool,
    sub_elections: Vec<GossipHandle>,
}

impl AgentState {
    /// Indices of the groups the node belongs to under the membership
    /// predicate. Registration order is group identity.
    fn groups_for(&self, record: &NodeRecord) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| self.registry.is_member(record, group))
            .map(|(index, _)| index)
            .collect()
    }
}

/// One fleet member's controller process.
pub struct Agent {
    config: AgentConfig,
    local_id: InstanceId,
    cloud: Arc<dyn CloudProvider>,
    transports: Arc<dyn TransportFactory>,
    state: Arc<Mutex<AgentState>>,
    fleet: GossipHandle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Bootstrap and start an agent.
    ///
    /// Lists the fleet, resolves the local identity, seeds the gossip
    /// engine with the fleet's endpoints and starts the dispatch task.
    /// Fails if the metadata-reported id is not in the listing: an agent
    /// that is not part of the fleet must not manage it.
    pub async fn start(
        config: AgentConfig,
        cloud: Arc<dyn CloudProvider>,
        identity: Arc<dyn IdentityProvider>,
        transports: Arc<dyn TransportFactory>,
    ) -> AgentResult<Agent> {
        let local_id = identity.instance_id().await?;
        let instances = cloud.list_by_tag(&config.tag).await?;

        let mut registry = ServerRegistry::new(&config.tag);
        for instance in &instances {
            registry.upsert(instance);
        }
        if !registry.contains(&local_id) {
            return Err(AgentError::NotInFleet { id: local_id });
        }
        info!(
            "bootstrapped with {} fleet member(s), local id {}",
            registry.len(),
            local_id
        );

        let seed_peers = peer_endpoints(&registry, &local_id, config.port);
        let transport = transports.bind(config.port).await?;
        let gossip_config = GossipConfig::new(local_id.clone())
            .with_seed_peers(seed_peers)
            .with_interval(config.interval)
            .with_timeout(config.timeout);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (engine, fleet) = GossipEngine::new(gossip_config, transport, events_tx);
        let engine_task = tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                warn!("fleet gossip engine stopped: {}", e);
            }
        });

        let state = Arc::new(Mutex::new(AgentState {
            registry,
            groups: Vec::new(),
            pending: PendingRemovals::new(),
            bootstrapped: false,
            first_convergence_done: false,
            sub_elections: Vec::new(),
        }));

        let dispatcher = Dispatcher {
            state: state.clone(),
            cloud: cloud.clone(),
            fleet: fleet.clone(),
        };
        let dispatch_task = tokio::spawn(dispatcher.run(events_rx, config.interval));

        Ok(Agent {
            config,
            local_id,
            cloud,
            transports,
            state,
            fleet,
            tasks: Mutex::new(vec![engine_task, dispatch_task]),
        })
    }

    /// Register a group. Groups live for the agent's lifetime.
    ///
    /// If the group declares a floating address and the local node is
    /// currently one of its members, a sub-election engine is started on
    /// `port + k`, `k` being the group's registration ordinal (the fleet
    /// engine owns offset zero).
    pub async fn register_group(&self, spec: GroupSpec) -> AgentResult<()> {
        let (sub_port, sub_peers, local_is_member) = {
            let mut state = self.state.lock().await;
            state.groups.push(spec.clone());
            let sub_port = self.config.port + state.groups.len() as u16;

            let members = state.registry.members_of(&spec);
            let local_is_member = members.iter().any(|record| record.id == self.local_id);
            let sub_peers: Vec<SocketAddr> = members
                .iter()
                .filter(|record| record.id != self.local_id)
                .filter_map(|record| endpoint_for(record, sub_port))
                .collect();
            (sub_port, sub_peers, local_is_member)
        };

        info!(
            "registered group matching {:?}, desired size {}",
            spec.match_tags, spec.desired_size
        );

        if let Some(address) = spec.floating_address {
            if local_is_member {
                self.start_sub_election(address, sub_port, sub_peers)
                    .await?;
            } else {
                debug!(
                    "not a member of the {} group, leaving its sub-election to the members",
                    address
                );
            }
        }
        Ok(())
    }

    /// Whether this agent currently holds fleet leadership.
    pub fn is_leader(&self) -> bool {
        self.fleet.is_leader()
    }

    pub fn local_id(&self) -> &InstanceId {
        &self.local_id
    }

    /// Stop the dispatch task and every engine.
    pub async fn shutdown(&self) {
        self.fleet.shutdown();
        {
            let state = self.state.lock().await;
            for handle in &state.sub_elections {
                handle.shutdown();
            }
        }
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("agent {} shut down", self.local_id);
    }

    async fn start_sub_election(
        &self,
        address: String,
        port: u16,
        peers: Vec<SocketAddr>,
    ) -> AgentResult<()> {
        let transport = self.transports.bind(port).await?;
        let config = GossipConfig::new(self.local_id.clone())
            .with_interval(self.config.sub_interval)
            .with_timeout(self.config.sub_timeout)
            .with_seed_peers(peers);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (engine, handle) = GossipEngine::new(config, transport, events_tx);

        info!("sub-election for {} listening on port {}", address, port);

        let engine_task = tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                warn!("sub-election engine stopped: {}", e);
            }
        });

        // Sole subscriber: whoever wins the sub-election points the
        // address at itself. The cloud handle comes in by value, not by
        // reaching back into the agent.
        let cloud = self.cloud.clone();
        let local_id = self.local_id.clone();
        let subscriber_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if matches!(event, GossipEvent::Elected) {
                    match cloud.assign_floating_address(&address, &local_id).await {
                        Ok(()) => info!("floating address {} now points at {}", address, local_id),
                        Err(e) => warn!("floating address {} reassignment failed: {}", address, e),
                    }
                }
            }
        });

        self.state.lock().await.sub_elections.push(handle);
        let mut tasks = self.tasks.lock().await;
        tasks.push(engine_task);
        tasks.push(subscriber_task);
        Ok(())
    }
}

/// Gossip endpoints for every fleet member except the local node.
fn peer_endpoints(registry: &ServerRegistry, local_id: &InstanceId, port: u16) -> Vec<SocketAddr> {
    registry
        .iter()
        .filter(|record| record.id != *local_id)
        .filter_map(|record| {
            let endpoint = endpoint_for(record, port);
            if endpoint.is_none() {
                warn!("fleet member {} has no usable address", record.id);
            }
            endpoint
        })
        .collect()
}

fn endpoint_for(record: &NodeRecord, port: u16) -> Option<SocketAddr> {
    let address = record.preferred_address()?;
    match address.parse::<IpAddr>() {
        Ok(ip) => Some(SocketAddr::new(ip, port)),
        Err(_) => {
            warn!("{} reports unparseable address {}", record.id, address);
            None
        }
    }
}

/// The serialized event-dispatch loop and its handlers.
///
/// Exactly one dispatcher task runs per agent. Each handler runs to
/// completion before the next event is taken, so the registry, groups
/// and pending buffer see single-writer mutation.
struct Dispatcher {
    state: Arc<Mutex<AgentState>>,
    cloud: Arc<dyn CloudProvider>,
    fleet: GossipHandle,
}

impl Dispatcher {
    async fn run(self, mut events_rx: mpsc::UnboundedReceiver<GossipEvent>, tick: Duration) {
        let mut convergence = interval(tick);
        convergence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("gossip event stream closed, dispatch stopping");
                        break;
                    }
                },

                // The leader's periodic pass: re-drives creates that a
                // transient cloud failure swallowed, since convergence
                // is a pure function of the current registry.
                _ = convergence.tick() => {
                    if self.fleet.is_leader() {
                        self.converge_all().await;
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: GossipEvent) {
        match event {
            GossipEvent::Added(peer) => self.on_added(peer).await,
            GossipEvent::Removed(peer) => self.on_removed(peer).await,
            GossipEvent::Elected => self.on_elected().await,
            GossipEvent::Leader(peer) => self.on_leader(peer).await,
        }
    }

    async fn on_added(&self, peer: PeerInfo) {
        debug!("peer {} added as {}", peer.id, peer.role);

        if peer.role == PeerRole::Leader {
            // A newcomer announcing leadership settles bootstrap even if
            // no separate leader event ever fires for it.
            let mut state = self.state.lock().await;
            state.pending.clear();
            state.bootstrapped = true;
        }

        let instance = match self.cloud.get(&peer.id).await {
            Ok(instance) => instance,
            Err(e) => {
                warn!("could not enrich newcomer {}: {}", peer.id, e);
                return;
            }
        };

        let affected = {
            let mut state = self.state.lock().await;
            let record = state.registry.upsert(&instance);
            state.groups_for(&record)
        };

        if self.fleet.is_leader() {
            self.converge_indices(&affected).await;
        }
    }

    async fn on_removed(&self, peer: PeerInfo) {
        if self.fleet.is_leader() {
            let affected = self.run_removal(&peer).await;
            self.converge_indices(&affected).await;
            return;
        }

        if peer.role == PeerRole::Leader {
            info!("buffering removal of departed leader {}", peer.id);
            let mut state = self.state.lock().await;
            state.pending.push(peer);
        }
        // A citizen watching another citizen die stays out of it: the
        // leader observes the same silence and acts on it directly.
    }

    async fn on_elected(&self) {
        let (pending, group_count, bootstrap) = {
            let mut state = self.state.lock().await;
            state.bootstrapped = true;
            let pending = state.pending.drain();
            let bootstrap = !state.first_convergence_done;
            // Flips here, once, so later elections only drain.
            state.first_convergence_done = true;
            (pending, state.groups.len(), bootstrap)
        };

        info!(
            "elected fleet leader, draining {} pending removal(s)",
            pending.len()
        );

        // Convergence is batched after the whole drain: a group that lost
        // two nodes, or one that the bootstrap pass would visit again, is
        // converged once. A freshly requested instance is not in the
        // registry yet, so back-to-back passes over the same group would
        // each request another.
        let mut affected = BTreeSet::new();
        for peer in &pending {
            affected.extend(self.run_removal(peer).await);
        }
        if bootstrap {
            affected.extend(0..group_count);
        }
        let affected: Vec<usize> = affected.into_iter().collect();
        self.converge_indices(&affected).await;
    }

    async fn on_leader(&self, peer: PeerInfo) {
        info!("recognized {} as fleet leader", peer.id);
        let mut state = self.state.lock().await;
        if !state.pending.is_empty() {
            debug!(
                "dropping {} pending removal(s), the leader owns them now",
                state.pending.len()
            );
        }
        state.pending.clear();
        state.bootstrapped = true;
    }

    /// The leader-side removal pipeline: drop the node from the registry
    /// and destroy the instance. Returns the groups the node belonged
    /// to; the caller decides when to converge them.
    async fn run_removal(&self, peer: &PeerInfo) -> Vec<usize> {
        let affected = {
            let mut state = self.state.lock().await;
            let Some(record) = state.registry.remove(&peer.id) else {
                // The registry is the source of truth; an unknown id is
                // stale noise.
                debug!("removal event for unknown instance {}, ignoring", peer.id);
                return Vec::new();
            };
            state.groups_for(&record)
        };

        match self.cloud.destroy(&peer.id).await {
            Ok(()) => info!("destroyed departed instance {}", peer.id),
            Err(e) => warn!("destroy of {} failed: {}", peer.id, e),
        }

        affected
    }

    async fn converge_indices(&self, indices: &[usize]) {
        let groups: Vec<GroupSpec> = {
            let state = self.state.lock().await;
            indices
                .iter()
                .filter_map(|index| state.groups.get(*index).cloned())
                .collect()
        };
        for group in &groups {
            self.converge(group).await;
        }
    }

    async fn converge_all(&self) {
        let groups = self.state.lock().await.groups.clone();
        for group in &groups {
            self.converge(group).await;
        }
    }

    /// Converge one group to its desired size.
    ///
    /// A pure function of the current registry: no retries and no memory
    /// of previous passes. Creations that never materialize leave the
    /// member count short, which is exactly what re-triggers them.
    async fn converge(&self, group: &GroupSpec) {
        let (creations, doomed) = {
            let mut state = self.state.lock().await;
            let members = state.registry.members_of(group);
            let current = members.len();
            let desired = group.desired_size;

            if current < desired {
                (desired - current, Vec::new())
            } else if current > desired {
                let doomed: Vec<InstanceId> = members[..current - desired]
                    .iter()
                    .map(|record| record.id.clone())
                    .collect();
                // Gone from the registry before the destroy goes out, so
                // the next pass already sees the shrunken group.
                for id in &doomed {
                    state.registry.remove(id);
                }
                (0, doomed)
            } else {
                return;
            }
        };

        for _ in 0..creations {
            let template = group.template.named(provision_name(&group.template.name));
            match self.cloud.create(&template).await {
                Ok(id) => info!("requested instance {} ({})", template.name, id),
                Err(e) if e.is_retryable() => {
                    warn!("create of {} failed, next pass retries: {}", template.name, e)
                }
                Err(e) => warn!("create of {} failed permanently: {}", template.name, e),
            }
        }

        for id in &doomed {
            match self.cloud.destroy(id).await {
                Ok(()) => info!("destroyed surplus instance {}", id),
                Err(e) => warn!("destroy of surplus {} failed: {}", id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flotilla_core::{
        AddressKind, DatagramTransport, FlotillaError, Instance, InstanceAddress, InstanceRegion,
        ProvisioningTemplate, Result as CoreResult,
    };
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        List(String),
        Get(InstanceId),
        Create(String),
        Destroy(InstanceId),
        Assign(String, InstanceId),
    }

    #[derive(Default)]
    struct TestCloud {
        instances: StdMutex<HashMap<InstanceId, Instance>>,
        calls: StdMutex<Vec<Call>>,
        failing_creates: StdMutex<usize>,
        next_id: StdMutex<u64>,
    }

    impl TestCloud {
        fn with_instances(instances: Vec<Instance>) -> Arc<Self> {
            let cloud = Self::default();
            *cloud.next_id.lock().unwrap() = 90_000;
            {
                let mut table = cloud.instances.lock().unwrap();
                for instance in instances {
                    table.insert(instance.id.clone(), instance);
                }
            }
            Arc::new(cloud)
        }

        fn fail_next_creates(&self, count: usize) {
            *self.failing_creates.lock().unwrap() = count;
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn created_names(&self) -> Vec<String> {
            self.calls()
                .iter()
                .filter_map(|c| match c {
                    Call::Create(name) => Some(name.clone()),
                    _ => None,
                })
                .collect()
        }

        fn destroys(&self) -> Vec<InstanceId> {
            self.calls()
                .iter()
                .filter_map(|c| match c {
                    Call::Destroy(id) => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl CloudProvider for TestCloud {
        async fn list_by_tag(&self, tag: &str) -> CoreResult<Vec<Instance>> {
            self.calls.lock().unwrap().push(Call::List(tag.to_string()));
            Ok(self
                .instances
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.tags.iter().any(|t| t == tag))
                .cloned()
                .collect())
        }

        async fn get(&self, id: &InstanceId) -> CoreResult<Instance> {
            self.calls.lock().unwrap().push(Call::Get(id.clone()));
            self.instances
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(FlotillaError::InstanceNotFound { id: id.clone() })
        }

        async fn create(&self, template: &ProvisioningTemplate) -> CoreResult<InstanceId> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Create(template.name.clone()));
            {
                let mut failing = self.failing_creates.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    return Err(FlotillaError::cloud_status(503, "maintenance"));
                }
            }
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            Ok(InstanceId::new(next_id.to_string()))
        }

        async fn destroy(&self, id: &InstanceId) -> CoreResult<()> {
            self.calls.lock().unwrap().push(Call::Destroy(id.clone()));
            self.instances.lock().unwrap().remove(id);
            Ok(())
        }

        async fn assign_floating_address(&self, address: &str, id: &InstanceId) -> CoreResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Assign(address.to_string(), id.clone()));
            Ok(())
        }
    }

    struct IdleTransport;

    #[async_trait]
    impl DatagramTransport for IdleTransport {
        async fn send(&self, _target: SocketAddr, _payload: &[u8]) -> CoreResult<()> {
            Ok(())
        }

        async fn recv(&mut self) -> CoreResult<(SocketAddr, Vec<u8>)> {
            std::future::pending().await
        }

        fn local_addr(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    fn instance(id: &str, tags: &[&str]) -> Instance {
        Instance {
            id: InstanceId::new(id),
            name: format!("node-{}", id),
            region: InstanceRegion {
                slug: "ams3".to_string(),
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            addresses: vec![InstanceAddress {
                kind: AddressKind::Private,
                address: "10.0.0.9".to_string(),
            }],
        }
    }

    fn peer(id: &str, role: PeerRole) -> PeerInfo {
        PeerInfo {
            id: InstanceId::new(id),
            endpoint: "10.0.0.9:12345".parse().unwrap(),
            role,
            incarnation: Uuid::new_v4(),
        }
    }

    fn group(name: &str, match_tags: &[&str], desired: usize) -> GroupSpec {
        GroupSpec::new(
            match_tags.iter().copied(),
            ProvisioningTemplate::new(name, "ams3", "s-1vcpu-1gb", "ubuntu-24-04-x64"),
        )
        .with_desired_size(desired)
    }

    /// A dispatcher whose gossip handle never wins an election.
    fn citizen_dispatcher(
        cloud: Arc<TestCloud>,
        instances: &[Instance],
        groups: Vec<GroupSpec>,
    ) -> Dispatcher {
        let mut registry = ServerRegistry::new("fleet");
        for instance in instances {
            registry.upsert(instance);
        }
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let config = GossipConfig::new(InstanceId::new("local"));
        // Never run, so the handle stays a citizen's.
        let (_engine, fleet) = GossipEngine::new(config, IdleTransport, events_tx);

        Dispatcher {
            state: Arc::new(Mutex::new(AgentState {
                registry,
                groups,
                pending: PendingRemovals::new(),
                bootstrapped: false,
                first_convergence_done: false,
                sub_elections: Vec::new(),
            })),
            cloud,
            fleet,
        }
    }

    /// A dispatcher whose engine has actually won an election.
    async fn leader_dispatcher(
        cloud: Arc<TestCloud>,
        instances: &[Instance],
        groups: Vec<GroupSpec>,
    ) -> Dispatcher {
        let dispatcher = citizen_dispatcher(cloud, instances, groups);

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let config = GossipConfig::new(InstanceId::new("local"))
            .with_interval(Duration::from_millis(20))
            .with_timeout(Duration::from_millis(200));
        let (engine, fleet) = GossipEngine::new(config, IdleTransport, events_tx);
        tokio::spawn(engine.run());

        for _ in 0..200 {
            if fleet.is_leader() {
                return Dispatcher { fleet, ..dispatcher };
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never claimed leadership");
    }

    #[tokio::test]
    async fn citizen_buffers_only_leader_removals() {
        let cloud = TestCloud::with_instances(vec![instance("1", &["fleet"])]);
        let dispatcher = citizen_dispatcher(cloud.clone(), &[instance("1", &["fleet"])], vec![]);

        dispatcher.on_removed(peer("1", PeerRole::Citizen)).await;
        assert!(dispatcher.state.lock().await.pending.is_empty());

        dispatcher.on_removed(peer("1", PeerRole::Leader)).await;
        assert_eq!(dispatcher.state.lock().await.pending.len(), 1);

        // Watching is not acting: no control-plane mutation happened.
        assert!(cloud.destroys().is_empty());
        assert!(cloud.created_names().is_empty());
    }

    #[tokio::test]
    async fn leader_removal_destroys_once_and_reconverges() {
        let members = vec![
            instance("1", &["ENV:T", "fleet"]),
            instance("2", &["ENV:T", "fleet"]),
        ];
        let cloud = TestCloud::with_instances(members.clone());
        let dispatcher = leader_dispatcher(
            cloud.clone(),
            &members,
            vec![group("t", &["ENV:T", "fleet"], 2)],
        )
        .await;

        dispatcher.on_removed(peer("2", PeerRole::Citizen)).await;

        assert_eq!(cloud.destroys(), vec![InstanceId::new("2")]);
        assert_eq!(cloud.created_names().len(), 1);
        assert!(!dispatcher
            .state
            .lock()
            .await
            .registry
            .contains(&InstanceId::new("2")));
    }

    #[tokio::test]
    async fn removal_for_unknown_id_is_ignored() {
        let cloud = TestCloud::with_instances(vec![]);
        let dispatcher = leader_dispatcher(cloud.clone(), &[], vec![group("t", &[], 1)]).await;

        dispatcher.on_removed(peer("404", PeerRole::Citizen)).await;
        assert!(cloud.destroys().is_empty());
    }

    #[tokio::test]
    async fn elected_drains_pending_and_bootstraps_exactly_once() {
        let members = vec![
            instance("1", &["ENV:T", "fleet"]),
            instance("2", &["ENV:T", "fleet"]),
        ];
        let cloud = TestCloud::with_instances(members.clone());
        let dispatcher = citizen_dispatcher(
            cloud.clone(),
            &members,
            vec![
                group("t", &["ENV:T", "fleet"], 2),
                group("b", &["ENV:B", "fleet"], 1),
            ],
        );

        // The dead leader's removal arrived while we were a citizen.
        dispatcher.on_removed(peer("2", PeerRole::Leader)).await;
        assert_eq!(dispatcher.state.lock().await.pending.len(), 1);

        dispatcher.on_elected().await;

        // The drain destroyed the dead leader and requested exactly one
        // replacement for its group; the bootstrap pass filled the other
        // group without re-visiting the first.
        assert_eq!(cloud.destroys(), vec![InstanceId::new("2")]);
        let names = cloud.created_names();
        assert_eq!(names.iter().filter(|n| n.starts_with("t-")).count(), 1);
        assert_eq!(names.iter().filter(|n| n.starts_with("b-")).count(), 1);
        assert!(dispatcher.state.lock().await.pending.is_empty());

        // A later election only drains; it does not reconverge the fleet.
        let calls_before = cloud.calls().len();
        dispatcher.on_elected().await;
        assert_eq!(cloud.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn leader_event_clears_pending() {
        let cloud = TestCloud::with_instances(vec![]);
        let dispatcher = citizen_dispatcher(cloud.clone(), &[], vec![]);

        dispatcher.on_removed(peer("9", PeerRole::Leader)).await;
        assert_eq!(dispatcher.state.lock().await.pending.len(), 1);

        dispatcher.on_leader(peer("3", PeerRole::Leader)).await;
        let state = dispatcher.state.lock().await;
        assert!(state.pending.is_empty());
        assert!(state.bootstrapped);
    }

    #[tokio::test]
    async fn added_leader_peer_also_clears_pending() {
        let cloud = TestCloud::with_instances(vec![instance("3", &["fleet"])]);
        let dispatcher = citizen_dispatcher(cloud.clone(), &[], vec![]);

        dispatcher.on_removed(peer("9", PeerRole::Leader)).await;
        dispatcher.on_added(peer("3", PeerRole::Leader)).await;

        let state = dispatcher.state.lock().await;
        assert!(state.pending.is_empty());
        assert!(state.bootstrapped);
        assert!(state.registry.contains(&InstanceId::new("3")));
    }

    #[tokio::test]
    async fn added_peer_unknown_to_the_provider_is_skipped() {
        let cloud = TestCloud::with_instances(vec![]);
        let dispatcher = citizen_dispatcher(cloud.clone(), &[], vec![]);

        dispatcher.on_added(peer("77", PeerRole::Citizen)).await;
        assert!(!dispatcher
            .state
            .lock()
            .await
            .registry
            .contains(&InstanceId::new("77")));
    }

    #[tokio::test]
    async fn converge_is_idempotent_without_membership_change() {
        let members = vec![
            instance("1", &["ENV:T", "fleet"]),
            instance("2", &["ENV:T", "fleet"]),
        ];
        let cloud = TestCloud::with_instances(members.clone());
        let g = group("t", &["ENV:T", "fleet"], 2);
        let dispatcher = leader_dispatcher(cloud.clone(), &members, vec![g.clone()]).await;

        dispatcher.converge(&g).await;
        dispatcher.converge(&g).await;
        assert!(cloud.created_names().is_empty());
        assert!(cloud.destroys().is_empty());
    }

    #[tokio::test]
    async fn desired_size_zero_drains_the_group() {
        let members = vec![
            instance("1", &["ENV:T", "fleet"]),
            instance("2", &["ENV:T", "fleet"]),
        ];
        let cloud = TestCloud::with_instances(members.clone());
        let g = group("t", &["ENV:T", "fleet"], 0);
        let dispatcher = leader_dispatcher(cloud.clone(), &members, vec![g.clone()]).await;

        dispatcher.converge(&g).await;

        let mut destroyed = cloud.destroys();
        destroyed.sort();
        assert_eq!(destroyed, vec![InstanceId::new("1"), InstanceId::new("2")]);
        assert!(dispatcher.state.lock().await.registry.is_empty());
    }

    #[tokio::test]
    async fn shrink_destroys_the_id_sorted_prefix() {
        let members = vec![
            instance("3", &["ENV:T", "fleet"]),
            instance("1", &["ENV:T", "fleet"]),
            instance("2", &["ENV:T", "fleet"]),
        ];
        let cloud = TestCloud::with_instances(members.clone());
        let g = group("t", &["ENV:T", "fleet"], 2);
        let dispatcher = leader_dispatcher(cloud.clone(), &members, vec![g.clone()]).await;

        dispatcher.converge(&g).await;
        assert_eq!(cloud.destroys(), vec![InstanceId::new("1")]);
    }

    #[tokio::test]
    async fn transient_create_failure_is_retried_by_the_next_pass() {
        let members = vec![instance("1", &["ENV:T", "fleet"])];
        let cloud = TestCloud::with_instances(members.clone());
        let g = group("t", &["ENV:T", "fleet"], 2);
        let dispatcher = leader_dispatcher(cloud.clone(), &members, vec![g.clone()]).await;

        cloud.fail_next_creates(1);
        dispatcher.converge(&g).await;
        assert_eq!(cloud.created_names().len(), 1);
        assert_eq!(dispatcher.state.lock().await.registry.len(), 1);

        // Nothing was recorded about the failure; the next pass simply
        // sees a short group again.
        dispatcher.converge(&g).await;
        assert_eq!(cloud.created_names().len(), 2);
    }

    #[tokio::test]
    async fn provisioned_names_are_suffixed() {
        let cloud = TestCloud::with_instances(vec![]);
        let g = group("t", &["fleet"], 1);
        let dispatcher = leader_dispatcher(cloud.clone(), &[], vec![g.clone()]).await;

        dispatcher.converge(&g).await;

        let names = cloud.created_names();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("t-"));
        assert!(names[0].len() > 2);
        assert!(!names[0].contains('_'));
    }
}
