// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type, the composition root of a node. It wires
//! the configuration, behavior registry and transport into the cluster manager, the registries
//! and the cache, and exposes them through `SystemRef`. The `SystemRunner` drives the node:
//! election at startup, the liveness ping loop, and the graceful drain on shutdown.
//!

use crate::{
    actor::{ActorDescriptor, ActorRef},
    behavior::BehaviorRegistry,
    cache::ActorSystemCache,
    cluster::ClusterManager,
    message::{
        ActionType, ChildRemoved, MessageKind, CHILD_MOVED_MESSAGE_TYPE,
        CHILD_REMOVED_MESSAGE_TYPE,
    },
    receptionist::{LocalReceptionist, Receptionist},
    sink::{ClusterEvent, Sink},
    transport::{
        CacheEntry, CreateActorRequest, ElectionMessage, EnqueueRequest,
        EnqueueResponse, NodeService, Transport,
    },
    Error, Host, HostId, Locator, SystemConfig,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, Weak},
    time::Duration,
};

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Create a new actor system.
    ///
    /// Cancelling `token` asks the node to drain its actors to the other hosts and stop.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    ///
    pub fn create(
        config: SystemConfig,
        behaviors: BehaviorRegistry,
        transport: Arc<dyn Transport>,
        token: CancellationToken,
    ) -> Result<(SystemRef, SystemRunner), Error> {
        config.validate()?;
        let system = SystemRef::new(config, behaviors, transport);
        let runner = SystemRunner::new(system.clone(), token);
        Ok((system, runner))
    }
}

/// Lifecycle status of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    Starting,
    Ready,
    Rebalancing,
    Draining,
    Stopped,
}

impl SystemStatus {
    /// True while the node accepts messages for its actors.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, SystemStatus::Ready | SystemStatus::Rebalancing)
    }
}

pub(crate) struct SystemInner {
    config: SystemConfig,
    me: HostId,
    status: RwLock<SystemStatus>,
    behaviors: BehaviorRegistry,
    transport: Arc<dyn Transport>,
    cluster: ClusterManager,
    receptionist: Receptionist,
    local_receptionist: LocalReceptionist,
    cache: ActorSystemCache,
    root: ActorRef,
    events: broadcast::Sender<ClusterEvent>,
    /// Stops every actor runner of the node.
    halt: CancellationToken,
}

/// Non-owning handle used by the components the system owns.
#[derive(Clone)]
pub(crate) struct WeakSystem(Weak<SystemInner>);

impl WeakSystem {
    pub(crate) fn upgrade(&self) -> Result<SystemRef, Error> {
        self.0
            .upgrade()
            .map(|inner| SystemRef { inner })
            .ok_or(Error::SystemStopped)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        WeakSystem(Weak::new())
    }
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    inner: Arc<SystemInner>,
}

impl SystemRef {
    fn new(
        config: SystemConfig,
        behaviors: BehaviorRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        let inner = Arc::new_cyclic(|weak| {
            let system = WeakSystem(weak.clone());
            let me = config.me();
            let root_locator = Locator::root();
            let root = ActorRef::new(
                system.clone(),
                root_locator.name(),
                root_locator.clone(),
                me.actor_url(&root_locator),
                "",
                me.clone(),
                None,
                None,
            );
            SystemInner {
                cluster: ClusterManager::new(&config, system.clone()),
                receptionist: Receptionist::new(system.clone()),
                local_receptionist: LocalReceptionist::new(),
                cache: ActorSystemCache::new(system),
                status: RwLock::new(SystemStatus::Starting),
                config,
                me,
                behaviors,
                transport,
                root,
                events,
                halt: CancellationToken::new(),
            }
        });
        SystemRef { inner }
    }

    pub(crate) fn downgrade(&self) -> WeakSystem {
        WeakSystem(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Identity of this node.
    pub fn me(&self) -> &HostId {
        &self.inner.me
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.inner.behaviors
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    pub fn cluster(&self) -> &ClusterManager {
        &self.inner.cluster
    }

    pub fn receptionist(&self) -> &Receptionist {
        &self.inner.receptionist
    }

    pub fn local_receptionist(&self) -> &LocalReceptionist {
        &self.inner.local_receptionist
    }

    pub fn cache(&self) -> &ActorSystemCache {
        &self.inner.cache
    }

    /// The root of the actor tree (`-/`). Top level actors are its children.
    pub fn root(&self) -> &ActorRef {
        &self.inner.root
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.halt
    }

    pub fn status(&self) -> SystemStatus {
        *self.inner.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: SystemStatus) {
        let mut current =
            self.inner.status.write().unwrap_or_else(PoisonError::into_inner);
        if *current != status {
            debug!("Node {} status {:?} -> {:?}", self.inner.me, *current, status);
            *current = status;
        }
    }

    /// Moves from `from` to `to` only if the node is in `from`.
    pub(crate) fn transition(&self, from: SystemStatus, to: SystemStatus) -> bool {
        let mut current =
            self.inner.status.write().unwrap_or_else(PoisonError::into_inner);
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    }

    /// Receiver of the cluster events observed by this node.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn publish(&self, event: ClusterEvent) {
        // No subscriber is not an error.
        let _ = self.inner.events.send(event);
    }

    /// Run a sink. The sink will be run in a separate task.
    ///
    pub fn run_sink(&self, mut sink: Sink) {
        tokio::spawn(async move {
            sink.run().await;
        });
    }

    /// Creates a top level actor.
    pub async fn create_actor(
        &self,
        name: &str,
        behavior_definition: &str,
    ) -> Result<ActorRef, Error> {
        self.root().spawn_child(name, behavior_definition).await
    }

    /// Resolves a locator against the local registry, the cluster registry and finally the
    /// leader.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorNotFound` if no source knows the locator.
    ///
    pub async fn lookup(&self, locator: &Locator) -> Result<ActorRef, Error> {
        if locator.is_root() {
            return Ok(self.root().clone());
        }
        if let Some(found) = self.lookup_registered(locator).await {
            return Ok(found);
        }
        if let Some(found) = self.lookup_at_leader(locator).await {
            return Ok(found);
        }
        Err(Error::ActorNotFound(locator.to_string()))
    }

    /// Local registry, then cluster registry.
    pub async fn lookup_registered(&self, locator: &Locator) -> Option<ActorRef> {
        if let Some(local) = self.local_receptionist().lookup(locator).await {
            return Some(local);
        }
        self.receptionist().lookup(locator).await
    }

    pub async fn lookup_by_name(&self, name: &str) -> Vec<ActorRef> {
        self.receptionist().lookup_by_name(name).await
    }

    async fn lookup_at_leader(&self, locator: &Locator) -> Option<ActorRef> {
        let leader = self.cluster().leader_manager().current_leader().await?;
        if leader.id() == self.me() {
            return None;
        }
        match self
            .transport()
            .get_actor(leader.id(), locator.to_string())
            .await
        {
            Ok(Some(descriptor)) => {
                let found = self.actor_ref_from(&descriptor).await.ok()?;
                self.receptionist().register(found.clone()).await;
                Some(found)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Leader lookup of {} failed: {}", locator, e);
                None
            }
        }
    }

    /// Looks for a reference to `locator` other than the one at `stale_url`.
    pub(crate) async fn resolve_fresh(
        &self,
        locator: &Locator,
        stale_url: &str,
    ) -> Option<ActorRef> {
        if let Some(local) = self.local_receptionist().lookup(locator).await {
            if local.is_local() {
                return Some(local);
            }
        }
        if let Some(known) = self.receptionist().lookup(locator).await {
            if known.actor_url() != stale_url {
                return Some(known);
            }
        }
        let found = self.lookup_at_leader(locator).await?;
        (found.actor_url() != stale_url).then_some(found)
    }

    /// Turns a wire descriptor into a reference, reusing the live local instance or the known
    /// registry entry when they match.
    pub(crate) async fn actor_ref_from(
        &self,
        descriptor: &ActorDescriptor,
    ) -> Result<ActorRef, Error> {
        let locator = Locator::parse(&descriptor.locator)?;
        if let Some(local) = self.local_receptionist().lookup(&locator).await {
            if local.actor_url() == descriptor.actor_url {
                return Ok(local);
            }
        }
        if let Some(known) = self.receptionist().lookup(&locator).await {
            if known.actor_url() == descriptor.actor_url {
                return Ok(known);
            }
        }
        ActorRef::remote(self.downgrade(), descriptor)
    }

    /// Points the parent's cached child link at `fresh`. Local parents are updated in place,
    /// remote parents receive a child-moved system message.
    pub(crate) fn notify_parent_of_move(&self, fresh: &ActorRef) {
        let Some(parent) = fresh.locator().parent() else {
            return;
        };
        let system = self.clone();
        let fresh = fresh.clone();
        tokio::spawn(async move {
            if parent.is_root() {
                system.root().set_child(fresh.name(), fresh.clone());
                return;
            }
            if let Some(local) = system.local_receptionist().lookup(&parent).await {
                local.set_child(fresh.name(), fresh.clone());
                return;
            }
            let Some(remote) = system.receptionist().lookup(&parent).await else {
                debug!("Parent {} of {} is unknown.", parent, fresh.locator());
                return;
            };
            let message = match serde_json::to_string(&fresh.descriptor()) {
                Ok(message) => message,
                Err(e) => {
                    error!("Can not serialize descriptor of {}: {}", fresh.locator(), e);
                    return;
                }
            };
            let request = EnqueueRequest {
                locator: parent.to_string(),
                message_type: CHILD_MOVED_MESSAGE_TYPE.to_owned(),
                message,
                action: ActionType::Tell,
                prioritize: false,
                timeout_ms: None,
            };
            if let Err(e) = system.transport().enqueue(remote.host(), request).await {
                debug!("Notifying parent {} failed: {}", parent, e);
            }
        });
    }

    /// Drops a parent's link to a child that died with its host. Local parents are edited in
    /// place; a parent on another node gets a child-removed message when `notify_remote` is set.
    pub(crate) async fn notify_parent_removed(&self, removed: &ActorRef, notify_remote: bool) {
        let Some(parent) = removed.locator().parent() else {
            return;
        };
        let local = if parent.is_root() {
            Some(self.root().clone())
        } else {
            self.local_receptionist().lookup(&parent).await
        };
        if let Some(parent) = local {
            let stale = parent
                .child(removed.name())
                .map(|child| child.host() == removed.host())
                .unwrap_or(false);
            if stale {
                debug!("Parent {} drops child {}.", parent.locator(), removed.name());
                parent.remove_child(removed.name());
            }
            return;
        }
        if !notify_remote {
            return;
        }
        let Some(remote) = self.receptionist().lookup(&parent).await else {
            return;
        };
        let message = match serde_json::to_string(&ChildRemoved {
            name: removed.name().to_owned(),
            host: removed.host().clone(),
        }) {
            Ok(message) => message,
            Err(e) => {
                error!("Can not serialize removal of {}: {}", removed.locator(), e);
                return;
            }
        };
        let request = EnqueueRequest {
            locator: parent.to_string(),
            message_type: CHILD_REMOVED_MESSAGE_TYPE.to_owned(),
            message,
            action: ActionType::Tell,
            prioritize: false,
            timeout_ms: None,
        };
        if let Err(e) = self.transport().enqueue(remote.host(), request).await {
            debug!("Notifying parent {} failed: {}", parent, e);
        }
    }

    /// Joins the cluster: elects a leader, waits for the election to complete and opens the
    /// node for traffic.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoLeader` if the election did not complete in time.
    ///
    pub async fn start(&self) -> Result<(), Error> {
        let leader = self.cluster().leader_manager();
        leader.elect_leader().await?;
        leader
            .wait_for_election(
                self.config().election_poll_interval(),
                self.config().election_timeout(),
            )
            .await?;
        self.transition(SystemStatus::Starting, SystemStatus::Ready);
        info!("Actor system {} ready on {}.", self.config().name, self.me());
        Ok(())
    }

    /// Stops every local actor at once. Queued messages are lost.
    pub fn stop(&self) {
        debug!("Stopping actor system...");
        self.set_status(SystemStatus::Stopped);
        self.inner.halt.cancel();
    }

    /// Transfers every local actor to the other hosts within the configured grace period, then
    /// stops.
    pub async fn shutdown(&self) {
        let grace = self.config().shutdown_grace();
        match tokio::time::timeout(grace, self.cluster().drain()).await {
            Ok(Ok(moved)) => info!("Drained {} actors from {}.", moved, self.me()),
            Ok(Err(e)) => warn!("Drain of {} failed: {}", self.me(), e),
            Err(_) => warn!("Drain of {} did not finish within {:?}.", self.me(), grace),
        }
        self.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == SystemStatus::Stopped
    }

    /// Snapshot of this node's view of the cluster.
    pub async fn node_status(&self) -> NodeStatus {
        let leader = self
            .cluster()
            .leader_manager()
            .current_leader()
            .await
            .map(|host| host.id().to_string());
        NodeStatus {
            name: self.config().name.clone(),
            host: self.me().to_string(),
            status: self.status(),
            is_leader: leader.as_deref() == Some(self.me().to_string().as_str()),
            leader,
            hosts: self.cluster().hosts().await,
            local_actors: self.local_receptionist().len().await,
            registered_actors: self.receptionist().len().await,
        }
    }

    /// The actor tree as recorded in the cluster registry.
    pub async fn actor_tree(&self) -> ActorTree {
        let actors = self.receptionist().all().await;
        let registered: HashMap<Locator, &ActorRef> = actors
            .iter()
            .map(|actor| (actor.locator().clone(), actor))
            .collect();

        // Actors hang under their closest registered ancestor.
        let mut children: HashMap<Locator, Vec<&ActorRef>> = HashMap::new();
        for actor in &actors {
            let mut parent = actor.locator().parent();
            while let Some(candidate) = parent.as_ref() {
                if candidate.is_root() || registered.contains_key(candidate) {
                    break;
                }
                parent = candidate.parent();
            }
            children
                .entry(parent.unwrap_or_else(Locator::root))
                .or_default()
                .push(actor);
        }

        fn build(
            locator: &Locator,
            actor: Option<&ActorRef>,
            children: &HashMap<Locator, Vec<&ActorRef>>,
        ) -> ActorTree {
            let nodes = children
                .get(locator)
                .map(|list| {
                    list.iter()
                        .map(|child| build(child.locator(), Some(child), children))
                        .collect()
                })
                .unwrap_or_default();
            ActorTree {
                name: locator.name().to_owned(),
                locator: locator.to_string(),
                actor_url: actor.map(|a| a.actor_url().to_owned()),
                children: nodes,
            }
        }

        build(&Locator::root(), None, &children)
    }
}

/// Status of a node: the data behind the node's status endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub host: String,
    pub status: SystemStatus,
    pub leader: Option<String>,
    pub is_leader: bool,
    pub hosts: Vec<Host>,
    pub local_actors: usize,
    pub registered_actors: usize,
}

/// Serializable actor tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorTree {
    pub name: String,
    pub locator: String,
    pub actor_url: Option<String>,
    pub children: Vec<ActorTree>,
}

impl ActorTree {
    /// Number of actors in the tree, the root excluded.
    pub fn count(&self) -> usize {
        self.children.iter().map(|child| 1 + child.count()).sum()
    }
}

#[async_trait]
impl NodeService for SystemRef {
    async fn create_actor_as_leader(
        &self,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        self.cluster()
            .create_actor(request)
            .await
            .map(|actor| actor.descriptor())
    }

    async fn create_local_actor(
        &self,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        let status = self.status();
        if matches!(status, SystemStatus::Draining | SystemStatus::Stopped) {
            return Err(Error::Unavailable(
                self.me().to_string(),
                format!("{:?}", status),
            ));
        }
        self.cluster()
            .create_local_actor(request)
            .await
            .map(|actor| actor.descriptor())
    }

    async fn get_actor(
        &self,
        locator: String,
    ) -> Result<Option<ActorDescriptor>, Error> {
        let locator = Locator::parse(&locator)?;
        Ok(self
            .lookup_registered(&locator)
            .await
            .map(|actor| actor.descriptor()))
    }

    async fn enqueue(
        &self,
        request: EnqueueRequest,
    ) -> Result<EnqueueResponse, Error> {
        let status = self.status();
        if !status.accepts_messages() {
            return Err(Error::Unavailable(
                self.me().to_string(),
                format!("{:?}", status),
            ));
        }
        let locator = Locator::parse(&request.locator)?;
        let actor = self
            .local_receptionist()
            .lookup(&locator)
            .await
            .ok_or_else(|| Error::ActorNotFound(request.locator.clone()))?;
        let cell = actor
            .local_cell()
            .ok_or_else(|| Error::ActorNotFound(request.locator.clone()))?;
        let payload = serde_json::from_str(&request.message)?;
        let result = actor
            .enqueue_local(
                cell,
                MessageKind::parse(&request.message_type),
                payload,
                request.action,
                request.prioritize,
                request.timeout_ms.map(Duration::from_millis),
            )
            .await;
        match result {
            Ok(value) => EnqueueResponse::ok(&value),
            Err(e) if e.is_delivery_failure() => Err(e),
            Err(e) => Ok(EnqueueResponse::failed(e)),
        }
    }

    async fn sync_registrations(
        &self,
        mut registrations: BoxStream<'static, ActorDescriptor>,
    ) -> Result<(), Error> {
        while let Some(descriptor) = registrations.next().await {
            match self.actor_ref_from(&descriptor).await {
                Ok(actor) => self.receptionist().register(actor).await,
                Err(e) => warn!("Ignoring registration of {}: {}", descriptor.locator, e),
            }
        }
        Ok(())
    }

    async fn ping(&self, message: String) -> Result<String, Error> {
        if self.is_stopped() {
            return Err(Error::Unavailable(
                self.me().to_string(),
                "stopped".to_owned(),
            ));
        }
        Ok(message)
    }

    async fn election(
        &self,
        message: ElectionMessage,
    ) -> Result<ElectionMessage, Error> {
        if self.is_stopped() {
            return Err(Error::Unavailable(
                self.me().to_string(),
                "stopped".to_owned(),
            ));
        }
        let leader = self.cluster().leader_manager();
        leader.add_or_update_node(&message).await;
        if let Err(e) = leader.check_and_update_leader_status().await {
            warn!("Leader check during election failed: {}", e);
        }
        self.cluster().leader_view_changed().await;
        let current = match leader.current_leader().await {
            Some(current) => current,
            None => self.cluster().me_host().await,
        };
        Ok(ElectionMessage {
            host: current.id().address.clone(),
            port: current.id().port,
            priority: current.priority(),
        })
    }

    async fn sync_cache(
        &self,
        mut entries: BoxStream<'static, CacheEntry>,
    ) -> Result<(), Error> {
        while let Some(entry) = entries.next().await {
            self.cache().apply(entry).await?;
        }
        Ok(())
    }
}

/// System runner.
pub struct SystemRunner {
    system: SystemRef,
    token: CancellationToken,
    handle_signals: bool,
}

impl SystemRunner {
    pub(crate) fn new(system: SystemRef, token: CancellationToken) -> Self {
        Self {
            system,
            token,
            handle_signals: false,
        }
    }

    /// Also shut down gracefully on SIGINT or SIGTERM.
    pub fn with_signals(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    /// Run the actor system: join the cluster, then ping the other hosts until shutdown.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        let system = self.system.clone();
        let startup = async {
            tokio::time::sleep(system.config().startup_delay()).await;
            system.start().await
        };
        tokio::select! {
            _ = self.token.cancelled() => {
                self.system.stop();
                debug!("Actor system stopped.");
                return;
            }
            result = startup => {
                if let Err(e) = result {
                    error!("Actor system failed to start: {}", e);
                    self.system.stop();
                    return;
                }
            }
        }

        let mut interval = tokio::time::interval(self.system.config().ping_interval());
        interval.tick().await;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!("Shutdown requested for {}.", self.system.me());
                    self.system.shutdown().await;
                    break;
                }
                _ = shutdown_signal(), if self.handle_signals => {
                    info!("Termination signal received by {}.", self.system.me());
                    self.system.shutdown().await;
                    break;
                }
                _ = interval.tick() => {
                    if self.system.is_stopped() {
                        break;
                    }
                    if let Err(e) = self.system.cluster().ping_nodes().await {
                        warn!("Ping round failed: {}", e);
                    }
                }
            }
        }
        debug!("Actor system stopped.");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!("Can not listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::transport::LocalNetwork;

    use tracing_test::traced_test;

    fn single_node() -> (SystemRef, SystemRunner, CancellationToken) {
        let network = LocalNetwork::new();
        let config = SystemConfig::new("node-1", 6161).with_priority(1);
        let me = config.me();
        let token = CancellationToken::new();
        let (system, runner) = ActorSystem::create(
            config,
            BehaviorRegistry::new(),
            network.transport_for(&me),
            token.clone(),
        )
        .unwrap();
        network.register(&me, Arc::new(system.clone()));
        (system, runner, token)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_actor_system() {
        let (system, mut runner, token) = single_node();

        tokio::spawn(async move {
            runner.run().await;
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(logs_contain("Running actor system..."));
        assert_eq!(system.status(), SystemStatus::Ready);
        token.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(logs_contain("Stopping actor system..."));
        assert!(logs_contain("Actor system stopped."));
        assert!(system.is_stopped());
    }

    #[tokio::test]
    async fn test_single_node_is_leader() {
        let (system, _runner, _token) = single_node();
        system.start().await.unwrap();
        let status = system.node_status().await;
        assert!(status.is_leader);
        assert_eq!(status.leader, Some("node-1:6161".to_owned()));
        assert_eq!(status.status, SystemStatus::Ready);
        assert_eq!(status.hosts.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_refused_before_ready() {
        let (system, _runner, _token) = single_node();
        let result = NodeService::enqueue(
            &system,
            EnqueueRequest {
                locator: "-/a".to_owned(),
                message_type: "default".to_owned(),
                message: "null".to_owned(),
                action: ActionType::Tell,
                prioritize: false,
                timeout_ms: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Unavailable(..))));
    }

    #[tokio::test]
    async fn test_lookup_root_and_unknown() {
        let (system, _runner, _token) = single_node();
        system.start().await.unwrap();
        let root = system.lookup(&Locator::root()).await.unwrap();
        assert!(root.locator().is_root());
        let missing = system.lookup(&Locator::parse("-/ghost").unwrap()).await;
        assert_eq!(missing, Err(Error::ActorNotFound("-/ghost".to_owned())));
    }
}
