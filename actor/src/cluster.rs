// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Cluster manager
//!
//! The cluster manager owns the host list and drives actor placement:
//!
//! - **Creation**: `create_actor` is idempotent and coalesces concurrent requests for the same
//!   locator into one flow whose outcome is fanned out to every waiter. The leader places actors
//!   round-robin over the host list; other nodes forward the request to the leader.
//! - **Liveness**: `ping_nodes` probes every other host. Dead hosts are dropped, their actors are
//!   removed from the registry and, on the leader, respawned through the creation protocol.
//! - **Relocation**: `transfer` moves a live actor with its state; `rebalance` realigns placement
//!   after a topology change; `drain` moves every local actor away before shutdown.
//!

use crate::{
    actor::{ActorDescriptor, ActorRef},
    leader::LeaderManager,
    locator::validate_name,
    message::{ActionType, MessageKind, TransferRequest},
    runner::ActorRunner,
    sink::ClusterEvent,
    system::{SystemRef, SystemStatus, WeakSystem},
    transport::{CreateActorRequest, SpawnReason},
    Error, Host, HostId, HostStatus, Locator, SystemConfig,
};

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex, PoisonError,
    },
};

type Waiter = oneshot::Sender<Result<ActorRef, Error>>;

pub struct ClusterManager {
    system: WeakSystem,
    me: HostId,
    priority: u64,
    hosts: RwLock<Vec<Host>>,
    leader: LeaderManager,
    round_robin: AtomicUsize,
    in_progress: StdMutex<HashMap<Locator, Vec<Waiter>>>,
    last_leader: Mutex<Option<HostId>>,
    /// Actors of dead hosts seen while another node was leader.
    orphans: Mutex<Vec<ActorRef>>,
    topology_changed: AtomicBool,
    rebalancing: AtomicBool,
}

impl ClusterManager {
    pub(crate) fn new(config: &SystemConfig, system: WeakSystem) -> Self {
        let me = config.me();
        let priority = config.resolve_priority();
        let mut hosts: Vec<Host> = Vec::new();
        for seed in &config.cluster {
            let id = HostId::from(seed);
            if id != me && !hosts.iter().any(|h| h.id() == &id) {
                hosts.push(Host::new(id));
            }
        }
        let mut own = Host::with_priority(me.clone(), priority);
        own.set_status(HostStatus::Alive);
        hosts.push(own);
        hosts.sort_by(|a, b| a.id().cmp(b.id()));

        Self {
            leader: LeaderManager::new(me.clone(), system.clone()),
            system,
            me,
            priority,
            hosts: RwLock::new(hosts),
            round_robin: AtomicUsize::new(0),
            in_progress: StdMutex::new(HashMap::new()),
            last_leader: Mutex::new(None),
            orphans: Mutex::new(Vec::new()),
            topology_changed: AtomicBool::new(false),
            rebalancing: AtomicBool::new(false),
        }
    }

    fn system(&self) -> Result<SystemRef, Error> {
        self.system.upgrade()
    }

    pub fn me(&self) -> &HostId {
        &self.me
    }

    pub fn leader_manager(&self) -> &LeaderManager {
        &self.leader
    }

    /// Every known host, sorted by identifier.
    pub async fn hosts(&self) -> Vec<Host> {
        self.hosts.read().await.clone()
    }

    pub async fn other_hosts(&self) -> Vec<Host> {
        self.hosts
            .read()
            .await
            .iter()
            .filter(|host| host.id() != &self.me)
            .cloned()
            .collect()
    }

    pub async fn me_host(&self) -> Host {
        self.hosts
            .read()
            .await
            .iter()
            .find(|host| host.id() == &self.me)
            .cloned()
            .unwrap_or_else(|| Host::with_priority(self.me.clone(), self.priority))
    }

    pub async fn is_leader(&self) -> bool {
        self.leader.is_leader().await
    }

    /// Adds an unseen host or refreshes a known one. Returns true if the host is new.
    pub(crate) async fn add_or_update_host(&self, host: Host) -> bool {
        let mut hosts = self.hosts.write().await;
        if let Some(known) = hosts.iter_mut().find(|h| h.id() == host.id()) {
            if let Some(priority) = host.priority() {
                known.set_priority(priority);
            }
            known.set_status(HostStatus::Alive);
            return false;
        }
        info!("Host {} joined the cluster.", host.id());
        let mut host = host;
        host.set_status(HostStatus::Alive);
        let id = host.id().to_string();
        hosts.push(host);
        hosts.sort_by(|a, b| a.id().cmp(b.id()));
        drop(hosts);
        self.topology_changed.store(true, Ordering::SeqCst);
        if let Ok(system) = self.system() {
            system.publish(ClusterEvent::HostJoined { host: id });
        }
        true
    }

    async fn set_host_status(&self, id: &HostId, status: HostStatus) {
        if let Some(host) = self.hosts.write().await.iter_mut().find(|h| h.id() == id) {
            host.set_status(status);
        }
    }

    /// Creates the actor described by `request` somewhere in the cluster, or returns the
    /// existing reference if the locator already resolves.
    ///
    /// Concurrent calls for the same locator share a single creation flow.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorCreation` once every placement option failed.
    ///
    pub async fn create_actor(&self, request: CreateActorRequest) -> Result<ActorRef, Error> {
        let system = self.system()?;
        let locator = Locator::parse(&request.locator)?;
        if let Some(existing) = system.lookup_registered(&locator).await {
            return Ok(existing);
        }

        let (sender, receiver) = oneshot::channel();
        let first = {
            let mut in_progress =
                self.in_progress.lock().unwrap_or_else(PoisonError::into_inner);
            let waiters = in_progress.entry(locator.clone()).or_default();
            waiters.push(sender);
            waiters.len() == 1
        };

        if first {
            // The flow outlives the caller so a dropped caller never strands the waiters.
            let locator = locator.clone();
            tokio::spawn(async move {
                let cluster = system.cluster();
                let result = cluster.place(&request, &locator).await;
                let waiters = cluster
                    .in_progress
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&locator)
                    .unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }
            });
        } else {
            debug!("Creation of {} already in progress, waiting.", locator);
        }

        receiver.await.map_err(|_| {
            Error::ActorCreation(format!("creation of {} was abandoned", locator))
        })?
    }

    /// One creation flow: leader placement or forwarding to the leader, retried across hosts.
    /// A failure that is not a delivery failure ends the flow at once.
    ///
    /// Boxed: a leader check can elect, and an election can respawn through `create_actor`.
    fn place<'a>(
        &'a self,
        request: &'a CreateActorRequest,
        locator: &'a Locator,
    ) -> BoxFuture<'a, Result<ActorRef, Error>> {
        async move {
            let system = self.system()?;
            let attempts = self.hosts.read().await.len().max(1);
            let mut last_error = Error::ActorCreation(format!("no host accepted {}", locator));

            for _ in 0..attempts {
                if self.is_leader().await {
                    match self.create_as_leader(request, locator).await {
                        Ok(actor_ref) => return Ok(actor_ref),
                        Err(e) if !e.is_delivery_failure() => return Err(creation_error(e)),
                        Err(e) => {
                            warn!("Placing {} failed: {}. Trying next host.", locator, e);
                            last_error = e;
                        }
                    }
                } else {
                    let Some(leader) = self.leader.current_leader().await else {
                        return Err(Error::NoLeader);
                    };
                    match system
                        .transport()
                        .create_actor_as_leader(leader.id(), request.clone())
                        .await
                    {
                        Ok(descriptor) => {
                            let actor_ref = system.actor_ref_from(&descriptor).await?;
                            system.receptionist().register(actor_ref.clone()).await;
                            return Ok(actor_ref);
                        }
                        Err(e) if !e.is_delivery_failure() => {
                            error!(
                                "Leader {} refused to create {}: {}",
                                leader.id(),
                                locator,
                                e
                            );
                            return Err(creation_error(e));
                        }
                        Err(e) => {
                            error!(
                                "Actor creation of {} failed by leader {}: {}",
                                locator,
                                leader.id(),
                                e
                            );
                            last_error = e;
                            if let Err(e) = self.leader.check_and_update_leader_status().await {
                                warn!("Leader check failed: {}", e);
                            }
                        }
                    }
                }
            }

            Err(creation_error(last_error))
        }
        .boxed()
    }

    /// Single placement attempt on the leader: next host in round-robin order.
    async fn create_as_leader(
        &self,
        request: &CreateActorRequest,
        locator: &Locator,
    ) -> Result<ActorRef, Error> {
        let system = self.system()?;
        if let Some(existing) = system.receptionist().lookup(locator).await {
            return Ok(existing);
        }
        let target = self.next_host().await?;
        debug!("Leader places {} on {}.", locator, target);
        if target == self.me {
            return self.create_local_actor(request.clone()).await;
        }
        let descriptor = system
            .transport()
            .create_local_actor(&target, request.clone())
            .await?;
        let actor_ref = system.actor_ref_from(&descriptor).await?;
        system.receptionist().register(actor_ref.clone()).await;
        Ok(actor_ref)
    }

    async fn next_host(&self) -> Result<HostId, Error> {
        let hosts = self.hosts.read().await;
        if hosts.is_empty() {
            return Err(Error::ActorCreation("no hosts known".to_owned()));
        }
        let index = self.round_robin.fetch_add(1, Ordering::SeqCst) % hosts.len();
        Ok(hosts[index].id().clone())
    }

    /// Materializes the actor on this node, registers it locally and syncs the registration to
    /// every other host. Returns the running instance if it already exists here.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` for a malformed request, `Error::ActorCreation` for an
    /// unknown behavior, `Error::Serialization` for unreadable state.
    ///
    pub async fn create_local_actor(
        &self,
        request: CreateActorRequest,
    ) -> Result<ActorRef, Error> {
        let system = self.system()?;
        let locator = Locator::parse(&request.locator)?;
        validate_name(&request.name)?;
        if locator.is_root() || locator.name() != request.name {
            return Err(Error::InvalidLocator(format!(
                "{} does not name actor {}",
                locator, request.name
            )));
        }
        let behavior = system.behaviors().behavior(&request.behavior_definition)?;
        let state = match &request.state {
            Some(json) => serde_json::from_str(json)?,
            None => Value::Null,
        };
        let mut children = Vec::with_capacity(request.children.len());
        for descriptor in &request.children {
            match system.actor_ref_from(descriptor).await {
                Ok(child) => children.push((descriptor.name.clone(), child)),
                Err(e) => warn!("Dropping child {} of {}: {}", descriptor.locator, locator, e),
            }
        }

        let (actor_ref, created) = system
            .local_receptionist()
            .get_or_insert_with(&locator, || {
                Ok(ActorRunner::spawn(
                    &system, &request, locator.clone(), behavior, state, children,
                ))
            })
            .await?;

        if created {
            system.receptionist().sync_registration(&actor_ref).await?;
            info!(
                "Actor {} materialized on {} ({}).",
                locator,
                self.me,
                request.reason.as_str()
            );
            if request.reason == SpawnReason::Created {
                system.publish(ClusterEvent::ActorCreated {
                    locator: locator.to_string(),
                    actor_url: actor_ref.actor_url().to_owned(),
                });
            }
        }
        Ok(actor_ref)
    }

    /// Pings every other host once. Dead hosts are handled, a dead leader triggers an
    /// election, and the leader rebalances after a topology change.
    pub async fn ping_nodes(&self) -> Result<(), Error> {
        let system = self.system()?;
        let others = self.other_hosts().await;
        let leader = self.leader.current_leader().await.map(|h| h.id().clone());
        let transport = system.transport();
        let calls = others.iter().map(|host| {
            let transport = transport.clone();
            async move { (host.id().clone(), transport.ping(host.id(), "ping".to_owned()).await) }
        });

        let mut down = Vec::new();
        for (id, result) in join_all(calls).await {
            match result {
                Ok(_) => self.set_host_status(&id, HostStatus::Alive).await,
                Err(e) => {
                    debug!("Node {} is down: {}", id, e);
                    down.push(id);
                }
            }
        }

        let leader_down = leader.map(|l| down.contains(&l)).unwrap_or(false);
        for id in &down {
            self.host_down(id).await;
        }
        if leader_down {
            self.leader.elect_leader().await?;
        } else if !down.is_empty() {
            self.leader_view_changed().await;
        }

        if system.config().rebalance_on_topology_change
            && self.is_leader().await
            && self.topology_changed.swap(false, Ordering::SeqCst)
        {
            self.rebalance().await?;
        }
        Ok(())
    }

    /// Handles a confirmed dead host: removes it, drops its actors from the registry, tells
    /// local parents and respawns the actors if this node leads.
    pub async fn host_down(&self, id: &HostId) {
        if id == &self.me {
            return;
        }
        let Ok(system) = self.system() else {
            return;
        };
        let removed_host = {
            let mut hosts = self.hosts.write().await;
            let before = hosts.len();
            hosts.retain(|host| host.id() != id);
            before != hosts.len()
        };
        if removed_host {
            warn!("Host {} is down.", id);
            self.topology_changed.store(true, Ordering::SeqCst);
            system.publish(ClusterEvent::HostDown {
                host: id.to_string(),
            });
        }

        let removed = system.receptionist().remove_host(id).await;
        if removed.is_empty() {
            return;
        }
        debug!("Removed {} actors owned by {}.", removed.len(), id);
        let leading = self.is_leader().await;
        for actor in &removed {
            system.notify_parent_removed(actor, leading).await;
        }
        if leading {
            self.respawn(removed).await;
        } else {
            self.orphans.lock().await.extend(removed);
        }
    }

    /// Re-runs the creation protocol for actors of a dead host. State is not recovered.
    pub(crate) async fn respawn(&self, actors: Vec<ActorRef>) {
        let Ok(system) = self.system() else {
            return;
        };
        for actor in actors {
            let request = CreateActorRequest {
                name: actor.name().to_owned(),
                locator: actor.locator().to_string(),
                behavior_definition: actor.behavior_definition().to_owned(),
                error_handler: actor.error_handler().map(str::to_owned),
                state: None,
                children: Vec::new(),
                reason: SpawnReason::Respawned,
            };
            match self.create_actor(request).await {
                Ok(fresh) => {
                    info!("Actor {} respawned at {}.", fresh.locator(), fresh.actor_url());
                    system.publish(ClusterEvent::ActorRespawned {
                        locator: fresh.locator().to_string(),
                        actor_url: fresh.actor_url().to_owned(),
                    });
                    system.notify_parent_of_move(&fresh);
                }
                Err(e) => error!("Respawn of {} failed: {}", actor.locator(), e),
            }
        }
    }

    /// Reacts to a possible change of the leader as seen by this node.
    pub(crate) async fn leader_view_changed(&self) {
        let Ok(system) = self.system() else {
            return;
        };
        let leader = self.leader.current_leader().await.map(|h| h.id().clone());
        {
            let mut last = self.last_leader.lock().await;
            if *last == leader {
                return;
            }
            last.clone_from(&leader);
        }
        let Some(leader) = leader else {
            return;
        };
        info!("Node {} sees {} as leader.", self.me, leader);
        system.publish(ClusterEvent::LeaderChanged {
            leader: leader.to_string(),
        });

        if leader == self.me {
            tokio::spawn(async move {
                if let Err(e) = system.cluster().assume_leadership().await {
                    error!("Taking over leadership failed: {}", e);
                }
            });
        } else {
            self.orphans.lock().await.clear();
            let locals: Vec<ActorDescriptor> = system
                .local_receptionist()
                .all()
                .await
                .iter()
                .map(|actor| actor.descriptor())
                .collect();
            if locals.is_empty() {
                return;
            }
            tokio::spawn(async move {
                if let Err(e) = system.receptionist().push_to(&leader, locals).await {
                    warn!("Registration sync to leader {} failed: {}", leader, e);
                }
            });
        }
    }

    /// Registers local actors with this node's registry, respawns orphans and rebalances.
    async fn assume_leadership(&self) -> Result<(), Error> {
        let system = self.system()?;
        for actor in system.local_receptionist().all().await {
            system.receptionist().register(actor).await;
        }
        let orphans = std::mem::take(&mut *self.orphans.lock().await);
        if !orphans.is_empty() {
            info!("New leader {} respawns {} orphaned actors.", self.me, orphans.len());
            self.respawn(orphans).await;
        }
        if system.config().rebalance_on_topology_change
            && self.topology_changed.swap(false, Ordering::SeqCst)
        {
            self.rebalance().await?;
        }
        Ok(())
    }

    /// Moves every actor whose round-robin target differs from its current host. Leader only;
    /// returns the number of moved actors.
    pub async fn rebalance(&self) -> Result<usize, Error> {
        let system = self.system()?;
        if !self.is_leader().await {
            return Ok(0);
        }
        if self.rebalancing.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let switched = system.transition(SystemStatus::Ready, SystemStatus::Rebalancing);
        system.publish(ClusterEvent::RebalanceStarted);

        let hosts: Vec<HostId> = self.hosts().await.iter().map(|h| h.id().clone()).collect();
        let actors = system.receptionist().all().await;
        info!("Rebalancing {} actors over {} hosts.", actors.len(), hosts.len());
        let mut moved = 0;
        if !hosts.is_empty() {
            for (index, actor) in actors.iter().enumerate() {
                let target = &hosts[index % hosts.len()];
                if actor.host() == target {
                    continue;
                }
                match self.transfer(actor, target).await {
                    Ok(_) => moved += 1,
                    Err(e) => warn!("Moving {} to {} failed: {}", actor.locator(), target, e),
                }
            }
        }

        if switched {
            system.transition(SystemStatus::Rebalancing, SystemStatus::Ready);
        }
        system.publish(ClusterEvent::RebalanceFinished { moved });
        self.rebalancing.store(false, Ordering::SeqCst);
        Ok(moved)
    }

    /// Relocates a live actor to `target` and returns its new reference.
    ///
    /// # Errors
    ///
    /// Returns whatever stopped the delivery of the transfer request or the materialization on
    /// the target.
    ///
    pub async fn transfer(&self, actor: &ActorRef, target: &HostId) -> Result<ActorRef, Error> {
        let system = self.system()?;
        let payload = serde_json::to_value(TransferRequest {
            target: target.clone(),
        })?;
        let reply = actor
            .send(MessageKind::Transfer, payload, ActionType::Ask, true, None)
            .await?;
        let descriptor: ActorDescriptor = serde_json::from_value(reply)?;
        let moved = system.actor_ref_from(&descriptor).await?;
        system.receptionist().register(moved.clone()).await;
        Ok(moved)
    }

    /// Target-side half of a transfer, run by the node that owns `actor`.
    pub(crate) async fn materialize_transfer(
        &self,
        actor: &ActorRef,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorRef, Error> {
        let system = self.system()?;
        let descriptor = system.transport().create_local_actor(target, request).await?;
        let moved = system.actor_ref_from(&descriptor).await?;
        system.receptionist().register(moved.clone()).await;
        system.publish(ClusterEvent::ActorMoved {
            locator: moved.locator().to_string(),
            from: actor.actor_url().to_owned(),
            to: moved.actor_url().to_owned(),
        });
        system.notify_parent_of_move(&moved);
        Ok(moved)
    }

    /// Transfers every local actor to the other hosts, round-robin. Returns the number moved.
    pub async fn drain(&self) -> Result<usize, Error> {
        let system = self.system()?;
        system.set_status(SystemStatus::Draining);
        system.publish(ClusterEvent::Draining);

        let targets: Vec<HostId> = self
            .other_hosts()
            .await
            .iter()
            .map(|h| h.id().clone())
            .collect();
        let locals = system.local_receptionist().all().await;
        if targets.is_empty() {
            if !locals.is_empty() {
                warn!("No host to drain {} actors to.", locals.len());
            }
            return Ok(0);
        }
        info!("Draining {} actors from {}.", locals.len(), self.me);
        let mut moved = 0;
        for (index, actor) in locals.iter().enumerate() {
            let target = &targets[index % targets.len()];
            match self.transfer(actor, target).await {
                Ok(_) => moved += 1,
                Err(e) => warn!("Draining {} to {} failed: {}", actor.locator(), target, e),
            }
        }
        Ok(moved)
    }
}

fn creation_error(error: Error) -> Error {
    match error {
        Error::ActorCreation(message) => Error::ActorCreation(message),
        other => Error::ActorCreation(other.to_string()),
    }
}
