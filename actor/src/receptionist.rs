// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Registries
//!
//! Every node keeps two registries. The `Receptionist` is the node's copy of the cluster-wide
//! directory (locator to reference, for actors on any host), kept eventually consistent by
//! pushing each registration to all other hosts. The `LocalReceptionist` only holds the actors
//! this node runs.
//!

use crate::{
    actor::{ActorDescriptor, ActorRef},
    system::WeakSystem,
    Error, HostId, Locator,
};

use futures::{future::join_all, stream, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use std::collections::HashMap;

/// Cluster-wide actor directory, as known by this node.
pub struct Receptionist {
    system: WeakSystem,
    lut: RwLock<HashMap<Locator, ActorRef>>,
}

impl Receptionist {
    pub(crate) fn new(system: WeakSystem) -> Self {
        Self {
            system,
            lut: RwLock::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, locator: &Locator) -> Option<ActorRef> {
        self.lut.read().await.get(locator).cloned()
    }

    /// All registered actors with the given name, sorted by locator.
    pub async fn lookup_by_name(&self, name: &str) -> Vec<ActorRef> {
        let lut = self.lut.read().await;
        let mut found: Vec<ActorRef> = lut
            .values()
            .filter(|actor| actor.name() == name)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.locator().cmp(b.locator()));
        found
    }

    /// Records a registration. A remote registration with the url already on record is
    /// ignored, so the cached children of the existing entry survive repeated syncs.
    pub async fn register(&self, actor_ref: ActorRef) {
        let mut lut = self.lut.write().await;
        if let Some(existing) = lut.get(actor_ref.locator()) {
            if existing.actor_url() == actor_ref.actor_url()
                && actor_ref.local_cell().is_none()
            {
                return;
            }
        }
        debug!(
            "Registering {} at {}",
            actor_ref.locator(),
            actor_ref.actor_url()
        );
        lut.insert(actor_ref.locator().clone(), actor_ref);
    }

    /// Registers the actor and pushes the registration to every other host.
    pub async fn sync_registration(&self, actor_ref: &ActorRef) -> Result<(), Error> {
        self.register(actor_ref.clone()).await;
        self.push(vec![actor_ref.descriptor()]).await
    }

    /// Pushes registrations to every other host. Unreachable hosts are skipped; the ping loop
    /// deals with them.
    pub(crate) async fn push(&self, descriptors: Vec<ActorDescriptor>) -> Result<(), Error> {
        let system = self.system.upgrade()?;
        let others = system.cluster().other_hosts().await;
        let transport = system.transport();
        let calls = others.iter().map(|host| {
            let registrations = stream::iter(descriptors.clone()).boxed();
            let transport = transport.clone();
            async move {
                (host, transport.sync_registrations(host.id(), registrations).await)
            }
        });
        for (host, result) in join_all(calls).await {
            if let Err(e) = result {
                warn!("Registration sync to {} failed: {}", host.id(), e);
            }
        }
        Ok(())
    }

    /// Pushes registrations to a single host.
    pub(crate) async fn push_to(
        &self,
        target: &HostId,
        descriptors: Vec<ActorDescriptor>,
    ) -> Result<(), Error> {
        let system = self.system.upgrade()?;
        system
            .transport()
            .sync_registrations(target, stream::iter(descriptors).boxed())
            .await
    }

    pub async fn remove(&self, locator: &Locator) -> Option<ActorRef> {
        self.lut.write().await.remove(locator)
    }

    /// Drops every registration owned by `host` and returns them, sorted by locator.
    pub async fn remove_host(&self, host: &HostId) -> Vec<ActorRef> {
        let mut lut = self.lut.write().await;
        let locators: Vec<Locator> = lut
            .iter()
            .filter(|(_, actor)| actor.host() == host)
            .map(|(locator, _)| locator.clone())
            .collect();
        let mut removed: Vec<ActorRef> = locators
            .iter()
            .filter_map(|locator| lut.remove(locator))
            .collect();
        removed.sort_by(|a, b| a.locator().cmp(b.locator()));
        removed
    }

    /// Every registration, sorted by locator.
    pub async fn all(&self) -> Vec<ActorRef> {
        let lut = self.lut.read().await;
        let mut all: Vec<ActorRef> = lut.values().cloned().collect();
        all.sort_by(|a, b| a.locator().cmp(b.locator()));
        all
    }

    pub async fn len(&self) -> usize {
        self.lut.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lut.read().await.is_empty()
    }
}

/// Actors running on this node.
#[derive(Default)]
pub struct LocalReceptionist {
    actors: RwLock<HashMap<Locator, ActorRef>>,
}

impl LocalReceptionist {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, locator: &Locator) -> Option<ActorRef> {
        self.actors.read().await.get(locator).cloned()
    }

    /// Returns the actor at `locator`, creating it with `create` if absent. The second value
    /// tells whether `create` ran.
    pub(crate) async fn get_or_insert_with<F>(
        &self,
        locator: &Locator,
        create: F,
    ) -> Result<(ActorRef, bool), Error>
    where
        F: FnOnce() -> Result<ActorRef, Error>,
    {
        let mut actors = self.actors.write().await;
        if let Some(existing) = actors.get(locator) {
            return Ok((existing.clone(), false));
        }
        let actor_ref = create()?;
        actors.insert(locator.clone(), actor_ref.clone());
        Ok((actor_ref, true))
    }

    pub(crate) async fn add(&self, actor_ref: ActorRef) {
        self.actors
            .write()
            .await
            .insert(actor_ref.locator().clone(), actor_ref);
    }

    pub(crate) async fn remove(&self, locator: &Locator) -> Option<ActorRef> {
        self.actors.write().await.remove(locator)
    }

    /// Every local actor, sorted by locator.
    pub async fn all(&self) -> Vec<ActorRef> {
        let actors = self.actors.read().await;
        let mut all: Vec<ActorRef> = actors.values().cloned().collect();
        all.sort_by(|a, b| a.locator().cmp(b.locator()));
        all
    }

    pub async fn len(&self) -> usize {
        self.actors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actors.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn remote(name: &str, locator: &str, host: &HostId) -> ActorRef {
        let locator = Locator::parse(locator).unwrap();
        let descriptor = ActorDescriptor {
            name: name.to_owned(),
            locator: locator.to_string(),
            actor_url: host.actor_url(&locator),
            behavior_definition: "test".to_owned(),
        };
        ActorRef::remote(WeakSystem::detached(), &descriptor).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let receptionist = Receptionist::new(WeakSystem::detached());
        let h1 = HostId::new("node-1", 6161);
        let actor = remote("alice", "-/bank/alice", &h1);
        receptionist.register(actor.clone()).await;

        let found = receptionist
            .lookup(&Locator::parse("-/bank/alice").unwrap())
            .await
            .unwrap();
        assert_eq!(found, actor);
        assert_eq!(receptionist.lookup_by_name("alice").await, vec![actor]);
        assert!(
            receptionist
                .lookup(&Locator::parse("-/bank").unwrap())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_register_replaces_moved_actor() {
        let receptionist = Receptionist::new(WeakSystem::detached());
        let h1 = HostId::new("node-1", 6161);
        let h2 = HostId::new("node-2", 6161);
        receptionist.register(remote("a", "-/a", &h1)).await;
        receptionist.register(remote("a", "-/a", &h2)).await;

        let found = receptionist.lookup(&Locator::parse("-/a").unwrap()).await.unwrap();
        assert_eq!(found.host(), &h2);
        assert_eq!(receptionist.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_host() {
        let receptionist = Receptionist::new(WeakSystem::detached());
        let h1 = HostId::new("node-1", 6161);
        let h2 = HostId::new("node-2", 6161);
        receptionist.register(remote("b", "-/b", &h1)).await;
        receptionist.register(remote("a", "-/a", &h1)).await;
        receptionist.register(remote("c", "-/c", &h2)).await;

        let removed = receptionist.remove_host(&h1).await;
        let locators: Vec<String> =
            removed.iter().map(|a| a.locator().to_string()).collect();
        assert_eq!(locators, vec!["-/a", "-/b"]);
        assert_eq!(receptionist.len().await, 1);
    }

    #[tokio::test]
    async fn test_local_get_or_insert_runs_once() {
        let local = LocalReceptionist::new();
        let h1 = HostId::new("node-1", 6161);
        let locator = Locator::parse("-/a").unwrap();

        let (first, created) = local
            .get_or_insert_with(&locator, || Ok(remote("a", "-/a", &h1)))
            .await
            .unwrap();
        assert!(created);
        let (second, created) = local
            .get_or_insert_with(&locator, || {
                Err(Error::ActorCreation("must not run".to_owned()))
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }
}
