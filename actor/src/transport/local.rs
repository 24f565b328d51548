// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! In-process network connecting several actor systems, with failure injection.

use super::{
    CacheEntry, CreateActorRequest, ElectionMessage, EnqueueRequest,
    EnqueueResponse, NodeService, Transport,
};
use crate::{actor::ActorDescriptor, Error, HostId};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::Notify;
use tracing::debug;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

#[derive(Default)]
struct Nodes {
    services: HashMap<HostId, Arc<dyn NodeService>>,
    down: HashSet<HostId>,
    held: HashSet<HostId>,
}

/// A set of nodes reachable from each other inside one process.
///
/// Every system gets its own client with `transport_for`, so a killed node can neither
/// receive nor send.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    nodes: Arc<RwLock<Nodes>>,
    released: Arc<Notify>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client transport used by the node `me`.
    pub fn transport_for(&self, me: &HostId) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            me: me.clone(),
            network: self.clone(),
        })
    }

    /// Attaches the server side of node `id`.
    pub fn register(&self, id: &HostId, service: Arc<dyn NodeService>) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.down.remove(id);
        nodes.services.insert(id.clone(), service);
    }

    pub fn unregister(&self, id: &HostId) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.services.remove(id);
    }

    /// Makes node `id` unreachable, as if its process had died.
    pub fn kill(&self, id: &HostId) {
        debug!("Killing node {}", id);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.down.insert(id.clone());
    }

    pub fn revive(&self, id: &HostId) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.down.remove(id);
    }

    /// Makes calls to node `id` hang until `release`, as if the node had frozen.
    pub fn hold(&self, id: &HostId) {
        debug!("Holding calls to node {}", id);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.held.insert(id.clone());
    }

    pub fn release(&self, id: &HostId) {
        {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            nodes.held.remove(id);
        }
        self.released.notify_waiters();
    }

    pub fn is_down(&self, id: &HostId) -> bool {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .down
            .contains(id)
    }

    async fn route(
        &self,
        from: &HostId,
        target: &HostId,
    ) -> Result<Arc<dyn NodeService>, Error> {
        loop {
            let released = self.released.notified();
            {
                let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
                if nodes.down.contains(from) || nodes.down.contains(target) {
                    return Err(Error::Transport(
                        target.to_string(),
                        "connection refused".to_owned(),
                    ));
                }
                if !nodes.held.contains(target) {
                    return nodes.services.get(target).cloned().ok_or_else(|| {
                        Error::Transport(target.to_string(), "unknown host".to_owned())
                    });
                }
            }
            released.await;
        }
    }
}

struct LocalTransport {
    me: HostId,
    network: LocalNetwork,
}

impl LocalTransport {
    async fn service(&self, target: &HostId) -> Result<Arc<dyn NodeService>, Error> {
        self.network.route(&self.me, target).await
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn create_actor_as_leader(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        self.service(target).await?.create_actor_as_leader(request).await
    }

    async fn create_local_actor(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        self.service(target).await?.create_local_actor(request).await
    }

    async fn get_actor(
        &self,
        target: &HostId,
        locator: String,
    ) -> Result<Option<ActorDescriptor>, Error> {
        self.service(target).await?.get_actor(locator).await
    }

    async fn enqueue(
        &self,
        target: &HostId,
        request: EnqueueRequest,
    ) -> Result<EnqueueResponse, Error> {
        self.service(target).await?.enqueue(request).await
    }

    async fn sync_registrations(
        &self,
        target: &HostId,
        registrations: BoxStream<'static, ActorDescriptor>,
    ) -> Result<(), Error> {
        self.service(target).await?
            .sync_registrations(registrations)
            .await
    }

    async fn ping(&self, target: &HostId, message: String) -> Result<String, Error> {
        self.service(target).await?.ping(message).await
    }

    async fn election(
        &self,
        target: &HostId,
        message: ElectionMessage,
    ) -> Result<ElectionMessage, Error> {
        self.service(target).await?.election(message).await
    }

    async fn sync_cache(
        &self,
        target: &HostId,
        entries: BoxStream<'static, CacheEntry>,
    ) -> Result<(), Error> {
        self.service(target).await?.sync_cache(entries).await
    }
}
