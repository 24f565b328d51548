// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Node-to-node transport
//!
//! Nodes talk to each other through eight request/response operations. `Transport` is the
//! client side (every call names the target host), `NodeService` is the server side
//! implemented by the actor system. Messages and state travel as JSON strings inside the
//! request types so that any transport can carry them with a compact binary codec.
//!
//! Two transports are provided: `LocalNetwork` connects systems running in the same process,
//! `TcpTransport` speaks length-prefixed bincode frames over TCP.
//!

mod local;
mod tcp;

pub use local::LocalNetwork;
pub use tcp::{TcpServer, TcpTransport, MAX_FRAME_SIZE};

use crate::{
    actor::ActorDescriptor, message::ActionType, Error, HostId, Locator,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an actor instance is being started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnReason {
    Created,
    Transferred,
    Respawned,
}

impl SpawnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnReason::Created => "created",
            SpawnReason::Transferred => "transferred",
            SpawnReason::Respawned => "respawned",
        }
    }
}

/// Request to create an actor, either through the leader or directly on a host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateActorRequest {
    pub name: String,
    pub locator: String,
    pub behavior_definition: String,
    pub error_handler: Option<String>,
    /// JSON state carried by a transfer.
    pub state: Option<String>,
    /// Children links carried by a transfer.
    pub children: Vec<ActorDescriptor>,
    pub reason: SpawnReason,
}

impl CreateActorRequest {
    pub fn new(
        name: &str,
        locator: &Locator,
        behavior_definition: &str,
        error_handler: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            locator: locator.to_string(),
            behavior_definition: behavior_definition.to_owned(),
            error_handler: error_handler.map(str::to_owned),
            state: None,
            children: Vec::new(),
            reason: SpawnReason::Created,
        }
    }
}

/// Request to enqueue a message into a remote actor's mailbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub locator: String,
    pub message_type: String,
    /// JSON payload.
    pub message: String,
    pub action: ActionType,
    pub prioritize: bool,
    pub timeout_ms: Option<u64>,
}

/// Answer to an enqueue. `result` carries the JSON reply of an ask, `err` a handler failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub result: Option<String>,
    pub err: Option<Error>,
}

impl EnqueueResponse {
    pub fn ok(value: &Value) -> Result<Self, Error> {
        Ok(Self {
            result: Some(serde_json::to_string(value)?),
            err: None,
        })
    }

    pub fn failed(error: Error) -> Self {
        Self {
            result: None,
            err: Some(error),
        }
    }

    /// Converts the response back into the handler's outcome.
    pub fn into_result(self) -> Result<Value, Error> {
        if let Some(error) = self.err {
            return Err(error.from_handler());
        }
        match self.result {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Value::Null),
        }
    }
}

/// Election message: the sender's identity and priority, or the receiver's view of the leader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMessage {
    pub host: String,
    pub port: u16,
    pub priority: Option<u64>,
}

impl ElectionMessage {
    pub fn host_id(&self) -> HostId {
        HostId::new(&self.host, self.port)
    }
}

/// One cache update. `None` clears the key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Option<String>,
}

/// Server side of the node protocol.
#[async_trait]
pub trait NodeService: Send + Sync + 'static {
    /// Leader-arbitrated actor creation.
    async fn create_actor_as_leader(
        &self,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error>;

    /// Creates the actor on the receiving node.
    async fn create_local_actor(
        &self,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error>;

    async fn get_actor(
        &self,
        locator: String,
    ) -> Result<Option<ActorDescriptor>, Error>;

    async fn enqueue(
        &self,
        request: EnqueueRequest,
    ) -> Result<EnqueueResponse, Error>;

    /// Bulk registration of actors owned by the sender.
    async fn sync_registrations(
        &self,
        registrations: BoxStream<'static, ActorDescriptor>,
    ) -> Result<(), Error>;

    async fn ping(&self, message: String) -> Result<String, Error>;

    /// Receives the sender's identity and answers with the receiver's current leader.
    async fn election(
        &self,
        message: ElectionMessage,
    ) -> Result<ElectionMessage, Error>;

    async fn sync_cache(
        &self,
        entries: BoxStream<'static, CacheEntry>,
    ) -> Result<(), Error>;
}

/// Client side of the node protocol.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn create_actor_as_leader(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error>;

    async fn create_local_actor(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error>;

    async fn get_actor(
        &self,
        target: &HostId,
        locator: String,
    ) -> Result<Option<ActorDescriptor>, Error>;

    async fn enqueue(
        &self,
        target: &HostId,
        request: EnqueueRequest,
    ) -> Result<EnqueueResponse, Error>;

    async fn sync_registrations(
        &self,
        target: &HostId,
        registrations: BoxStream<'static, ActorDescriptor>,
    ) -> Result<(), Error>;

    async fn ping(&self, target: &HostId, message: String) -> Result<String, Error>;

    async fn election(
        &self,
        target: &HostId,
        message: ElectionMessage,
    ) -> Result<ElectionMessage, Error>;

    async fn sync_cache(
        &self,
        target: &HostId,
        entries: BoxStream<'static, CacheEntry>,
    ) -> Result<(), Error>;
}
