// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actors
//!
//! `ActorRef` is the location-transparent handle of an actor. The same type represents an actor
//! owned by this node (it then carries the actor's live mailbox) and an actor owned by another
//! node (messages then travel over the transport). Remote delivery failures are retried against
//! the same destination with a growing backoff, unless a fresher reference shows the actor has
//! moved, in which case the call is forwarded and the parent's cached child link is refreshed.
//!
//! `ActorContext` is what a behavior handler sees: the actor's own reference, its JSON state and
//! the actor system.
//!

use crate::{
    Error, HostId, Locator,
    mailbox::Mailbox,
    message::{ActionType, Message, MessageKind, DEFAULT_MESSAGE_TYPE},
    retries::RetryTracker,
    system::{SystemRef, WeakSystem},
    transport::{CreateActorRequest, EnqueueRequest},
    ActorSystemCache,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

/// Serialized form of an actor reference, as exchanged between nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDescriptor {
    pub name: String,
    pub locator: String,
    pub actor_url: String,
    pub behavior_definition: String,
}

/// Processing status of a local actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorStatus {
    Idle,
    Processing,
}

/// Progress of a live relocation of a local actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransferState {
    None,
    InFlight,
    Done,
}

/// Runtime cell shared by every reference to an actor owned by this node.
pub(crate) struct LocalCell {
    pub(crate) mailbox: Mailbox,
    status: Mutex<ActorStatus>,
    transfer: Mutex<TransferState>,
}

impl LocalCell {
    pub(crate) fn new() -> Self {
        Self {
            mailbox: Mailbox::new(),
            status: Mutex::new(ActorStatus::Idle),
            transfer: Mutex::new(TransferState::None),
        }
    }

    pub(crate) fn status(&self) -> ActorStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: ActorStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub(crate) fn transfer_state(&self) -> TransferState {
        *self.transfer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_transfer_state(&self, state: TransferState) {
        *self.transfer.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.mailbox.wake();
    }
}

struct RefInner {
    name: String,
    locator: Locator,
    actor_url: String,
    behavior_definition: String,
    host: HostId,
    error_handler: Option<String>,
    children: RwLock<HashMap<String, ActorRef>>,
    retries: RetryTracker,
    local: Option<Arc<LocalCell>>,
    system: WeakSystem,
}

/// A reference to an actor that enables message sending, wherever the actor lives.
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<RefInner>,
}

impl ActorRef {
    pub(crate) fn new(
        system: WeakSystem,
        name: &str,
        locator: Locator,
        actor_url: String,
        behavior_definition: &str,
        host: HostId,
        error_handler: Option<String>,
        local: Option<Arc<LocalCell>>,
    ) -> Self {
        Self {
            inner: Arc::new(RefInner {
                name: name.to_owned(),
                locator,
                actor_url,
                behavior_definition: behavior_definition.to_owned(),
                host,
                error_handler,
                children: RwLock::new(HashMap::new()),
                retries: RetryTracker::default(),
                local,
                system,
            }),
        }
    }

    /// Builds a reference to an actor owned by another node.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` if the descriptor's locator or url is malformed.
    ///
    pub(crate) fn remote(
        system: WeakSystem,
        descriptor: &ActorDescriptor,
    ) -> Result<Self, Error> {
        let locator = Locator::parse(&descriptor.locator)?;
        let host = HostId::from_actor_url(&descriptor.actor_url)?;
        Ok(Self::new(
            system,
            &descriptor.name,
            locator,
            descriptor.actor_url.clone(),
            &descriptor.behavior_definition,
            host,
            None,
            None,
        ))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn locator(&self) -> &Locator {
        &self.inner.locator
    }

    pub fn actor_url(&self) -> &str {
        &self.inner.actor_url
    }

    pub fn behavior_definition(&self) -> &str {
        &self.inner.behavior_definition
    }

    /// The host owning the actor.
    pub fn host(&self) -> &HostId {
        &self.inner.host
    }

    pub fn error_handler(&self) -> Option<&str> {
        self.inner.error_handler.as_deref()
    }

    pub fn descriptor(&self) -> ActorDescriptor {
        ActorDescriptor {
            name: self.inner.name.clone(),
            locator: self.inner.locator.to_string(),
            actor_url: self.inner.actor_url.clone(),
            behavior_definition: self.inner.behavior_definition.clone(),
        }
    }

    /// True if the actor lives on this node and still accepts messages.
    pub fn is_local(&self) -> bool {
        self.inner
            .local
            .as_ref()
            .map(|cell| !cell.mailbox.is_closed())
            .unwrap_or(false)
    }

    /// Processing status, `None` for references to remote actors.
    pub fn status(&self) -> Option<ActorStatus> {
        self.inner.local.as_ref().map(|cell| cell.status())
    }

    /// Number of queued messages, `None` for references to remote actors.
    pub fn mailbox_len(&self) -> Option<usize> {
        self.inner.local.as_ref().map(|cell| cell.mailbox.len())
    }

    pub(crate) fn local_cell(&self) -> Option<&Arc<LocalCell>> {
        self.inner.local.as_ref()
    }

    pub(crate) fn system(&self) -> Result<SystemRef, Error> {
        self.inner.system.upgrade()
    }

    /// Cached reference of the child named `name`.
    pub fn child(&self, name: &str) -> Option<ActorRef> {
        self.inner
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn children(&self) -> Vec<ActorRef> {
        let children = self
            .inner
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut children: Vec<ActorRef> = children.values().cloned().collect();
        children.sort_by(|a, b| a.locator().cmp(b.locator()));
        children
    }

    pub(crate) fn set_child(&self, name: &str, child: ActorRef) {
        self.inner
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), child);
    }

    pub(crate) fn remove_child(&self, name: &str) -> Option<ActorRef> {
        self.inner
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Reference of the parent actor, `None` for the root.
    pub async fn parent(&self) -> Option<ActorRef> {
        let parent = self.inner.locator.parent()?;
        let system = self.system().ok()?;
        system.lookup(&parent).await.ok()
    }

    /// Spawns a child actor with the given name and behavior through the cluster creation
    /// protocol. The child may be placed on any node.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` for a bad name, `Error::ActorCreation` if a local child
    /// with that name already exists or the cluster could not place the actor.
    ///
    pub async fn spawn_child(
        &self,
        name: &str,
        behavior_definition: &str,
    ) -> Result<ActorRef, Error> {
        self.spawn_child_with(name, behavior_definition, None).await
    }

    /// Like `spawn_child`, naming a registered error handler for the child.
    pub async fn spawn_child_with(
        &self,
        name: &str,
        behavior_definition: &str,
        error_handler: Option<&str>,
    ) -> Result<ActorRef, Error> {
        let locator = self.inner.locator.child(name)?;
        if let Some(existing) = self.child(name) {
            if existing.is_local() {
                return Err(Error::ActorCreation(format!(
                    "A child actor with the name {} already exists.",
                    name
                )));
            }
            return Ok(existing);
        }
        let system = self.system()?;
        let request = CreateActorRequest::new(
            name,
            &locator,
            behavior_definition,
            error_handler,
        );
        let child = system.cluster().create_actor(request).await?;
        self.set_child(name, child.clone());
        debug!("Child actor {} created.", child.locator());
        Ok(child)
    }

    /// Sends a fire-and-forget message. `None` selects the default message type.
    ///
    /// # Errors
    ///
    /// Returns `Error::Queueing` once the retry budget against a remote destination is
    /// exhausted.
    ///
    pub async fn tell<T: Serialize>(
        &self,
        message_type: Option<&str>,
        message: &T,
    ) -> Result<(), Error> {
        let kind = user_kind(message_type)?;
        let payload = serde_json::to_value(message)?;
        self.send(kind, payload, ActionType::Tell, false, None)
            .await
            .map(|_| ())
    }

    /// Sends a request and waits for the handler's reply.
    ///
    /// `timeout` falls back to the configured default ask timeout.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, `Error::Timeout` if a local ask misses its deadline, or
    /// `Error::Queueing` once remote delivery gives up.
    ///
    pub async fn ask<T: Serialize>(
        &self,
        message_type: Option<&str>,
        message: &T,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        self.ask_with(message_type, message, timeout, false).await
    }

    /// Like `ask`, optionally inserting the request at the head of the mailbox.
    pub async fn ask_with<T: Serialize>(
        &self,
        message_type: Option<&str>,
        message: &T,
        timeout: Option<Duration>,
        prioritize: bool,
    ) -> Result<Value, Error> {
        let kind = user_kind(message_type)?;
        let payload = serde_json::to_value(message)?;
        self.send(kind, payload, ActionType::Ask, prioritize, timeout)
            .await
    }

    /// Delivers a message wherever the actor currently is.
    pub(crate) async fn send(
        &self,
        kind: MessageKind,
        payload: Value,
        action: ActionType,
        prioritize: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let system = self.system()?;
        let timeout = timeout.or_else(|| system.config().default_ask_timeout());
        let max_hops = system.config().max_delivery_attempts as usize
            * system.cluster().hosts().await.len().max(1);
        let mut target = self.clone();
        let mut hops = 0;

        loop {
            let result = match target.local_cell() {
                Some(cell) => {
                    target
                        .send_local(cell, kind.clone(), payload.clone(), action, prioritize, timeout)
                        .await
                }
                None => {
                    target
                        .send_remote(&system, &kind, &payload, action, prioritize, timeout)
                        .await
                }
            };

            match result {
                Ok(value) => return Ok(value),
                Err(Delivery::Failed(error)) => return Err(error),
                Err(Delivery::Moved(fresh)) => {
                    hops += 1;
                    if hops > max_hops {
                        return Err(Error::Queueing(
                            self.inner.locator.to_string(),
                            "too many forwards".to_owned(),
                        ));
                    }
                    info!(
                        "Actor {} moved from {} to {}. Forwarding.",
                        fresh.locator(),
                        target.actor_url(),
                        fresh.actor_url()
                    );
                    system.notify_parent_of_move(&fresh);
                    target = fresh;
                }
            }
        }
    }

    /// Enqueues into the live mailbox of a local actor. No network hop, no retry.
    pub(crate) async fn send_local(
        &self,
        cell: &LocalCell,
        kind: MessageKind,
        payload: Value,
        action: ActionType,
        prioritize: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, Delivery> {
        match self.enqueue_local(cell, kind, payload, action, prioritize, timeout).await {
            Err(Error::ActorNotFound(locator)) => {
                // The mailbox closed under us: the actor was transferred away.
                let system = self.system().map_err(Delivery::Failed)?;
                match system.resolve_fresh(&self.inner.locator, &self.inner.actor_url).await {
                    Some(fresh) => Err(Delivery::Moved(fresh)),
                    None => Err(Delivery::Failed(Error::Queueing(
                        locator,
                        "actor is no longer hosted here".to_owned(),
                    ))),
                }
            }
            other => other.map_err(Delivery::Failed),
        }
    }

    /// Enqueues into the local mailbox and, for an ask, waits for the reply.
    pub(crate) async fn enqueue_local(
        &self,
        cell: &LocalCell,
        kind: MessageKind,
        payload: Value,
        action: ActionType,
        prioritize: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let locator = self.inner.locator.to_string();
        match action {
            ActionType::Tell => {
                cell.mailbox
                    .enqueue(Message::new(kind, payload), prioritize)
                    .map_err(|_| Error::ActorNotFound(locator))?;
                Ok(Value::Null)
            }
            ActionType::Ask => {
                let (sender, receiver) = oneshot::channel();
                cell.mailbox
                    .enqueue(Message::with_reply(kind, payload, sender), prioritize)
                    .map_err(|_| Error::ActorNotFound(locator.clone()))?;
                let response = match timeout {
                    Some(duration) => tokio::time::timeout(duration, receiver)
                        .await
                        .map_err(|_| Error::Timeout(locator.clone()))?,
                    None => receiver.await,
                };
                response.map_err(|_| {
                    Error::Queueing(
                        locator,
                        "actor stopped before replying".to_owned(),
                    )
                })?
            }
        }
    }

    /// One remote delivery with the retry budget of this destination.
    async fn send_remote(
        &self,
        system: &SystemRef,
        kind: &MessageKind,
        payload: &Value,
        action: ActionType,
        prioritize: bool,
        timeout: Option<Duration>,
    ) -> Result<Value, Delivery> {
        let message = serde_json::to_string(payload)
            .map_err(|e| Delivery::Failed(e.into()))?;
        let locator = self.inner.locator.to_string();
        let key = RetryTracker::key(&locator, kind.as_str(), &message, action.as_str());
        let request = EnqueueRequest {
            locator: locator.clone(),
            message_type: kind.as_str().to_owned(),
            message,
            action,
            prioritize,
            timeout_ms: timeout.map(millis),
        };
        let mut strategy = system.config().delivery_strategy();

        loop {
            let transport = system.transport();
            let call = transport.enqueue(&self.inner.host, request.clone());
            let result = match (action, timeout) {
                (ActionType::Ask, Some(duration)) => {
                    match tokio::time::timeout(duration, call).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(locator.clone())),
                    }
                }
                _ => call.await,
            };

            let error = match result.and_then(|response| response.into_result()) {
                Ok(value) => {
                    self.inner.retries.clear(&key);
                    return Ok(value);
                }
                Err(error) if !error.is_delivery_failure() => {
                    self.inner.retries.clear(&key);
                    return Err(Delivery::Failed(error));
                }
                Err(error) => error,
            };

            let attempt = self.inner.retries.record_failure(&key);
            warn!(
                "Queueing {} to {} failed (attempt {}): {}",
                kind.as_str(),
                self.inner.actor_url,
                attempt,
                error
            );
            if attempt as usize >= strategy.max_retries() {
                self.inner.retries.clear(&key);
                error!(
                    "Giving up queueing {} to {} after {} attempts.",
                    kind.as_str(),
                    locator,
                    attempt
                );
                return Err(Delivery::Failed(Error::Queueing(
                    locator,
                    error.to_string(),
                )));
            }

            if let Some(fresh) = system
                .resolve_fresh(&self.inner.locator, &self.inner.actor_url)
                .await
            {
                self.inner.retries.clear(&key);
                return Err(Delivery::Moved(fresh));
            }

            if let Some(duration) = strategy.next_backoff() {
                debug!("Backoff for {:?}", &duration);
                tokio::time::sleep(duration).await;
            }
        }
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Message kind named by a sender. Reserved system types can not be sent this way.
fn user_kind(message_type: Option<&str>) -> Result<MessageKind, Error> {
    let kind = MessageKind::parse(message_type.unwrap_or(DEFAULT_MESSAGE_TYPE));
    if kind.is_system() {
        return Err(Error::MessageProcessing(format!(
            "{} is a reserved message type",
            kind.as_str()
        )));
    }
    Ok(kind)
}

/// Outcome of a failed delivery step.
pub(crate) enum Delivery {
    /// Final failure, surfaced to the caller.
    Failed(Error),
    /// The actor lives elsewhere now.
    Moved(ActorRef),
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.locator == other.inner.locator
            && self.inner.actor_url == other.inner.actor_url
    }
}

impl Debug for ActorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ActorRef")
            .field("name", &self.inner.name)
            .field("locator", &self.inner.locator)
            .field("actor_url", &self.inner.actor_url)
            .field("behavior_definition", &self.inner.behavior_definition)
            .field("local", &self.is_local())
            .finish()
    }
}

/// Execution context handed to behavior handlers.
pub struct ActorContext {
    me: ActorRef,
    system: SystemRef,
    state: Value,
}

impl ActorContext {
    pub(crate) fn new(me: ActorRef, system: SystemRef, state: Value) -> Self {
        Self { me, system, state }
    }

    /// Reference to the actor being run.
    pub fn me(&self) -> &ActorRef {
        &self.me
    }

    pub fn name(&self) -> &str {
        self.me.name()
    }

    pub fn locator(&self) -> &Locator {
        self.me.locator()
    }

    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    pub fn cache(&self) -> &ActorSystemCache {
        self.system.cache()
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Value {
        &mut self.state
    }

    pub fn set_state(&mut self, state: Value) {
        self.state = state;
    }

    pub(crate) fn take_state(&mut self) -> Value {
        std::mem::take(&mut self.state)
    }

    pub async fn spawn_child(
        &self,
        name: &str,
        behavior_definition: &str,
    ) -> Result<ActorRef, Error> {
        self.me.spawn_child(name, behavior_definition).await
    }

    pub fn child(&self, name: &str) -> Option<ActorRef> {
        self.me.child(name)
    }

    pub async fn parent(&self) -> Option<ActorRef> {
        self.me.parent().await
    }

    /// Resolves any actor of the cluster by locator.
    pub async fn lookup(&self, locator: &Locator) -> Result<ActorRef, Error> {
        self.system.lookup(locator).await
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_user_kind_rejects_reserved_types() {
        assert_eq!(
            user_kind(None).unwrap(),
            MessageKind::User(DEFAULT_MESSAGE_TYPE.to_owned())
        );
        assert_eq!(
            user_kind(Some("deposit")).unwrap(),
            MessageKind::User("deposit".to_owned())
        );
        assert!(matches!(
            user_kind(Some("ferry:transfer")),
            Err(Error::MessageProcessing(_))
        ));
        assert!(matches!(
            user_kind(Some("ferry:child-removed")),
            Err(Error::MessageProcessing(_))
        ));
    }
}
