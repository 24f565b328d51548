// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! Every local actor is driven by one `ActorRunner` task. The runner drains the actor's mailbox
//! one message at a time, so handlers of one actor never run concurrently and observe messages
//! in mailbox order. A failing handler is logged and the loop moves on to the next message.
//!
//! The runner also executes the transfer protocol: on a transfer request it unregisters the
//! actor locally, asks the target host to materialize a copy carrying the serialized state and
//! children, and keeps draining its backlog. Once the copy exists and the backlog is empty the
//! runner closes the mailbox, releases the state and exits, leaving the `ActorRef` as an inert
//! handle that forwards to the new location.
//!

use crate::{
    actor::{ActorDescriptor, ActorRef, ActorStatus, LocalCell, TransferState},
    behavior::{Behavior, ErrorHandler},
    message::{ActionType, ChildRemoved, Message, MessageKind, Reply, TransferRequest},
    system::SystemRef,
    transport::{CreateActorRequest, SpawnReason},
    ActorContext, Error, Locator,
};

use serde_json::{json, Value};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use std::sync::Arc;

/// Mailbox loop of a local actor.
pub(crate) struct ActorRunner {
    me: ActorRef,
    cell: Arc<LocalCell>,
    behavior: Arc<Behavior>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    ctx: ActorContext,
    token: CancellationToken,
}

impl ActorRunner {
    /// Materializes a local actor and starts its runner. The startup message is the first
    /// message the actor sees.
    pub(crate) fn spawn(
        system: &SystemRef,
        request: &CreateActorRequest,
        locator: Locator,
        behavior: Arc<Behavior>,
        state: Value,
        children: Vec<(String, ActorRef)>,
    ) -> ActorRef {
        let cell = Arc::new(LocalCell::new());
        let host = system.me().clone();
        let me = ActorRef::new(
            system.downgrade(),
            &request.name,
            locator.clone(),
            host.actor_url(&locator),
            &request.behavior_definition,
            host,
            request.error_handler.clone(),
            Some(cell.clone()),
        );
        for (name, child) in children {
            me.set_child(&name, child);
        }
        let error_handler = request
            .error_handler
            .as_deref()
            .and_then(|id| system.behaviors().error_handler(id));

        let startup = json!({ "reason": request.reason.as_str() });
        // A fresh mailbox is open, the message cannot come back.
        let _ = cell
            .mailbox
            .enqueue(Message::new(MessageKind::Startup, startup), true);

        let mut runner = ActorRunner {
            me: me.clone(),
            cell,
            behavior,
            error_handler,
            ctx: ActorContext::new(me.clone(), system.clone(), state),
            token: system.token().child_token(),
        };
        tokio::spawn(async move { runner.run().await });
        me
    }

    async fn run(&mut self) {
        debug!("Running actor {}.", self.me.locator());
        loop {
            if let Some(message) = self.cell.mailbox.dequeue() {
                self.cell.set_status(ActorStatus::Processing);
                self.process(message).await;
                self.cell.set_status(ActorStatus::Idle);
                continue;
            }
            if self.cell.transfer_state() == TransferState::Done {
                self.shutdown();
                break;
            }
            if self.cell.mailbox.is_closed() {
                break;
            }
            select! {
                _ = self.token.cancelled() => {
                    self.stop();
                    break;
                }
                _ = self.cell.mailbox.wait() => {}
            }
        }
        debug!("Actor {} runner finished.", self.me.locator());
    }

    async fn process(&mut self, message: Message) {
        let (kind, payload, reply) = message.into_parts();
        match kind {
            MessageKind::Startup => {
                if let Err(e) = self.behavior.startup(&mut self.ctx, payload).await {
                    error!("Actor {} failed to start: {}", self.me.locator(), e);
                }
                respond(reply, Ok(Value::Null));
            }
            MessageKind::Transfer => self.transfer(payload, reply).await,
            MessageKind::ChildMoved => {
                let result = self.child_moved(payload).await;
                respond(reply, result.map(|_| Value::Null));
            }
            MessageKind::ChildRemoved => {
                let result = self.child_removed(payload);
                respond(reply, result.map(|_| Value::Null));
            }
            MessageKind::User(message_type) => {
                let result = self
                    .behavior
                    .dispatch(&message_type, &mut self.ctx, payload)
                    .await;
                if let Err(e) = &result {
                    error!(
                        "Actor {} failed processing {}: {}",
                        self.me.locator(),
                        message_type,
                        e
                    );
                    if let Some(handler) = &self.error_handler {
                        handler.on_error(&mut self.ctx, &message_type, e).await;
                    }
                }
                respond(reply, result.map_err(Error::from_handler));
            }
        }
    }

    async fn child_moved(&self, payload: Value) -> Result<(), Error> {
        let descriptor: ActorDescriptor = serde_json::from_value(payload)?;
        let child = self.ctx.system().actor_ref_from(&descriptor).await?;
        debug!(
            "Actor {} updates child {} to {}",
            self.me.locator(),
            descriptor.name,
            descriptor.actor_url
        );
        self.me.set_child(&descriptor.name, child);
        Ok(())
    }

    fn child_removed(&self, payload: Value) -> Result<(), Error> {
        let removed: ChildRemoved = serde_json::from_value(payload)?;
        let stale = self
            .me
            .child(&removed.name)
            .map(|child| child.host() == &removed.host)
            .unwrap_or(false);
        if stale {
            debug!("Actor {} drops child {}.", self.me.locator(), removed.name);
            self.me.remove_child(&removed.name);
        }
        Ok(())
    }

    async fn transfer(&mut self, payload: Value, reply: Option<Reply>) {
        let request: TransferRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                respond(reply, Err(e.into()));
                return;
            }
        };
        let system = self.ctx.system().clone();
        if &request.target == system.me() {
            respond(reply, descriptor_value(&self.me));
            return;
        }
        if self.cell.transfer_state() != TransferState::None {
            respond(
                reply,
                Err(Error::ActorCreation(format!(
                    "Actor {} is already being transferred.",
                    self.me.locator()
                ))),
            );
            return;
        }

        let state = match serde_json::to_string(self.ctx.state()) {
            Ok(state) => state,
            Err(e) => {
                respond(reply, Err(e.into()));
                return;
            }
        };
        let create = CreateActorRequest {
            name: self.me.name().to_owned(),
            locator: self.me.locator().to_string(),
            behavior_definition: self.me.behavior_definition().to_owned(),
            error_handler: self.me.error_handler().map(str::to_owned),
            state: Some(state),
            children: self.me.children().iter().map(|c| c.descriptor()).collect(),
            reason: SpawnReason::Transferred,
        };

        info!(
            "Transferring actor {} from {} to {}",
            self.me.locator(),
            system.me(),
            request.target
        );
        system.local_receptionist().remove(self.me.locator()).await;
        self.cell.set_transfer_state(TransferState::InFlight);

        let me = self.me.clone();
        let cell = self.cell.clone();
        tokio::spawn(async move {
            let result = system
                .cluster()
                .materialize_transfer(&me, &request.target, create)
                .await;
            match &result {
                Ok(_) => cell.set_transfer_state(TransferState::Done),
                Err(e) => {
                    error!("Transfer of {} failed: {}", me.locator(), e);
                    system.local_receptionist().add(me.clone()).await;
                    cell.set_transfer_state(TransferState::None);
                }
            }
            respond(reply, result.and_then(|moved| descriptor_value(&moved)));
        });
    }

    /// Releases the transferred instance. Messages that raced with the close are forwarded.
    fn shutdown(&mut self) {
        debug!("Actor {} transferred, shutting down.", self.me.locator());
        let leftover = self.cell.mailbox.close();
        self.ctx.take_state();
        if leftover.is_empty() {
            return;
        }
        let me = self.me.clone();
        tokio::spawn(async move {
            for message in leftover {
                let (kind, payload, reply) = message.into_parts();
                let action = if reply.is_some() {
                    ActionType::Ask
                } else {
                    ActionType::Tell
                };
                let result = me.send(kind, payload, action, false, None).await;
                if let Err(e) = &result {
                    warn!("Forwarding a message of {} failed: {}", me.locator(), e);
                }
                respond(reply, result);
            }
        });
    }

    fn stop(&mut self) {
        debug!("Stopping actor {}.", self.me.locator());
        for message in self.cell.mailbox.close() {
            let (_, _, reply) = message.into_parts();
            respond(reply, Err(Error::SystemStopped));
        }
        self.ctx.take_state();
    }
}

fn descriptor_value(actor: &ActorRef) -> Result<Value, Error> {
    Ok(serde_json::to_value(actor.descriptor())?)
}

fn respond(reply: Option<Reply>, result: Result<Value, Error>) {
    if let Some(reply) = reply {
        if reply.send(result).is_err() {
            debug!("Ask caller went away before the reply.");
        }
    }
}
