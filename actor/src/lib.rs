// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Ferry distributed actor runtime
//!
//! A node joins a cluster of peers, hosts part of a tree of location-addressable actors and
//! routes messages to any actor of the tree, wherever it currently runs.
//!
//! ## Overview
//!
//! Four mechanisms carry the runtime:
//!
//! - **Membership and leadership**: every node knows the host list; the host with the lowest
//!   priority (its start time by default) leads. Nodes ping each other and re-elect when the
//!   leader stops answering.
//! - **Actor creation**: creation is arbitrated by the leader, which places actors round-robin
//!   over the hosts. Creation is idempotent and concurrent requests for the same locator share
//!   one flow, so an actor is materialized on exactly one node.
//! - **Delivery**: `tell` and `ask` work the same on local and remote references. Failed remote
//!   deliveries are retried with backoff; when a fresher reference shows the actor has moved,
//!   the message is forwarded and the parent's child link is refreshed.
//! - **Relocation**: a live actor can be transferred with its state to another host. The leader
//!   rebalances after topology changes, respawns the actors of dead hosts, and a stopping node
//!   drains its actors to its peers.
//!
//! ## Addressing
//!
//! Actors are addressed by a [`Locator`], a `/`-delimited path under the root sentinel `-/`.
//! A child's locator is its parent's plus its name, so `-/bank/alice` is a child of `-/bank`.
//! The owning node is encoded in the actor url, e.g.
//! `http://node-1:6161/actorSystem/actor/-%2Fbank%2Falice`.
//!
//! ## Behaviors
//!
//! Actor kinds are registered up front in a [`BehaviorRegistry`] under an identifier. A
//! [`Behavior`] maps message types to [`Handler`]s, with an optional default handler and an
//! optional startup handler. Handlers get an [`ActorContext`] with the actor's JSON state.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{
//!     ActorContext, ActorSystem, Behavior, BehaviorRegistry, Error, Handler, LocalNetwork,
//!     SystemConfig,
//! };
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! struct Deposit;
//!
//! #[async_trait]
//! impl Handler for Deposit {
//!     async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
//!         let balance = ctx.state()["balance"].as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(0);
//!         ctx.set_state(json!({ "balance": balance }));
//!         Ok(json!(balance))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let behaviors = BehaviorRegistry::new()
//!         .register("account", Behavior::builder().on("deposit", Deposit).build());
//!     let network = LocalNetwork::new();
//!     let config = SystemConfig::new("node-1", 6161);
//!     let me = config.me();
//!     let (system, mut runner) = ActorSystem::create(
//!         config,
//!         behaviors,
//!         network.transport_for(&me),
//!         CancellationToken::new(),
//!     )?;
//!     network.register(&me, Arc::new(system.clone()));
//!     tokio::spawn(async move { runner.run().await });
//!
//!     let account = system.create_actor("alice", "account").await?;
//!     let balance = account.ask(Some("deposit"), &10, None).await?;
//!     assert_eq!(balance, json!(10));
//!     Ok(())
//! }
//! ```
//!

mod actor;
mod behavior;
mod cache;
mod cluster;
mod config;
mod error;
mod host;
mod leader;
mod locator;
mod mailbox;
mod message;
mod receptionist;
mod retries;
mod runner;
mod sink;
mod system;
mod transport;

//
// Actors
//

/// Location-transparent reference to an actor.
///
/// Supports `tell`, `ask` and child creation whether the actor runs on this node or another.
pub use actor::ActorRef;

/// Serialized form of an [`ActorRef`], as exchanged between nodes.
pub use actor::ActorDescriptor;

/// Execution context handed to handlers: the actor's reference, state and system.
pub use actor::ActorContext;

pub use actor::ActorStatus;

//
// Behaviors
//

/// Dispatch table of an actor kind. Built with [`Behavior::builder`].
pub use behavior::Behavior;

pub use behavior::BehaviorBuilder;

/// Maps behavior identifiers carried on the wire to local dispatch tables.
pub use behavior::BehaviorRegistry;

/// Handles one message type.
pub use behavior::Handler;

/// Invoked after a handler of an actor failed, when the actor names one.
pub use behavior::ErrorHandler;

//
// Addressing and cluster
//

/// Hierarchical address of an actor.
pub use locator::Locator;

/// The root sentinel of every locator.
pub use locator::ROOT_LOCATOR;

pub use host::{Host, HostId, HostStatus};

/// Host list, placement, liveness, transfer and rebalance.
pub use cluster::ClusterManager;

/// Priority-based leader election.
pub use leader::LeaderManager;

pub use receptionist::{LocalReceptionist, Receptionist};

/// Key/value cache replicated across nodes on demand.
pub use cache::ActorSystemCache;

//
// Messages
//

pub use message::{
    ActionType, Message, MessageKind, CHILD_MOVED_MESSAGE_TYPE,
    CHILD_REMOVED_MESSAGE_TYPE, DEFAULT_MESSAGE_TYPE, STARTUP_MESSAGE_TYPE,
    TRANSFER_MESSAGE_TYPE,
};

/// The mailbox of a local actor: FIFO with head insertion for transfer control.
pub use mailbox::Mailbox;

//
// Configuration, errors and retries
//

/// Node configuration.
pub use config::{DeliveryBackoff, HostConfig, SystemConfig};

/// Error type of the runtime.
pub use error::Error;

/// Backoff strategies for remote delivery retries.
pub use retries::{
    ExponentialBackoffStrategy, FixedIntervalStrategy, LinearIntervalStrategy,
    NoIntervalStrategy, RetryStrategy,
};

//
// Events
//

/// Membership, leadership and placement changes observed by a node.
pub use sink::ClusterEvent;

/// Runs a [`Subscriber`] over the cluster events of a node.
pub use sink::Sink;

pub use sink::Subscriber;

//
// Transport
//

/// Node-to-node protocol: client and server sides, wire types and the provided transports.
pub use transport::{
    CacheEntry, CreateActorRequest, ElectionMessage, EnqueueRequest,
    EnqueueResponse, LocalNetwork, NodeService, SpawnReason, TcpServer,
    TcpTransport, Transport, MAX_FRAME_SIZE,
};

//
// System Management
//

/// Primary entry point: builds a node from its configuration, behaviors and transport.
///
/// See [`SystemRef`] and [`SystemRunner`] for system management.
pub use system::ActorSystem;

/// Reference to the actor system providing system-level operations.
///
/// Also the server side of the node protocol ([`NodeService`]).
pub use system::SystemRef;

/// Drives a node: election, liveness pings and graceful shutdown.
///
/// Execute using `runner.run().await` in a dedicated async task.
pub use system::SystemRunner;

pub use system::{ActorTree, NodeStatus, SystemStatus};
