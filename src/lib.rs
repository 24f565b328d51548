// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Ferry runtime.
//! Provides a distributed actor system: cluster membership with priority based leadership,
//! leader arbitrated actor placement, location transparent messaging and live actor relocation.

pub use actor::{
    ActorContext, ActorDescriptor, ActorRef, ActorSystem, ActorSystemCache,
    ActorTree, Behavior, BehaviorRegistry, ClusterEvent, Error as ActorError,
    ErrorHandler, Handler, Host, HostId, LocalNetwork, Locator, NodeService,
    NodeStatus, Sink, Subscriber, SystemConfig, SystemRef, SystemRunner,
    SystemStatus, TcpServer, TcpTransport, Transport,
};
