// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
///
/// The type is `Clone` so a single creation outcome can be handed to every
/// waiter coalesced on the same locator, and serializable so it can travel
/// back over the transport.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The actor could not be created locally or by the leader after
    /// exhausting placement options.
    #[error("Actor creation failed: {0}")]
    ActorCreation(String),
    /// Lookup failed against the local registry, the cluster registry and the leader.
    #[error("Actor {0} not found.")]
    ActorNotFound(String),
    /// Delivery failed after the retry budget was exhausted.
    #[error("Queueing to {0} failed: {1}")]
    Queueing(String, String),
    /// No handler matched the message type and no default handler exists.
    #[error("Message processing failed: {0}")]
    MessageProcessing(String),
    /// A locator or actor name violates the addressing rules.
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
    /// The target node is not accepting traffic.
    #[error("Node {0} is unavailable: {1}")]
    Unavailable(String, String),
    /// An ask did not complete before its deadline.
    #[error("Request to {0} timed out.")]
    Timeout(String),
    /// The transport failed to reach the target node.
    #[error("Transport error talking to {0}: {1}")]
    Transport(String, String),
    /// Payload or state could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// No leader is known yet.
    #[error("No leader has been elected.")]
    NoLeader,
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The actor system has been stopped.
    #[error("The actor system is stopped.")]
    SystemStopped,
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True if the failure should be treated as a failed delivery attempt
    /// (retry, relocation lookup) rather than an answer from the actor.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            Error::ActorNotFound(_)
                | Error::Unavailable(..)
                | Error::Timeout(_)
                | Error::Transport(..)
        )
    }

    /// Error returned by a handler, as seen by the sender. Handler failures never
    /// count as delivery failures, so they are not retried.
    pub(crate) fn from_handler(self) -> Self {
        if self.is_delivery_failure() {
            Error::MessageProcessing(self.to_string())
        } else {
            self
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}
