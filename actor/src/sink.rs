// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Cluster events and the sink/subscriber pattern that consumes them.
//!
//! The actor system publishes a `ClusterEvent` on a broadcast channel whenever the membership,
//! the leader or the placement of an actor changes. A `Sink` runs in its own task and hands
//! every event to a `Subscriber`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};

use tracing::debug;

/// Something that happened in the cluster, as observed by one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    HostJoined { host: String },
    HostDown { host: String },
    LeaderChanged { leader: String },
    ActorCreated { locator: String, actor_url: String },
    ActorMoved { locator: String, from: String, to: String },
    ActorRespawned { locator: String, actor_url: String },
    RebalanceStarted,
    RebalanceFinished { moved: usize },
    Draining,
}

/// Receives cluster events and notifies a subscriber.
pub struct Sink {
    subscriber: Box<dyn Subscriber>,
    event_receiver: EventReceiver<ClusterEvent>,
}

impl Sink {
    /// Creates a sink over a receiver obtained from `SystemRef::subscribe`.
    pub fn new(
        event_receiver: EventReceiver<ClusterEvent>,
        subscriber: impl Subscriber,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Processes events until the channel closes. Lagged events are skipped.
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!(
                        "Received event: {:?}. Notify to the subscriber.",
                        event
                    );
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Sink lagged, {} events skipped.", skipped);
                    continue;
                }
            }
        }
    }
}

/// Consumer of cluster events.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn notify(&self, event: ClusterEvent);
}
