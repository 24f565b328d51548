// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Leader election
//!
//! Every host carries a priority, its start time by default. The leader is the host with the
//! lowest known priority; equal priorities are ordered by host identifier so every node picks
//! the same leader from the same host list. Elections are a broadcast of the local identity and
//! priority: each receiver records the sender and answers with its own view of the leader, which
//! the initiator folds back into its host list.
//!

use crate::{
    system::WeakSystem,
    transport::ElectionMessage,
    Error, Host, HostId,
};

use futures::future::join_all;
use tracing::{debug, error, info};

use std::time::Duration;

pub struct LeaderManager {
    me: HostId,
    system: WeakSystem,
}

impl LeaderManager {
    pub(crate) fn new(me: HostId, system: WeakSystem) -> Self {
        Self { me, system }
    }

    /// The host with the lowest `(priority, identifier)` among hosts with a known priority.
    pub async fn current_leader(&self) -> Option<Host> {
        let system = self.system.upgrade().ok()?;
        let hosts = system.cluster().hosts().await;
        leader_of(&hosts).cloned()
    }

    pub async fn is_leader(&self) -> bool {
        self.current_leader()
            .await
            .map(|leader| leader.id() == &self.me)
            .unwrap_or(false)
    }

    /// Broadcasts this node's identity and priority to every other known host and folds the
    /// answers into the host list. Hosts that do not answer are removed.
    pub async fn elect_leader(&self) -> Result<(), Error> {
        let system = self.system.upgrade()?;
        let cluster = system.cluster();
        let message = ElectionMessage {
            host: self.me.address.clone(),
            port: self.me.port,
            priority: cluster.me_host().await.priority(),
        };
        let others = cluster.other_hosts().await;
        debug!("Node {} starts an election with {} hosts.", self.me, others.len());

        let transport = system.transport();
        let calls = others.iter().map(|host| {
            let transport = transport.clone();
            let message = message.clone();
            async move { (host.id().clone(), transport.election(host.id(), message).await) }
        });
        for (host, result) in join_all(calls).await {
            match result {
                Ok(view) => {
                    self.add_or_update_node(&view).await;
                }
                Err(e) => {
                    error!("Node {} down during leader election: {}. Removing.", host, e);
                    cluster.host_down(&host).await;
                }
            }
        }
        cluster.leader_view_changed().await;
        Ok(())
    }

    /// Adds the host described by `message` or updates its priority. Returns true if the host
    /// was not known.
    pub async fn add_or_update_node(&self, message: &ElectionMessage) -> bool {
        let Ok(system) = self.system.upgrade() else {
            return false;
        };
        let id = message.host_id();
        if id == self.me {
            return false;
        }
        let mut host = Host::new(id);
        if let Some(priority) = message.priority {
            host.set_priority(priority);
        }
        system.cluster().add_or_update_host(host).await
    }

    /// Pings the believed leader and starts a new election if it does not answer.
    pub async fn check_and_update_leader_status(&self) -> Result<(), Error> {
        let system = self.system.upgrade()?;
        let Some(leader) = self.current_leader().await else {
            return Ok(());
        };
        if leader.id() == &self.me {
            return Ok(());
        }
        if let Err(e) = system.transport().ping(leader.id(), "ping".to_owned()).await {
            info!("Leader {} went down: {}", leader.id(), e);
            system.cluster().host_down(leader.id()).await;
            self.elect_leader().await?;
        }
        Ok(())
    }

    /// True once every known host has a priority.
    pub async fn leader_election_complete(&self) -> bool {
        let Ok(system) = self.system.upgrade() else {
            return false;
        };
        system
            .cluster()
            .hosts()
            .await
            .iter()
            .all(|host| host.priority().is_some())
    }

    /// Polls until the election is complete.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoLeader` if the election did not complete within `timeout`.
    ///
    pub async fn wait_for_election(
        &self,
        poll: Duration,
        timeout: Duration,
    ) -> Result<(), Error> {
        let wait = async {
            while !self.leader_election_complete().await {
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::NoLeader)
    }
}

/// Leader of a host list.
pub(crate) fn leader_of(hosts: &[Host]) -> Option<&Host> {
    hosts
        .iter()
        .filter_map(|host| host.rank().map(|rank| (rank, host)))
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, host)| host)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_lowest_priority_wins() {
        let hosts = vec![
            Host::with_priority(HostId::new("node-2", 6161), 200),
            Host::with_priority(HostId::new("node-1", 6161), 100),
            Host::with_priority(HostId::new("node-3", 6161), 300),
        ];
        assert_eq!(
            leader_of(&hosts).unwrap().id(),
            &HostId::new("node-1", 6161)
        );
    }

    #[test]
    fn test_unknown_priorities_are_ignored() {
        let hosts = vec![
            Host::new(HostId::new("node-0", 6161)),
            Host::with_priority(HostId::new("node-3", 6161), 300),
        ];
        assert_eq!(
            leader_of(&hosts).unwrap().id(),
            &HostId::new("node-3", 6161)
        );
        assert!(leader_of(&[Host::new(HostId::new("node-0", 6161))]).is_none());
    }

    #[test]
    fn test_tie_break_by_host_identifier() {
        let a = vec![
            Host::with_priority(HostId::new("node-b", 6161), 100),
            Host::with_priority(HostId::new("node-a", 6161), 100),
        ];
        let b = vec![
            Host::with_priority(HostId::new("node-a", 6161), 100),
            Host::with_priority(HostId::new("node-b", 6161), 100),
        ];
        assert_eq!(leader_of(&a).unwrap().id(), leader_of(&b).unwrap().id());
        assert_eq!(leader_of(&a).unwrap().id(), &HostId::new("node-a", 6161));
    }
}
