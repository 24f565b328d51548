// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Hosts
//!
//! A host is a node taking part in the cluster. Hosts are identified by `address:port`;
//! equality never looks at the mutable priority or liveness status.
//!

use crate::{Error, Locator};

use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};

/// Identity of a host (`address:port`). Addresses are kept the way an actor url carries them:
/// DNS names lowercased and IPv6 literals without brackets.
#[derive(
    Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct HostId {
    pub address: String,
    pub port: u16,
}

impl HostId {
    pub fn new(address: &str, port: u16) -> Self {
        let address = address
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(address);
        Self {
            address: address.to_ascii_lowercase(),
            port,
        }
    }

    /// Base url of the node (`http://address:port`).
    pub fn base_url(&self) -> String {
        if self.address.contains(':') {
            format!("http://[{}]:{}", self.address, self.port)
        } else {
            format!("http://{}", self)
        }
    }

    /// Url under which the actor with `locator` is served by this host.
    pub fn actor_url(&self, locator: &Locator) -> String {
        let encoded: String =
            form_urlencoded::byte_serialize(locator.to_string().as_bytes())
                .collect();
        format!("{}/actorSystem/actor/{}", self.base_url(), encoded)
    }

    /// Extracts the owning host from an actor url.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLocator` if the url cannot be parsed or carries no host/port.
    ///
    pub fn from_actor_url(actor_url: &str) -> Result<Self, Error> {
        let url = Url::parse(actor_url).map_err(|e| {
            Error::InvalidLocator(format!("{}: {}", actor_url, e))
        })?;
        let address = url.host_str().ok_or_else(|| {
            Error::InvalidLocator(format!("{} has no host", actor_url))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            Error::InvalidLocator(format!("{} has no port", actor_url))
        })?;
        Ok(HostId::new(address, port))
    }
}

impl Display for HostId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Liveness status of a host as last observed by this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    Unknown,
    Alive,
    Down,
}

/// A node of the cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Host {
    id: HostId,
    /// Start-time based priority. Lower wins leadership. `None` until known.
    priority: Option<u64>,
    status: HostStatus,
}

impl Host {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            priority: None,
            status: HostStatus::Unknown,
        }
    }

    pub fn with_priority(id: HostId, priority: u64) -> Self {
        Self {
            id,
            priority: Some(priority),
            status: HostStatus::Unknown,
        }
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn priority(&self) -> Option<u64> {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u64) {
        self.priority = Some(priority);
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    pub fn set_status(&mut self, status: HostStatus) {
        self.status = status;
    }

    /// Leadership rank: lower is better. Hosts without a priority never rank.
    pub(crate) fn rank(&self) -> Option<(u64, &HostId)> {
        self.priority.map(|priority| (priority, &self.id))
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
