// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Configuration
//!
//! `SystemConfig` gathers every tunable of a node. It is an explicitly constructed value handed to
//! `ActorSystem::create`; nothing is read from ambient global state.
//!

use crate::{
    Error, HostId,
    retries::{
        ExponentialBackoffStrategy, FixedIntervalStrategy, LinearIntervalStrategy,
        NoIntervalStrategy, RetryStrategy,
    },
};

use serde::{Deserialize, Serialize};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A seed host of the cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl From<&HostConfig> for HostId {
    fn from(config: &HostConfig) -> Self {
        HostId::new(&config.host, config.port)
    }
}

/// How the wait between two delivery attempts grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryBackoff {
    /// Retry at once.
    Immediate,
    /// `retry_base_interval` between every attempt.
    Fixed,
    /// `attempt × retry_base_interval`.
    Linear,
    /// Exponential backoff starting at `retry_base_interval`.
    Exponential,
}

/// Node configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Name of the actor system.
    pub name: String,
    /// Address this node is reachable at.
    pub host: String,
    /// Port this node is reachable at.
    pub port: u16,
    /// Seed hosts. This node is added if it is not listed.
    pub cluster: Vec<HostConfig>,
    /// Fixed leadership priority. Defaults to the start time in epoch millis.
    pub priority: Option<u64>,
    pub startup_delay_ms: u64,
    pub election_poll_interval_ms: u64,
    pub election_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub max_delivery_attempts: u32,
    pub retry_base_interval_ms: u64,
    pub delivery_backoff: DeliveryBackoff,
    pub default_ask_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: u64,
    pub rebalance_on_topology_change: bool,
}

fn default_port() -> u16 {
    6161
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "ferry".to_owned(),
            host: "localhost".to_owned(),
            port: default_port(),
            cluster: Vec::new(),
            priority: None,
            startup_delay_ms: 1000,
            election_poll_interval_ms: 1000,
            election_timeout_ms: 30_000,
            ping_interval_ms: 1000,
            max_delivery_attempts: 3,
            retry_base_interval_ms: 100,
            delivery_backoff: DeliveryBackoff::Linear,
            default_ask_timeout_ms: None,
            shutdown_grace_ms: 10_000,
            rebalance_on_topology_change: true,
        }
    }
}

impl SystemConfig {
    /// Creates a configuration for the node at `host:port`, everything else default.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            ..Default::default()
        }
    }

    /// Parses a JSON configuration document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is malformed or fails validation.
    ///
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: SystemConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_owned()));
        }
        if self.max_delivery_attempts == 0 {
            return Err(Error::Config(
                "max_delivery_attempts must be at least 1".to_owned(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn with_cluster(mut self, hosts: &[HostId]) -> Self {
        self.cluster = hosts
            .iter()
            .map(|id| HostConfig {
                host: id.address.clone(),
                port: id.port,
            })
            .collect();
        self
    }

    pub fn with_priority(mut self, priority: u64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn me(&self) -> HostId {
        HostId::new(&self.host, self.port)
    }

    /// The configured priority, or the current epoch millis.
    pub fn resolve_priority(&self) -> u64 {
        self.priority.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default()
        })
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn election_poll_interval(&self) -> Duration {
        Duration::from_millis(self.election_poll_interval_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn retry_base_interval(&self) -> Duration {
        Duration::from_millis(self.retry_base_interval_ms)
    }

    pub fn default_ask_timeout(&self) -> Option<Duration> {
        self.default_ask_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// A fresh retry strategy for one outbound delivery.
    pub fn delivery_strategy(&self) -> Box<dyn RetryStrategy> {
        let max_retries = self.max_delivery_attempts as usize;
        match self.delivery_backoff {
            DeliveryBackoff::Immediate => Box::new(NoIntervalStrategy::new(max_retries)),
            DeliveryBackoff::Fixed => Box::new(FixedIntervalStrategy::new(
                max_retries,
                self.retry_base_interval(),
            )),
            DeliveryBackoff::Linear => Box::new(LinearIntervalStrategy::new(
                max_retries,
                self.retry_base_interval(),
            )),
            DeliveryBackoff::Exponential => {
                Box::new(ExponentialBackoffStrategy::with_initial_interval(
                    max_retries,
                    self.retry_base_interval(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.port, 6161);
        assert_eq!(config.max_delivery_attempts, 3);
        assert_eq!(config.delivery_backoff, DeliveryBackoff::Linear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_document() {
        let config = SystemConfig::from_json(
            r#"{
                "name": "bank",
                "host": "10.0.0.1",
                "cluster": [{ "host": "10.0.0.2" }, { "host": "10.0.0.3", "port": 7000 }],
                "delivery_backoff": "exponential",
                "priority": 42
            }"#,
        )
        .unwrap();
        assert_eq!(config.name, "bank");
        assert_eq!(config.port, 6161);
        assert_eq!(config.cluster[0].port, 6161);
        assert_eq!(config.cluster[1].port, 7000);
        assert_eq!(config.delivery_backoff, DeliveryBackoff::Exponential);
        assert_eq!(config.resolve_priority(), 42);
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            SystemConfig::from_json(r#"{ "port": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SystemConfig::from_json(r#"{ "max_delivery_attempts": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(SystemConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_linear_delivery_strategy() {
        let config = SystemConfig {
            retry_base_interval_ms: 50,
            ..Default::default()
        };
        let mut strategy = config.delivery_strategy();
        assert_eq!(strategy.max_retries(), 3);
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(50)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_selectable_delivery_strategies() {
        let immediate = SystemConfig::from_json(r#"{ "delivery_backoff": "immediate" }"#).unwrap();
        assert_eq!(immediate.delivery_strategy().next_backoff(), None);

        let fixed = SystemConfig::from_json(
            r#"{ "delivery_backoff": "fixed", "retry_base_interval_ms": 30 }"#,
        )
        .unwrap();
        let mut strategy = fixed.delivery_strategy();
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(30)));
        assert_eq!(strategy.next_backoff(), Some(Duration::from_millis(30)));
    }
}
