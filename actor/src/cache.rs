// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Key/value cache shared by the actors of a node, optionally replicated to every node.

use crate::{system::WeakSystem, transport::CacheEntry, Error};

use futures::{future::join_all, stream, StreamExt};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use std::collections::HashMap;

pub struct ActorSystemCache {
    system: WeakSystem,
    entries: RwLock<HashMap<String, Value>>,
}

impl ActorSystemCache {
    pub(crate) fn new(system: WeakSystem) -> Self {
        Self {
            system,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_owned(), value);
    }

    pub async fn clear(&self, key: &str) -> Option<Value> {
        self.entries.write().await.remove(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Sets the value here and on every other node.
    pub async fn set_and_sync(&self, key: &str, value: Value) -> Result<(), Error> {
        let json = serde_json::to_string(&value)?;
        self.set(key, value).await;
        self.sync(CacheEntry {
            key: key.to_owned(),
            value: Some(json),
        })
        .await
    }

    /// Clears the key here and on every other node.
    pub async fn clear_and_sync(&self, key: &str) -> Result<(), Error> {
        self.clear(key).await;
        self.sync(CacheEntry {
            key: key.to_owned(),
            value: None,
        })
        .await
    }

    /// Applies an update received from another node.
    pub(crate) async fn apply(&self, entry: CacheEntry) -> Result<(), Error> {
        match entry.value {
            Some(json) => {
                let value: Value = serde_json::from_str(&json)?;
                self.set(&entry.key, value).await;
            }
            None => {
                self.clear(&entry.key).await;
            }
        }
        Ok(())
    }

    async fn sync(&self, entry: CacheEntry) -> Result<(), Error> {
        let system = self.system.upgrade()?;
        let others = system.cluster().other_hosts().await;
        let transport = system.transport();
        let calls = others.iter().map(|host| {
            let entries = stream::iter(vec![entry.clone()]).boxed();
            let transport = transport.clone();
            async move { (host, transport.sync_cache(host.id(), entries).await) }
        });
        for (host, result) in join_all(calls).await {
            if let Err(e) = result {
                warn!("Cache sync to {} failed: {}", host.id(), e);
            }
        }
        Ok(())
    }
}
