// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Shared fixtures for the cluster tests: test behaviors and an in-process cluster builder.

#![allow(dead_code)]

use actor::{
    ActorContext, ActorSystem, Behavior, BehaviorRegistry, Error, ErrorHandler,
    Handler, HostId, LocalNetwork, SystemConfig, SystemRef,
};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

fn field(ctx: &ActorContext, key: &str) -> Value {
    ctx.state().get(key).cloned().unwrap_or(Value::Null)
}

fn set_field(ctx: &mut ActorContext, key: &str, value: Value) {
    if !ctx.state().is_object() {
        ctx.set_state(json!({}));
    }
    if let Some(state) = ctx.state_mut().as_object_mut() {
        state.insert(key.to_owned(), value);
    }
}

// Adds the payload (default 1) to the counter and returns the new count.
pub struct Increment;

#[async_trait]
impl Handler for Increment {
    async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        let count = field(ctx, "count").as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(1);
        set_field(ctx, "count", json!(count));
        Ok(json!(count))
    }
}

pub struct Get;

#[async_trait]
impl Handler for Get {
    async fn handle(&self, ctx: &mut ActorContext, _payload: Value) -> Result<Value, Error> {
        Ok(json!(field(ctx, "count").as_i64().unwrap_or(0)))
    }
}

pub struct Fail;

#[async_trait]
impl Handler for Fail {
    async fn handle(&self, _ctx: &mut ActorContext, _payload: Value) -> Result<Value, Error> {
        Err(Error::Functional("boom".to_owned()))
    }
}

// Returns the startup reason recorded by `Started`.
pub struct Reason;

#[async_trait]
impl Handler for Reason {
    async fn handle(&self, ctx: &mut ActorContext, _payload: Value) -> Result<Value, Error> {
        Ok(field(ctx, "reason"))
    }
}

pub struct Started;

#[async_trait]
impl Handler for Started {
    async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        let reason = payload.get("reason").cloned().unwrap_or(Value::Null);
        set_field(ctx, "reason", reason);
        Ok(Value::Null)
    }
}

pub struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, _ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        Ok(payload)
    }
}

fn record(ctx: &mut ActorContext, value: Value) {
    info!("Recorded {} on {}", value, ctx.system().me());
    let mut list = field(ctx, "list").as_array().cloned().unwrap_or_default();
    list.push(value);
    set_field(ctx, "list", Value::Array(list));
}

// Appends the payload to a list kept in the state.
pub struct Record;

#[async_trait]
impl Handler for Record {
    async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        record(ctx, payload);
        Ok(Value::Null)
    }
}

// Sleeps for the payload in milliseconds, then records "slow".
pub struct Slow;

#[async_trait]
impl Handler for Slow {
    async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        tokio::time::sleep(Duration::from_millis(payload.as_u64().unwrap_or(100))).await;
        record(ctx, json!("slow"));
        Ok(Value::Null)
    }
}

pub struct List;

#[async_trait]
impl Handler for List {
    async fn handle(&self, ctx: &mut ActorContext, _payload: Value) -> Result<Value, Error> {
        Ok(field(ctx, "list"))
    }
}

// Spawns a counter child named by the payload and returns its url.
pub struct SpawnChild;

#[async_trait]
impl Handler for SpawnChild {
    async fn handle(&self, ctx: &mut ActorContext, payload: Value) -> Result<Value, Error> {
        let name = payload
            .as_str()
            .ok_or_else(|| Error::Functional("child name expected".to_owned()))?;
        let child = ctx.spawn_child(name, "counter").await?;
        Ok(json!(child.actor_url()))
    }
}

pub static AUDITED_ERRORS: AtomicUsize = AtomicUsize::new(0);

pub struct Audit;

#[async_trait]
impl ErrorHandler for Audit {
    async fn on_error(&self, _ctx: &mut ActorContext, _message_type: &str, _error: &Error) {
        AUDITED_ERRORS.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn behaviors() -> BehaviorRegistry {
    BehaviorRegistry::new()
        .register(
            "counter",
            Behavior::builder()
                .on("increment", Increment)
                .on("get", Get)
                .on("fail", Fail)
                .on("reason", Reason)
                .on_startup(Started)
                .default_handler(Echo)
                .build(),
        )
        .register(
            "recorder",
            Behavior::builder()
                .on("record", Record)
                .on("slow", Slow)
                .on("list", List)
                .build(),
        )
        .register(
            "spawner",
            Behavior::builder()
                .on("spawn", SpawnChild)
                .on("get", Get)
                .build(),
        )
        .register_error_handler("audit", Audit)
}

pub struct Node {
    pub id: HostId,
    pub system: SystemRef,
}

pub struct TestCluster {
    pub network: LocalNetwork,
    pub nodes: Vec<Node>,
}

impl TestCluster {
    pub fn node(&self, index: usize) -> &SystemRef {
        &self.nodes[index].system
    }

    pub fn id(&self, index: usize) -> &HostId {
        &self.nodes[index].id
    }

    /// Simulates a crash of the node at `index`.
    pub fn kill(&self, index: usize) {
        self.network.kill(&self.nodes[index].id);
        self.nodes[index].system.stop();
    }

    /// Number of live instances of `locator` across the cluster.
    pub async fn instances(&self, locator: &actor::Locator) -> usize {
        let mut count = 0;
        for node in &self.nodes {
            if let Some(actor) = node.system.local_receptionist().lookup(locator).await {
                if actor.is_local() {
                    count += 1;
                }
            }
        }
        count
    }
}

pub fn config(index: usize, priority: u64, hosts: &[HostId], rebalance: bool) -> SystemConfig {
    let mut config = SystemConfig::new(&format!("node-{}", index + 1), 6161)
        .with_cluster(hosts)
        .with_priority(priority);
    config.name = "ferry-test".to_owned();
    config.ping_interval_ms = 100;
    config.retry_base_interval_ms = 20;
    config.election_poll_interval_ms = 10;
    config.election_timeout_ms = 2_000;
    config.default_ask_timeout_ms = Some(2_000);
    config.shutdown_grace_ms = 2_000;
    config.rebalance_on_topology_change = rebalance;
    config
}

/// Starts one node per priority on a shared in-process network and waits for the election.
pub async fn cluster(priorities: &[u64], rebalance: bool) -> TestCluster {
    let network = LocalNetwork::new();
    let hosts: Vec<HostId> = (0..priorities.len())
        .map(|index| HostId::new(&format!("node-{}", index + 1), 6161))
        .collect();

    let mut nodes = Vec::new();
    for (index, priority) in priorities.iter().enumerate() {
        let config = config(index, *priority, &hosts, rebalance);
        let id = config.me();
        let (system, _runner) = ActorSystem::create(
            config,
            behaviors(),
            network.transport_for(&id),
            CancellationToken::new(),
        )
        .unwrap();
        network.register(&id, Arc::new(system.clone()));
        nodes.push(Node { id, system });
    }

    let results = join_all(nodes.iter().map(|node| node.system.start())).await;
    for result in results {
        result.unwrap();
    }
    TestCluster { network, nodes }
}

/// Polls `check` until it holds or two seconds elapse.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
