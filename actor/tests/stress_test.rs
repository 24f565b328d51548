// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Creation and delivery under a multi-threaded runtime

mod common;

use actor::Locator;
use common::cluster;
use futures::future::join_all;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_creation_yields_one_instance() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let cluster = cluster(&[100, 200, 300], false).await;
    let tasks = (0..12).map(|i| {
        let system = cluster.node(i % 3).clone();
        tokio::spawn(async move { system.create_actor("hot", "counter").await })
    });

    let mut urls = Vec::new();
    for joined in join_all(tasks).await {
        // A node that already hosts the actor refuses to spawn it twice.
        if let Ok(actor) = joined.unwrap() {
            urls.push(actor.actor_url().to_owned());
        }
    }
    assert!(!urls.is_empty());
    urls.dedup();
    assert_eq!(urls.len(), 1);
    assert_eq!(cluster.instances(&Locator::parse("-/hot").unwrap()).await, 1);

    let hot = cluster.node(0).lookup(&Locator::parse("-/hot").unwrap()).await.unwrap();
    let increments = (0..50).map(|_| {
        let hot = hot.clone();
        tokio::spawn(async move { hot.ask(Some("increment"), &1, None).await })
    });
    for joined in join_all(increments).await {
        joined.unwrap().unwrap();
    }
    assert_eq!(hot.ask(Some("get"), &(), None).await.unwrap(), json!(50));
}
