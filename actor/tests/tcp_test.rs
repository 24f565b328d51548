// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Two nodes talking over the TCP transport

mod common;

use actor::{ActorSystem, HostId, SystemRef, TcpServer, TcpTransport};
use common::behaviors;
use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use std::sync::Arc;

async fn tcp_node(
    server: TcpServer,
    priority: u64,
    hosts: &[HostId],
    token: &CancellationToken,
) -> SystemRef {
    let port = server.local_addr().unwrap().port();
    let index = hosts.iter().position(|h| h.port == port).unwrap();
    let mut config = common::config(index, priority, hosts, false);
    config.host = "127.0.0.1".to_owned();
    config.port = port;

    let (system, _runner) = ActorSystem::create(
        config,
        behaviors(),
        Arc::new(TcpTransport::new()),
        token.clone(),
    )
    .unwrap();
    tokio::spawn(server.serve(Arc::new(system.clone()), token.clone()));
    system
}

#[tokio::test]
#[traced_test]
async fn test_cluster_over_tcp() {
    let first = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let second = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let hosts = vec![
        HostId::new("127.0.0.1", first.local_addr().unwrap().port()),
        HostId::new("127.0.0.1", second.local_addr().unwrap().port()),
    ];
    let token = CancellationToken::new();

    let leader = tcp_node(first, 100, &hosts, &token).await;
    let follower = tcp_node(second, 200, &hosts, &token).await;
    for result in join_all([leader.start(), follower.start()]).await {
        result.unwrap();
    }
    assert!(leader.cluster().is_leader().await);
    assert_eq!(
        follower.node_status().await.leader,
        Some(hosts[0].to_string())
    );

    // Forwarded to the leader, placed on either node.
    let first_actor = follower.create_actor("one", "counter").await.unwrap();
    let second_actor = follower.create_actor("two", "counter").await.unwrap();
    assert_ne!(first_actor.host(), second_actor.host());

    for actor in [&first_actor, &second_actor] {
        actor.tell(Some("increment"), &2).await.unwrap();
        assert_eq!(
            actor.ask(Some("increment"), &1, None).await.unwrap(),
            json!(3)
        );
    }

    leader.cache().set_and_sync("mode", json!("tcp")).await.unwrap();
    assert_eq!(follower.cache().get("mode").await, Some(json!("tcp")));

    token.cancel();
}
