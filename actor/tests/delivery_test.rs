// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for tell, ask, retries and forwarding

mod common;

use actor::{ActorRef, Error, Locator, STARTUP_MESSAGE_TYPE, TRANSFER_MESSAGE_TYPE};
use common::{cluster, TestCluster, AUDITED_ERRORS};
use serde_json::json;
use tracing_test::traced_test;

use std::{sync::atomic::Ordering, time::Duration};

/// Creates actors from the leader until one lands on `host`.
async fn create_on(cluster: &TestCluster, host: usize, behavior: &str) -> ActorRef {
    for index in 0..cluster.nodes.len() {
        let actor = cluster
            .node(0)
            .create_actor(&format!("{}-{}", behavior, index), behavior)
            .await
            .unwrap();
        if actor.host() == cluster.id(host) {
            return actor;
        }
    }
    panic!("no actor was placed on {}", cluster.id(host));
}

#[tokio::test]
async fn test_tell_and_ask_are_location_transparent() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;

    // Remote from the leader.
    assert!(!counter.is_local());
    counter.tell(Some("increment"), &2).await.unwrap();
    assert_eq!(
        counter.ask(Some("increment"), &3, None).await.unwrap(),
        json!(5)
    );

    // Local on the owner.
    let local = cluster.node(1).lookup(counter.locator()).await.unwrap();
    assert!(local.is_local());
    assert_eq!(local.ask(Some("get"), &(), None).await.unwrap(), json!(5));

    // Default message type goes to the default handler.
    assert_eq!(
        local.ask(None, &json!({"ping": 1}), None).await.unwrap(),
        json!({"ping": 1})
    );
}

#[tokio::test]
async fn test_mailbox_order_is_preserved() {
    let cluster = cluster(&[100, 200], false).await;
    let recorder = create_on(&cluster, 1, "recorder").await;

    for value in 1..=20 {
        recorder.tell(Some("record"), &value).await.unwrap();
    }
    let list = recorder.ask(Some("list"), &(), None).await.unwrap();
    assert_eq!(list, json!((1..=20).collect::<Vec<i32>>()));
}

#[tokio::test]
#[traced_test]
async fn test_handler_error_does_not_stop_the_actor() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;

    let result = counter.ask(Some("fail"), &(), None).await;
    assert_eq!(result, Err(Error::Functional("boom".to_owned())));
    assert_eq!(
        counter.ask(Some("increment"), &1, None).await.unwrap(),
        json!(1)
    );
    assert!(logs_contain("failed processing fail"));
}

#[tokio::test]
async fn test_unknown_message_type_is_a_processing_error() {
    let cluster = cluster(&[100], false).await;
    let recorder = cluster
        .node(0)
        .create_actor("recorder", "recorder")
        .await
        .unwrap();

    let result = recorder.ask(Some("launch"), &(), None).await;
    assert!(matches!(result, Err(Error::MessageProcessing(_))));
    recorder.tell(Some("record"), &1).await.unwrap();
    assert_eq!(
        recorder.ask(Some("list"), &(), None).await.unwrap(),
        json!([1])
    );
}

#[tokio::test]
async fn test_error_handler_is_invoked() {
    let cluster = cluster(&[100], false).await;
    let audited = cluster
        .node(0)
        .root()
        .spawn_child_with("audited", "counter", Some("audit"))
        .await
        .unwrap();

    let before = AUDITED_ERRORS.load(Ordering::SeqCst);
    assert!(audited.ask(Some("fail"), &(), None).await.is_err());
    assert_eq!(AUDITED_ERRORS.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn test_spawning_an_existing_local_child_fails() {
    let cluster = cluster(&[100], false).await;
    let system = cluster.node(0);

    system.create_actor("unique", "counter").await.unwrap();
    let again = system.create_actor("unique", "counter").await;
    assert!(matches!(again, Err(Error::ActorCreation(_))));

    let invalid = system.create_actor("with/slash", "counter").await;
    assert!(invalid.is_err());
}

#[tokio::test]
#[traced_test]
async fn test_delivery_gives_up_after_retries() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;

    cluster.network.kill(cluster.id(1));
    let result = counter.tell(Some("increment"), &1).await;
    assert!(matches!(result, Err(Error::Queueing(..))));
    assert!(logs_contain("Giving up queueing increment"));
}

#[tokio::test]
#[traced_test]
async fn test_transient_failure_is_retried() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;
    counter.ask(Some("increment"), &1, None).await.unwrap();

    // Down for less than one backoff interval.
    cluster.network.kill(cluster.id(1));
    let network = cluster.network.clone();
    let owner = cluster.id(1).clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        network.revive(&owner);
    });

    assert_eq!(
        counter.ask(Some("increment"), &1, None).await.unwrap(),
        json!(2)
    );
    assert!(logs_contain("(attempt 1)"));
    assert!(!logs_contain("(attempt 2)"));
    assert!(!logs_contain("Giving up"));
    assert!(!logs_contain("Forwarding"));
}

#[tokio::test]
async fn test_reserved_message_types_are_rejected() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;

    let transfer = counter
        .ask(
            Some(TRANSFER_MESSAGE_TYPE),
            &json!({ "target": { "address": "node-1", "port": 6161 } }),
            None,
        )
        .await;
    assert!(matches!(transfer, Err(Error::MessageProcessing(_))));
    let startup = counter
        .tell(Some(STARTUP_MESSAGE_TYPE), &json!({ "reason": "forged" }))
        .await;
    assert!(matches!(startup, Err(Error::MessageProcessing(_))));

    assert_eq!(
        counter.ask(Some("reason"), &(), None).await.unwrap(),
        json!("created")
    );
    assert_eq!(counter.host(), cluster.id(1));
    assert_eq!(cluster.instances(counter.locator()).await, 1);
}

#[tokio::test]
async fn test_ask_times_out() {
    let cluster = cluster(&[100, 200], false).await;
    let counter = create_on(&cluster, 1, "counter").await;

    cluster.network.kill(cluster.id(1));
    let result = counter
        .ask(Some("get"), &(), Some(Duration::from_millis(50)))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[traced_test]
async fn test_stale_remote_reference_is_forwarded() {
    let cluster = cluster(&[100, 200, 300], false).await;
    let counter = cluster
        .node(0)
        .create_actor("forwarded", "counter")
        .await
        .unwrap();
    assert_eq!(counter.host(), cluster.id(0));
    counter.ask(Some("increment"), &4, None).await.unwrap();

    // A remote handle held by another node.
    let stale = cluster.node(1).lookup(counter.locator()).await.unwrap();
    assert_eq!(stale.host(), cluster.id(0));

    let moved = cluster
        .node(0)
        .cluster()
        .transfer(&counter, cluster.id(2))
        .await
        .unwrap();
    assert_eq!(moved.host(), cluster.id(2));

    assert_eq!(
        stale.ask(Some("increment"), &1, None).await.unwrap(),
        json!(5)
    );
    let fresh = cluster
        .node(1)
        .receptionist()
        .lookup(&Locator::parse("-/forwarded").unwrap())
        .await
        .unwrap();
    assert_eq!(fresh.host(), cluster.id(2));
}

#[tokio::test]
async fn test_lookup_by_name() {
    let cluster = cluster(&[100, 200], false).await;
    let bank = cluster.node(0).create_actor("bank", "spawner").await.unwrap();
    bank.ask(Some("spawn"), &"alice", None).await.unwrap();
    cluster.node(0).create_actor("alice", "counter").await.unwrap();

    let found = cluster.node(1).lookup_by_name("alice").await;
    let locators: Vec<String> = found.iter().map(|a| a.locator().to_string()).collect();
    assert_eq!(locators, vec!["-/alice".to_owned(), "-/bank/alice".to_owned()]);
}
