mod common;

use std::{sync::Arc, time::Duration};

use common::{MockConnector, MockMode, init_tracing, settle};
use realtime_link::{
    auth::AuthFlag,
    websocket::{JsonTopicProtocol, LinkConfig, RealtimeClient, Topic},
};
use serde_json::{Value, json};

const URL: &str = "ws://canvas.test/encube-assignment-api/v1/ws";

fn start(config: LinkConfig, mode: MockMode) -> (RealtimeClient, MockConnector, Arc<AuthFlag>) {
    init_tracing();
    let connector = MockConnector::new(mode);
    let flag = Arc::new(AuthFlag::new(true));
    let client = RealtimeClient::builder(config, Arc::clone(&flag))
        .connector(connector.clone())
        .start()
        .expect("client should start");
    (client, connector, flag)
}

fn subscribe_intent(topic: &str) -> Value {
    json!({"type": "subscribe", "canvasId": topic})
}

fn unsubscribe_intent(topic: &str) -> Value {
    json!({"type": "unsubscribe", "canvasId": topic})
}

#[tokio::test(start_paused = true)]
async fn repeated_subscribe_sends_one_intent() {
    let (client, connector, _flag) = start(LinkConfig::new(URL), MockMode::AutoOpen);
    settle().await;

    client.subscribe("canvas-1");
    client.subscribe("canvas-1");
    settle().await;

    assert_eq!(
        connector.remote(0).sent_json(),
        vec![subscribe_intent("canvas-1")]
    );
    assert_eq!(client.active_topics(), vec![Topic::new("canvas-1")]);
}

#[tokio::test(start_paused = true)]
async fn remount_within_grace_sends_nothing_extra() {
    let (client, connector, _flag) = start(LinkConfig::new(URL), MockMode::AutoOpen);
    settle().await;

    client.subscribe("canvas-1");
    client.unsubscribe("canvas-1");
    client.subscribe("canvas-1");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        connector.remote(0).sent_json(),
        vec![subscribe_intent("canvas-1")]
    );
    assert_eq!(client.active_topics(), vec![Topic::new("canvas-1")]);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_goes_out_after_grace() {
    let config = LinkConfig::new(URL).unsubscribe_grace(Duration::from_millis(100));
    let (client, connector, _flag) = start(config, MockMode::AutoOpen);
    settle().await;

    client.subscribe("canvas-1");
    client.unsubscribe("canvas-1");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.remote(0).sent_json().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        connector.remote(0).sent_json(),
        vec![subscribe_intent("canvas-1"), unsubscribe_intent("canvas-1")]
    );
    assert!(client.active_topics().is_empty());

    // Switching back after the unsubscribe went out subscribes again.
    client.subscribe("canvas-1");
    settle().await;
    assert_eq!(connector.remote(0).sent_json().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn switching_topics_unsubscribes_previous() {
    let (client, connector, _flag) = start(LinkConfig::new(URL), MockMode::AutoOpen);
    settle().await;

    client.subscribe("canvas-1");
    client.unsubscribe("canvas-1");
    client.subscribe("canvas-2");
    settle().await;

    assert_eq!(
        connector.remote(0).sent_json(),
        vec![
            subscribe_intent("canvas-1"),
            subscribe_intent("canvas-2"),
            unsubscribe_intent("canvas-1"),
        ]
    );
    assert_eq!(client.active_topics(), vec![Topic::new("canvas-2")]);
}

#[tokio::test(start_paused = true)]
async fn subscribe_before_open_is_flushed_on_open() {
    let (client, connector, _flag) = start(LinkConfig::new(URL), MockMode::Manual);

    client.subscribe("canvas-3");
    assert_eq!(client.queued_len(), 1);
    assert_eq!(client.active_topics(), vec![Topic::new("canvas-3")]);

    connector.remote(0).open();
    settle().await;
    assert_eq!(
        connector.remote(0).sent_json(),
        vec![subscribe_intent("canvas-3")]
    );
}

#[tokio::test(start_paused = true)]
async fn losing_session_cancels_pending_unsubscribe() {
    let (client, connector, flag) = start(LinkConfig::new(URL), MockMode::AutoOpen);
    settle().await;

    client.subscribe("canvas-1");
    client.unsubscribe("canvas-1");
    flag.set(false);
    client.refresh_auth();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        connector.remote(0).sent_json(),
        vec![subscribe_intent("canvas-1")]
    );
    assert!(client.active_topics().is_empty());
}

#[tokio::test(start_paused = true)]
async fn subscribe_without_session_is_retried_later() {
    let (client, connector, flag) = start(LinkConfig::new(URL), MockMode::AutoOpen);
    flag.set(false);
    client.refresh_auth();

    client.subscribe("canvas-1");
    assert!(client.active_topics().is_empty());

    flag.set(true);
    client.refresh_auth();
    settle().await;
    client.subscribe("canvas-1");
    settle().await;

    assert_eq!(
        connector.last().sent_json(),
        vec![subscribe_intent("canvas-1")]
    );
}

#[tokio::test(start_paused = true)]
async fn custom_topic_field() {
    init_tracing();
    let connector = MockConnector::new(MockMode::AutoOpen);
    let client = RealtimeClient::builder(LinkConfig::new(URL), AuthFlag::new(true))
        .connector(connector.clone())
        .protocol(JsonTopicProtocol::with_field("roomId"))
        .start()
        .expect("client should start");
    settle().await;

    client.subscribe("r-1");
    settle().await;
    assert_eq!(
        connector.remote(0).sent_json(),
        vec![json!({"type": "subscribe", "roomId": "r-1"})]
    );
}
