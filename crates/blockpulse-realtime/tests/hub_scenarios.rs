//! Hub fan-out, batching, eviction and shutdown behaviour.

use blockpulse_realtime::{
    Client, ClientMetadata, ClientReceiver, EventKind, HubConfig, HubEvent, HubHandle, HubState,
    RealtimeError, SubscriptionRequest, WebsocketHub,
};
use blockpulse_types::{AddressMessage, MempoolTx};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn config() -> HubConfig {
    HubConfig {
        flush_interval: Duration::from_secs(60),
        ping_interval: Duration::from_secs(60),
        publish_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn tx(n: usize) -> MempoolTx {
    MempoolTx {
        hash: format!("{n:064x}"),
        time: n as i64,
        ..Default::default()
    }
}

async fn recv(rx: &mut ClientReceiver) -> Option<HubEvent> {
    timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()
}

async fn connect(hub: &HubHandle, subscriptions: &[&str]) -> (Arc<Client>, ClientReceiver) {
    let (client, rx) = hub.register(ClientMetadata::now()).await.unwrap();
    for subscription in subscriptions {
        client
            .subscribe(&SubscriptionRequest::parse(subscription).unwrap())
            .unwrap();
    }
    (client, rx)
}

/// A client subscribed only to pings. Since the hub handles events in
/// order, receiving a ping proves everything published before it was
/// processed.
struct Sentinel {
    rx: ClientReceiver,
}

impl Sentinel {
    async fn new(hub: &HubHandle) -> Self {
        let (_, rx) = connect(hub, &["ping"]).await;
        Self { rx }
    }

    async fn sync(&mut self, hub: &HubHandle) {
        hub.publish(HubEvent::PingAndUserCount).await.unwrap();
        assert_eq!(recv(&mut self.rx).await, Some(HubEvent::PingAndUserCount));
    }
}

#[tokio::test]
async fn scenario_a_no_subscribers_no_deliveries() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect(&hub, &[]).await);
    }

    hub.publish(HubEvent::NewBlock).await.unwrap();
    sentinel.sync(&hub).await;

    for (_, rx) in clients.iter_mut() {
        assert!(rx.try_recv().is_err());
    }
    assert_eq!(hub.connection_count(), 4);
    assert_eq!(hub.stats().evicted_clients, 0);
}

#[tokio::test]
async fn scenario_b_deliveries_follow_subscriptions() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;

    let (_, mut blocks) = connect(&hub, &["newblock"]).await;
    let (_, mut addresses) = connect(&hub, &["address:Addr1"]).await;

    let activity = AddressMessage::new("Addr1", "ab".repeat(32));
    hub.publish(HubEvent::NewBlock).await.unwrap();
    hub.publish(HubEvent::AddressTx(activity.clone()))
        .await
        .unwrap();
    sentinel.sync(&hub).await;

    assert_eq!(blocks.try_recv().ok(), Some(HubEvent::NewBlock));
    assert!(blocks.try_recv().is_err());

    assert_eq!(addresses.try_recv().ok(), Some(HubEvent::AddressTx(activity)));
    assert!(addresses.try_recv().is_err());
}

#[tokio::test]
async fn scenario_b_other_address_not_delivered() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (_, mut rx) = connect(&hub, &["address:Addr1"]).await;

    hub.publish(HubEvent::AddressTx(AddressMessage::new("Addr2", "ab")))
        .await
        .unwrap();
    sentinel.sync(&hub).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn scenario_c_transactions_coalesce_into_one_flush() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, mut rx) = connect(&hub, &["newtxs"]).await;

    for i in 0..5 {
        hub.publish(HubEvent::NewTx(tx(i))).await.unwrap();
    }
    sentinel.sync(&hub).await;

    assert_eq!(rx.try_recv().ok(), Some(HubEvent::NewTxs));
    assert!(rx.try_recv().is_err());

    let batch = client.drain_txs();
    assert_eq!(batch.len(), 5);
    for (i, tx) in batch.iter().enumerate() {
        assert_eq!(tx.hash, format!("{i:064x}"));
    }
    assert_eq!(client.pending_txs(), 0);
}

#[tokio::test]
async fn scenario_c_below_capacity_waits_for_flush() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, mut rx) = connect(&hub, &["newtxs"]).await;

    for i in 0..4 {
        hub.publish(HubEvent::NewTx(tx(i))).await.unwrap();
    }
    sentinel.sync(&hub).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(client.pending_txs(), 4);
}

#[tokio::test]
async fn transactions_only_buffered_for_newtxs_subscribers() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, _rx) = connect(&hub, &["newblock"]).await;

    hub.publish(HubEvent::NewTx(tx(0))).await.unwrap();
    sentinel.sync(&hub).await;

    assert_eq!(client.pending_txs(), 0);
}

#[tokio::test]
async fn scenario_d_saturated_client_is_evicted() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (_, mut slow) = connect(&hub, &["newblock"]).await;

    // Fill the delivery channel without consuming.
    for _ in 0..16 {
        hub.publish(HubEvent::NewBlock).await.unwrap();
    }
    sentinel.sync(&hub).await;
    assert_eq!(hub.connection_count(), 2);

    hub.publish(HubEvent::NewBlock).await.unwrap();
    sentinel.sync(&hub).await;

    assert_eq!(hub.connection_count(), 1);
    assert_eq!(hub.stats().evicted_clients, 1);

    // Queued events drain, then the channel reports closed.
    for _ in 0..16 {
        assert_eq!(slow.recv().await, Some(HubEvent::NewBlock));
    }
    assert_eq!(slow.recv().await, None);

    // Later broadcasts skip the evicted client without incident.
    hub.publish(HubEvent::NewBlock).await.unwrap();
    sentinel.sync(&hub).await;
    assert_eq!(hub.state(), HubState::Running);
}

#[tokio::test]
async fn backpressure_isolated_to_slow_client() {
    let hub = WebsocketHub::spawn(HubConfig {
        client_queue_size: 1,
        ..config()
    });
    let mut sentinel = Sentinel::new(&hub).await;

    let mut healthy = Vec::new();
    for _ in 0..3 {
        healthy.push(connect(&hub, &["newblock"]).await);
    }
    let (slow, mut slow_rx) = connect(&hub, &["newblock"]).await;

    hub.publish(HubEvent::NewBlock).await.unwrap();
    sentinel.sync(&hub).await;
    for (_, rx) in healthy.iter_mut() {
        assert_eq!(rx.try_recv().ok(), Some(HubEvent::NewBlock));
    }

    // The slow client never read its first event.
    hub.publish(HubEvent::NewBlock).await.unwrap();
    sentinel.sync(&hub).await;

    for (_, rx) in healthy.iter_mut() {
        assert_eq!(rx.try_recv().ok(), Some(HubEvent::NewBlock));
    }
    assert_eq!(slow_rx.recv().await, Some(HubEvent::NewBlock));
    assert_eq!(slow_rx.recv().await, None);
    assert_eq!(hub.connection_count(), 4);
    assert!(slow.is_subscribed(&HubEvent::NewBlock));
}

#[tokio::test]
async fn flush_timer_drains_partial_buffers() {
    let hub = WebsocketHub::spawn(HubConfig {
        flush_interval: Duration::from_millis(500),
        ..config()
    });
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, mut rx) = connect(&hub, &["newtxs"]).await;

    hub.publish(HubEvent::NewTx(tx(0))).await.unwrap();
    sentinel.sync(&hub).await;
    assert!(rx.try_recv().is_err());

    sleep(Duration::from_millis(700)).await;

    hub.publish(HubEvent::NewTx(tx(1))).await.unwrap();
    assert_eq!(recv(&mut rx).await, Some(HubEvent::NewTxs));

    let batch = client.drain_txs();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].hash, tx(0).hash);
    assert_eq!(client.pending_txs(), 0);
}

#[tokio::test]
async fn unregister_twice_is_noop() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, mut rx) = connect(&hub, &["newblock"]).await;

    hub.unregister(&client.id);
    hub.unregister(&client.id);
    sentinel.sync(&hub).await;

    assert_eq!(rx.recv().await, None);
    assert_eq!(hub.connection_count(), 1);
    assert_eq!(hub.state(), HubState::Running);

    hub.unregister("never-registered");
    sentinel.sync(&hub).await;
    assert_eq!(hub.connection_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_every_client() {
    let hub = WebsocketHub::spawn(config());

    let mut receivers = Vec::new();
    for _ in 0..3 {
        receivers.push(connect(&hub, &["newblock"]).await.1);
    }
    hub.publish(HubEvent::NewBlock).await.unwrap();

    hub.stop();
    timeout(Duration::from_secs(2), hub.stopped())
        .await
        .unwrap();

    assert_eq!(hub.state(), HubState::Stopped);
    assert_eq!(hub.connection_count(), 0);

    for rx in receivers.iter_mut() {
        // At most the one event queued before shutdown, then closed.
        let mut remaining = 0;
        while let Some(event) = recv(rx).await {
            assert_eq!(event, HubEvent::NewBlock);
            remaining += 1;
        }
        assert!(remaining <= 1);
    }

    assert!(matches!(
        hub.publish(HubEvent::NewBlock).await,
        Err(RealtimeError::HubStopped)
    ));
    assert!(matches!(
        hub.register(ClientMetadata::now()).await,
        Err(RealtimeError::HubStopped)
    ));
}

#[tokio::test]
async fn heartbeat_reaches_ping_subscribers() {
    let hub = WebsocketHub::spawn(HubConfig {
        ping_interval: Duration::from_millis(50),
        ..config()
    });
    let (_, mut rx) = connect(&hub, &["ping"]).await;

    assert_eq!(recv(&mut rx).await, Some(HubEvent::PingAndUserCount));
    hub.stop();
}

#[tokio::test]
async fn unsubscribed_kind_not_delivered() {
    let hub = WebsocketHub::spawn(config());
    let mut sentinel = Sentinel::new(&hub).await;
    let (client, mut rx) = connect(&hub, &["newblock", "mempool"]).await;

    client
        .unsubscribe(&SubscriptionRequest::kind(EventKind::NewBlock))
        .unwrap();
    hub.publish(HubEvent::NewBlock).await.unwrap();
    hub.publish(HubEvent::MempoolUpdate).await.unwrap();
    sentinel.sync(&hub).await;

    assert_eq!(rx.try_recv().ok(), Some(HubEvent::MempoolUpdate));
    assert!(rx.try_recv().is_err());
}
