//! Websocket hub: the event loop owning all client registrations.
//!
//! The hub task is the only writer of the client registry. Everything else
//! talks to it through a [`HubHandle`]:
//!
//! - registrations and unregistrations from connection sessions,
//! - events from producers on the shared relay channel,
//! - the shutdown signal.
//!
//! Delivery to clients never blocks. A client whose delivery channel is full
//! is unregistered on the spot.

use crate::client::{create_client, Client, ClientId, ClientMetadata, ClientReceiver, ClientSender};
use crate::error::RealtimeError;
use crate::event::{EventKind, HubEvent};
use crate::heartbeat::{spawn_heartbeat, PING_INTERVAL};
use crate::ticker::{FlushTicker, FLUSH_INTERVAL};
use crate::{buffer::NEW_TX_BUFFER_SIZE, client::CLIENT_QUEUE_SIZE};
use blockpulse_types::MempoolTx;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TrySendError},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Default bounded wait for producers publishing into the hub.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the shared relay channel.
const RELAY_CAPACITY: usize = 256;

/// Capacity of the registration channel.
const REGISTER_CAPACITY: usize = 64;

/// Tunables of the hub loop.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-client delivery channel capacity.
    pub client_queue_size: usize,
    /// Buffered transactions that trigger a flush.
    pub tx_buffer_size: usize,
    /// Interval of the periodic transaction flush.
    pub flush_interval: Duration,
    /// Interval of the ping-and-count heartbeat.
    pub ping_interval: Duration,
    /// Bounded wait for producers.
    pub publish_timeout: Duration,
    /// Capacity of the shared relay channel.
    pub relay_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_size: CLIENT_QUEUE_SIZE,
            tx_buffer_size: NEW_TX_BUFFER_SIZE,
            flush_interval: FLUSH_INTERVAL,
            ping_interval: PING_INTERVAL,
            publish_timeout: PUBLISH_TIMEOUT,
            relay_capacity: RELAY_CAPACITY,
        }
    }
}

/// Lifecycle of the hub loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    /// Accepting clients and events.
    Running,
    /// Shutdown requested; closing client channels.
    Draining,
    /// Terminal. Registry empty, every channel closed.
    Stopped,
}

/// Hub statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Current number of connections.
    pub current_connections: usize,
    /// Total connections since start.
    pub total_connections: u64,
    /// Total events broadcast since start.
    pub total_events: u64,
    /// Clients dropped for not keeping up.
    pub evicted_clients: u64,
    /// Malformed or misrouted events discarded.
    pub dropped_events: u64,
}

/// State shared between the hub loop and its handles.
#[derive(Debug)]
struct Shared {
    config: HubConfig,
    num_clients: AtomicUsize,
    ready: AtomicBool,
    stats: RwLock<HubStats>,
}

/// A new client and its delivery channel, on its way into the registry.
#[derive(Debug)]
struct Registration {
    client: Arc<Client>,
    sender: ClientSender,
}

/// Registry entry. Dropping it closes the client's delivery channel.
#[derive(Debug)]
struct Spoke {
    client: Arc<Client>,
    sender: ClientSender,
}

/// The hub event loop. Create with [`WebsocketHub::new`] and drive with
/// [`WebsocketHub::run`], or use [`WebsocketHub::spawn`].
#[derive(Debug)]
pub struct WebsocketHub {
    clients: HashMap<ClientId, Spoke>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<ClientId>,
    relay_rx: mpsc::Receiver<HubEvent>,
    heartbeat_relay: Option<mpsc::Sender<HubEvent>>,
    shutdown: CancellationToken,
    state: watch::Sender<HubState>,
    shared: Arc<Shared>,
}

impl WebsocketHub {
    /// Create the hub loop and a handle to it.
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::channel(config.relay_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(HubState::Running);
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            config,
            num_clients: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            stats: RwLock::new(HubStats::default()),
        });

        let hub = Self {
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            relay_rx,
            heartbeat_relay: Some(relay_tx.clone()),
            shutdown: shutdown.clone(),
            state: state_tx,
            shared: shared.clone(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            relay_tx,
            shutdown,
            state: state_rx,
            shared,
        };
        (hub, handle)
    }

    /// Create the hub and run its loop on the current runtime.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Run the event loop until shutdown or until the relay closes.
    pub async fn run(mut self) {
        info!("Starting websocket hub run loop");

        let config = self.shared.config.clone();
        let ticker = FlushTicker::spawn(config.flush_interval);
        let heartbeat = self.heartbeat_relay.take().map(|relay| {
            spawn_heartbeat(
                relay.downgrade(),
                config.ping_interval,
                config.publish_timeout,
                self.shutdown.clone(),
            )
        });

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(registration) = self.register_rx.recv() => {
                    self.register_client(registration);
                }
                Some(client_id) = self.unregister_rx.recv() => {
                    self.unregister_client(&client_id);
                }
                event = self.relay_rx.recv() => match event {
                    Some(event) => self.handle_event(event, &ticker),
                    None => {
                        debug!("Hub relay closed");
                        break;
                    }
                },
            }
        }

        self.drain(ticker, heartbeat).await;
    }

    /// Process one event from the relay.
    fn handle_event(&mut self, event: HubEvent, ticker: &FlushTicker) {
        let clients_count = self.clients.len();
        if clients_count == 0 {
            trace!(event = %event.kind(), "No clients, event discarded");
            return;
        }

        if let Err(e) = event.validate() {
            warn!(error = %e, "Invalid event on hub relay");
            self.shared.stats.write().dropped_events += 1;
            return;
        }

        let event = match event {
            HubEvent::NewBlock => {
                if self.shared.ready.load(Ordering::Relaxed) {
                    info!(clients = clients_count, "Signaling new block to websocket clients");
                } else {
                    debug!(clients = clients_count, "Signaling new block to websocket clients");
                }
                event
            }
            HubEvent::MempoolUpdate => {
                info!(clients = clients_count, "Signaling mempool inventory refresh");
                event
            }
            HubEvent::PingAndUserCount => {
                trace!(clients = clients_count, "Signaling ping/user count");
                event
            }
            HubEvent::Subscribe(_) | HubEvent::Unsubscribe(_) => {
                warn!(event = %event.kind(), "Subscription requests are not broadcastable events");
                self.shared.stats.write().dropped_events += 1;
                return;
            }
            HubEvent::NewTx(tx) => {
                trace!(hash = %tx.hash, "Queueing new tx in client buffers");
                let some_ready = self.buffer_tx(&tx);
                if some_ready {
                    // About to flush, so restart the periodic flush.
                    ticker.reset();
                }
                if !(some_ready || ticker.time_to_flush()) {
                    return;
                }
                // Each client's send pump reads its own buffer.
                HubEvent::NewTxs
            }
            other => other,
        };

        self.broadcast(&event);

        if event == HubEvent::NewTxs {
            ticker.clear();
        }
    }

    /// Append a transaction to the buffer of every client taking `newtxs`.
    /// Returns whether at least one buffer is ready to flush.
    fn buffer_tx(&self, tx: &MempoolTx) -> bool {
        self.clients
            .values()
            .filter(|spoke| spoke.client.has_kind(EventKind::NewTxs))
            .fold(false, |ready, spoke| spoke.client.buffer_tx(tx.clone()) || ready)
    }

    /// Offer an event to every subscribed client, evicting the ones that
    /// cannot take it.
    fn broadcast(&mut self, event: &HubEvent) {
        let mut recipients = 0usize;
        let mut evicted = Vec::new();

        for (client_id, spoke) in &self.clients {
            if !spoke.client.is_subscribed(event) {
                continue;
            }

            match spoke.sender.try_send(event.clone()) {
                Ok(()) => recipients += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(client_id = %client_id, "Client delivery channel full, unregistering");
                    evicted.push(client_id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %client_id, "Client delivery channel closed, unregistering");
                    evicted.push(client_id.clone());
                }
            }
        }

        let evicted_count = evicted
            .iter()
            .filter(|client_id| self.remove_client(client_id))
            .count();

        let mut stats = self.shared.stats.write();
        stats.total_events += 1;
        stats.evicted_clients += evicted_count as u64;
        drop(stats);

        debug!(
            event = %event.kind(),
            recipients,
            evicted = evicted_count,
            "Event broadcast"
        );
    }

    /// Only called from the run loop.
    fn register_client(&mut self, registration: Registration) {
        let Registration { client, sender } = registration;
        let client_id = client.id.clone();
        self.clients.insert(client_id.clone(), Spoke { client, sender });
        self.update_client_count();
        self.shared.stats.write().total_connections += 1;
        debug!(client_id = %client_id, clients = self.clients.len(), "Registered websocket client");
    }

    /// Only called from the run loop.
    fn unregister_client(&mut self, client_id: &str) {
        if !self.remove_client(client_id) {
            error!(client_id = %client_id, "Unregistering unknown websocket client");
            return;
        }
        debug!(
            client_id = %client_id,
            clients = self.clients.len(),
            "Unregistered websocket client"
        );
    }

    /// Remove a client, closing its delivery channel. Returns false when the
    /// client was not registered.
    fn remove_client(&mut self, client_id: &str) -> bool {
        let Some(spoke) = self.clients.remove(client_id) else {
            return false;
        };
        // The registry held the only sender.
        drop(spoke);
        self.update_client_count();
        true
    }

    fn update_client_count(&self) {
        self.shared
            .num_clients
            .store(self.clients.len(), Ordering::Release);
    }

    /// Shutdown sequence: stop intake, close every client channel, stop the
    /// timer tasks.
    async fn drain(&mut self, ticker: FlushTicker, heartbeat: Option<tokio::task::JoinHandle<()>>) {
        self.state.send_replace(HubState::Draining);
        info!(clients = self.clients.len(), "Stopping websocket hub");

        self.shutdown.cancel();
        self.relay_rx.close();
        self.register_rx.close();
        self.unregister_rx.close();

        // Pending registrations never reach the registry; dropping them
        // closes their channels.
        while self.register_rx.try_recv().is_ok() {}
        while self.relay_rx.try_recv().is_ok() {}
        while self.unregister_rx.try_recv().is_ok() {}

        let closed = self.clients.len();
        self.clients.clear();
        self.update_client_count();

        ticker.stop().await;
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.await;
        }

        self.state.send_replace(HubState::Stopped);
        info!(closed, "Websocket hub stopped");
    }
}

/// Cloneable handle to a running [`WebsocketHub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::UnboundedSender<ClientId>,
    relay_tx: mpsc::Sender<HubEvent>,
    shutdown: CancellationToken,
    state: watch::Receiver<HubState>,
    shared: Arc<Shared>,
}

impl HubHandle {
    /// Create a client and hand it to the hub.
    ///
    /// Returns the client and the receiving end of its delivery channel.
    /// The receiver yields `None` once the hub unregisters the client.
    pub async fn register(
        &self,
        metadata: ClientMetadata,
    ) -> Result<(Arc<Client>, ClientReceiver), RealtimeError> {
        if self.shutdown.is_cancelled() {
            return Err(RealtimeError::HubStopped);
        }

        let config = &self.shared.config;
        let (client, sender, receiver) =
            create_client(config.tx_buffer_size, config.client_queue_size, metadata);

        self.register_tx
            .send(Registration {
                client: client.clone(),
                sender,
            })
            .await
            .map_err(|_| RealtimeError::HubStopped)?;

        Ok((client, receiver))
    }

    /// Ask the hub to drop a client and close its delivery channel.
    /// Unknown clients are logged by the hub and otherwise ignored.
    pub fn unregister(&self, client_id: &str) {
        if self.unregister_tx.send(client_id.to_string()).is_err() {
            trace!(client_id = %client_id, "Hub gone, nothing to unregister");
        }
    }

    /// Publish an event, waiting at most the configured publish timeout.
    ///
    /// A timeout is logged and the event dropped.
    pub async fn publish(&self, event: HubEvent) -> Result<(), RealtimeError> {
        let kind = event.kind();
        match self
            .relay_tx
            .send_timeout(event, self.shared.config.publish_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                error!(event = %kind, "Timeout waiting for websocket hub, event dropped");
                Err(RealtimeError::PublishTimeout(kind.to_string()))
            }
            Err(SendTimeoutError::Closed(_)) => Err(RealtimeError::HubStopped),
        }
    }

    /// Publish events in order from a background task so the caller never
    /// waits on the hub.
    pub fn publish_detached(&self, events: Vec<HubEvent>) {
        let handle = self.clone();
        tokio::spawn(async move {
            for event in events {
                if let Err(e) = handle.publish(event).await {
                    debug!(error = %e, "Detached publish failed");
                }
            }
        });
    }

    /// Signal shutdown. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping websocket hub");
        }
        self.shutdown.cancel();
    }

    /// Wait until the hub loop has fully stopped.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An error means the hub was dropped, which is stopped too.
        let _ = state.wait_for(|s| *s == HubState::Stopped).await;
    }

    /// Token cancelled when the hub shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }

    /// Number of registered clients.
    pub fn connection_count(&self) -> usize {
        self.shared.num_clients.load(Ordering::Acquire)
    }

    /// Whether the explorer finished its initial sync.
    pub fn ready(&self) -> bool {
        self.shared.ready.load(Ordering::Relaxed)
    }

    /// Update the ready flag.
    pub fn set_ready(&self, ready: bool) {
        self.shared.ready.store(ready, Ordering::Relaxed);
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Get hub statistics.
    pub fn stats(&self) -> HubStats {
        let mut stats = self.shared.stats.read().clone();
        stats.current_connections = self.connection_count();
        stats
    }
}
