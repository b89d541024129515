//! Client connection management.

use crate::buffer::TxBuffer;
use crate::error::RealtimeError;
use crate::event::{EventKind, HubEvent};
use crate::subscription::{ClientSubscriptions, SubscriptionRequest};
use blockpulse_types::MempoolTx;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique identifier for a connected client.
pub type ClientId = String;

/// Default capacity of a client's delivery channel.
pub const CLIENT_QUEUE_SIZE: usize = 16;

/// Hub-side sender feeding one client's send pump.
pub type ClientSender = mpsc::Sender<HubEvent>;

/// Handle for receiving events from the hub to send to the WebSocket.
pub type ClientReceiver = mpsc::Receiver<HubEvent>;

/// Server-side state of one connected subscriber.
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier.
    pub id: ClientId,
    /// Client's subscriptions.
    subscriptions: RwLock<ClientSubscriptions>,
    /// Transactions waiting for the next `newtxs` push.
    new_txs: TxBuffer,
    /// Connection metadata.
    pub metadata: ClientMetadata,
}

impl Client {
    /// Create a new client whose buffer flushes at `tx_buffer_size` entries.
    pub fn new(id: ClientId, tx_buffer_size: usize, metadata: ClientMetadata) -> Self {
        Self {
            id,
            subscriptions: RwLock::new(ClientSubscriptions::new()),
            new_txs: TxBuffer::new(tx_buffer_size),
            metadata,
        }
    }

    /// Subscribe to a parsed request.
    pub fn subscribe(&self, request: &SubscriptionRequest) -> Result<bool, RealtimeError> {
        self.subscriptions.write().subscribe_request(request)
    }

    /// Unsubscribe from a parsed request.
    pub fn unsubscribe(&self, request: &SubscriptionRequest) -> Result<bool, RealtimeError> {
        self.subscriptions.write().unsubscribe_request(request)
    }

    /// Clear all subscriptions.
    pub fn unsubscribe_all(&self) {
        self.subscriptions.write().unsubscribe_all();
    }

    /// Check if an event should reach this client.
    pub fn is_subscribed(&self, event: &HubEvent) -> bool {
        self.subscriptions.read().is_subscribed(event)
    }

    /// Check if a kind is subscribed regardless of filters.
    pub fn has_kind(&self, kind: EventKind) -> bool {
        self.subscriptions.read().has_kind(kind)
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().count()
    }

    /// Buffer a mempool transaction; true once the buffer is ready to flush.
    pub fn buffer_tx(&self, tx: MempoolTx) -> bool {
        self.new_txs.append(tx)
    }

    /// Take the buffered transactions.
    pub fn drain_txs(&self) -> Vec<MempoolTx> {
        self.new_txs.drain_and_reset()
    }

    /// Number of buffered transactions.
    pub fn pending_txs(&self) -> usize {
        self.new_txs.len()
    }
}

/// Metadata about a client connection.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    /// When the client connected (Unix timestamp).
    pub connected_at: u64,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// User agent string.
    pub user_agent: Option<String>,
}

impl ClientMetadata {
    /// Create metadata with current timestamp.
    pub fn now() -> Self {
        Self {
            connected_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            ip_address: None,
            user_agent: None,
        }
    }
}

/// Create a new client with its delivery channel.
pub fn create_client(
    tx_buffer_size: usize,
    queue_size: usize,
    metadata: ClientMetadata,
) -> (Arc<Client>, ClientSender, ClientReceiver) {
    let id = uuid::Uuid::new_v4().to_string();
    let (sender, receiver) = mpsc::channel(queue_size.max(1));
    let client = Arc::new(Client::new(id, tx_buffer_size, metadata));
    (client, sender, receiver)
}
