//! # Blockpulse Real-time
//!
//! Real-time WebSocket pub/sub for a UTXO block explorer.
//!
//! Connected web clients subscribe to chain activity (new blocks, mempool
//! refreshes, batches of new mempool transactions, activity on watched
//! addresses, sync progress) and receive pushes as it happens.
//!
//! ## Features
//!
//! - **Websocket Hub**: One task owning every client registration
//! - **Subscriptions**: Per-kind and per-address subscriptions
//! - **Backpressure**: Slow clients are dropped instead of stalling the hub
//! - **Transaction Batching**: Mempool transactions are coalesced per client
//! - **Heartbeat**: Periodic ping carrying the connected client count
//!
//! ## Subscriptions
//!
//! - `newblock` - A new block was connected
//! - `mempool` - Mempool summary with the latest transactions
//! - `newtxs` - Batches of new mempool transactions
//! - `ping` - Heartbeat with the number of connected clients
//! - `syncstatus` - Initial sync progress
//! - `address:<address>` - Transactions involving one address
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockpulse_realtime::{HubConfig, PubSubHub, WebsocketHub};
//! # use blockpulse_realtime::DataSource;
//! # use std::sync::Arc;
//! # async fn example(source: Arc<dyn DataSource>) {
//!
//! // Start the hub loop
//! let hub = WebsocketHub::spawn(HubConfig::default());
//!
//! // Put the chain-aware publisher in front of it
//! let pubsub = PubSubHub::new(hub.clone(), source);
//!
//! // Announce mempool activity
//! pubsub.publish_mempool_refresh().await.ok();
//!
//! // Shut down
//! hub.stop();
//! hub.stopped().await;
//! # }
//! ```
//!
//! ## WebSocket Protocol
//!
//! Every frame is `{"event_id": "...", "message": "..."}`.
//!
//! ### Client -> Server Messages
//!
//! ```json
//! // Subscribe
//! {"event_id": "subscribe", "message": "address:DsExampleAddress"}
//!
//! // Unsubscribe
//! {"event_id": "unsubscribe", "message": "newblock"}
//!
//! // Decode or broadcast a raw transaction
//! {"event_id": "decodetx", "message": "0100000001..."}
//! {"event_id": "sendtx", "message": "0100000001..."}
//!
//! // Full mempool summary
//! {"event_id": "getmempooltxs", "message": ""}
//!
//! // Keepalive, never answered
//! {"event_id": "ping", "message": ""}
//! ```
//!
//! ### Server -> Client Messages
//!
//! ```json
//! // Reply to a request
//! {"event_id": "subscribeResp", "message": "address:DsExampleAddress subscribe ok"}
//!
//! // Pushed event
//! {"event_id": "address", "message": "{\"address\":\"DsExampleAddress\",\"txHash\":\"...\"}"}
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  producers ──publish──┐        ┌── FlushTicker (flush flag)
//!  heartbeat ───────────┤        │
//!                       ▼        ▼
//! ┌─────────────────────────────────────────┐
//! │              WebsocketHub                │
//! │  ┌─────────────────────────────────┐    │
//! │  │         Client Registry          │    │
//! │  │  client_id -> Client            │    │
//! │  │    └─> subscriptions            │    │
//! │  │    └─> tx buffer                │    │
//! │  │    └─> delivery sender          │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────┬───────────────────────┘
//!                   │ try_send (evict when full)
//!                   ▼
//!         session send pump ──> websocket
//!         session receive pump <── websocket
//! ```

pub mod buffer;
pub mod client;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod hub;
pub mod protocol;
pub mod pubsub;
pub mod session;
pub mod source;
pub mod subscription;
pub mod ticker;

// Re-export main types
pub use buffer::{TxBuffer, NEW_TX_BUFFER_SIZE};
pub use client::{Client, ClientId, ClientMetadata, ClientReceiver, CLIENT_QUEUE_SIZE};
pub use error::RealtimeError;
pub use event::{EventKind, HubEvent};
pub use heartbeat::PING_INTERVAL;
pub use hub::{HubConfig, HubHandle, HubState, HubStats, WebsocketHub, PUBLISH_TIMEOUT};
pub use protocol::{RequestKind, WebSocketMessage, MAX_PAYLOAD_BYTES};
pub use pubsub::PubSubHub;
pub use session::{serve_connection, Frame, SessionConfig, SessionEnd, READ_TIMEOUT, WRITE_TIMEOUT};
pub use source::DataSource;
pub use subscription::{ClientSubscriptions, SubscriptionRequest, MAX_SUBSCRIBED_ADDRESSES};
pub use ticker::FLUSH_INTERVAL;
