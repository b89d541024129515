//! Chain-aware publisher in front of the websocket hub.
//!
//! [`PubSubHub`] keeps the latest block and the derived home page figures,
//! turns chain activity into hub events, answers client requests and renders
//! the payload of each pushed event.

use crate::client::Client;
use crate::error::RealtimeError;
use crate::event::HubEvent;
use crate::hub::HubHandle;
use crate::protocol::{truncate_for_log, RequestKind, WebSocketMessage, INVALID_SUBSCRIPTION};
use crate::source::DataSource;
use crate::subscription::SubscriptionRequest;
use blockpulse_types::{
    AddressMessage, BlockData, BlockSummary, HomeInfo, MempoolTx, SyncProgress, WebsocketBlock,
    NUM_LATEST_MEMPOOL_TXNS,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Latest chain state shown to clients.
#[derive(Debug)]
struct ChainState {
    block: Option<BlockSummary>,
    home: HomeInfo,
}

/// Publisher and request handler shared by all connections.
pub struct PubSubHub {
    hub: HubHandle,
    source: Arc<dyn DataSource>,
    state: RwLock<ChainState>,
}

impl std::fmt::Debug for PubSubHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubHub")
            .field("hub", &self.hub)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PubSubHub {
    /// Create a publisher on top of a running hub.
    pub fn new(hub: HubHandle, source: Arc<dyn DataSource>) -> Self {
        let home = HomeInfo::new(source.chain_params());
        Self {
            hub,
            source,
            state: RwLock::new(ChainState { block: None, home }),
        }
    }

    /// The underlying hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// The chain data source.
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Latest block with home info, if a block was stored.
    pub fn latest_block(&self) -> Option<WebsocketBlock> {
        let state = self.state.read();
        state.block.as_ref().map(|block| WebsocketBlock {
            block: block.clone(),
            extra: state.home.clone(),
        })
    }

    /// Current home info.
    pub fn home_info(&self) -> HomeInfo {
        self.state.read().home.clone()
    }

    /// Record a new best block and signal it.
    ///
    /// Publishes [`HubEvent::NewBlock`] followed by one
    /// [`HubEvent::AddressTx`] per coinbase output address, from a background
    /// task so the caller never waits on the hub.
    pub fn store_block(&self, data: BlockData) {
        {
            let mut state = self.state.write();
            state.home.apply_block(&data, self.source.chain_params());
            state.block = Some(data.block.clone());
        }

        info!(
            height = data.block.height,
            hash = %data.block.hash,
            "Stored new block"
        );

        let mut events = Vec::with_capacity(1 + data.coinbase_addresses.len());
        events.push(HubEvent::NewBlock);
        if !data.coinbase_hash.is_empty() {
            events.extend(data.coinbase_addresses.iter().map(|address| {
                let message = AddressMessage::new(address.clone(), data.coinbase_hash.clone());
                HubEvent::AddressTx(message)
            }));
        }
        self.hub.publish_detached(events);
    }

    /// Signal a transaction entering the mempool.
    pub async fn publish_new_tx(&self, tx: MempoolTx) -> Result<(), RealtimeError> {
        trace!(hash = %tx.hash, "Publishing new mempool tx");
        self.hub.publish(HubEvent::NewTx(tx)).await
    }

    /// Signal a refreshed mempool inventory.
    pub async fn publish_mempool_refresh(&self) -> Result<(), RealtimeError> {
        self.hub.publish(HubEvent::MempoolUpdate).await
    }

    /// Signal activity on an address.
    pub async fn publish_address_activity(
        &self,
        message: AddressMessage,
    ) -> Result<(), RealtimeError> {
        self.hub.publish(HubEvent::AddressTx(message)).await
    }

    /// Signal sync progress.
    pub async fn publish_sync_status(
        &self,
        progress: Vec<SyncProgress>,
    ) -> Result<(), RealtimeError> {
        self.hub.publish(HubEvent::SyncStatus(progress)).await
    }

    /// Answer one client request. Returns `None` for requests that get no
    /// reply: pings and unknown event ids.
    pub async fn handle_request(
        &self,
        client: &Client,
        request: &WebSocketMessage,
    ) -> Option<WebSocketMessage> {
        let Some(kind) = request.request() else {
            warn!(
                client_id = %client.id,
                event_id = %truncate_for_log(&request.event_id),
                "Unrecognized event ID"
            );
            return None;
        };

        let message = match kind {
            RequestKind::Subscribe => self.subscribe(client, &request.message),
            RequestKind::Unsubscribe => self.unsubscribe(client, &request.message),
            RequestKind::DecodeTx => self.decode_tx(&request.message).await,
            RequestKind::SendTx => self.send_tx(&request.message).await,
            RequestKind::GetMempoolTxs => self.mempool_txs(),
            RequestKind::Ping => {
                trace!(client_id = %client.id, "Pinged by client");
                return None;
            }
        };

        Some(request.reply(message))
    }

    fn subscribe(&self, client: &Client, message: &str) -> String {
        match SubscriptionRequest::parse(message).and_then(|request| client.subscribe(&request)) {
            Ok(_) => {
                debug!(client_id = %client.id, subscription = %message, "Client subscribed");
                format!("{message} subscribe ok")
            }
            Err(e) => {
                debug!(
                    client_id = %client.id,
                    error = %e,
                    "Invalid subscribe request: {}",
                    truncate_for_log(message)
                );
                INVALID_SUBSCRIPTION.to_string()
            }
        }
    }

    fn unsubscribe(&self, client: &Client, message: &str) -> String {
        match SubscriptionRequest::parse(message).and_then(|request| client.unsubscribe(&request)) {
            Ok(_) => {
                debug!(client_id = %client.id, subscription = %message, "Client unsubscribed");
                format!("{message} unsubscribe ok")
            }
            Err(e) => {
                debug!(
                    client_id = %client.id,
                    error = %e,
                    "Invalid unsubscribe request: {}",
                    truncate_for_log(message)
                );
                INVALID_SUBSCRIPTION.to_string()
            }
        }
    }

    async fn decode_tx(&self, hex: &str) -> String {
        debug!("Received decodetx request for hex: {}", truncate_for_log(hex));
        match self.source.decode_raw_transaction(hex).await {
            Ok(tx) => serde_json::to_string_pretty(&tx).unwrap_or_else(|e| {
                warn!(error = %e, "Could not encode decoded transaction");
                "Error: Could not encode JSON message".to_string()
            }),
            Err(e) => {
                debug!(error = %e, "Could not decode raw tx");
                format!("Error: {e}")
            }
        }
    }

    async fn send_tx(&self, hex: &str) -> String {
        debug!("Received sendtx request for hex: {}", truncate_for_log(hex));
        match self.source.send_raw_transaction(hex).await {
            Ok(txid) => format!("Transaction sent: {txid}"),
            Err(e) => format!("Error: {e}"),
        }
    }

    fn mempool_txs(&self) -> String {
        let mut summary = self.source.mempool_summary().unwrap_or_default();
        summary.subsidy = Some(self.state.read().home.next_block_subsidy);
        serde_json::to_string(&summary).unwrap_or_else(|e| {
            warn!(error = %e, "Could not encode mempool summary");
            "Error: Could not encode JSON message".to_string()
        })
    }

    /// Render the push for an event delivered to `client`.
    ///
    /// Returns `None` when nothing should be written, such as a `newtxs`
    /// signal finding this client's buffer already empty.
    pub fn render_event(&self, client: &Client, event: &HubEvent) -> Option<WebSocketMessage> {
        let message = match event {
            HubEvent::NewBlock => match self.latest_block() {
                Some(block) => encode(&block)?,
                None => String::new(),
            },
            HubEvent::MempoolUpdate => match self.source.mempool_summary() {
                Some(summary) => encode(&summary.short(NUM_LATEST_MEMPOOL_TXNS))?,
                None => String::new(),
            },
            HubEvent::PingAndUserCount => self.hub.connection_count().to_string(),
            HubEvent::NewTxs => {
                let txs = client.drain_txs();
                if txs.is_empty() {
                    return None;
                }
                encode(&txs)?
            }
            HubEvent::AddressTx(message) => encode(message)?,
            HubEvent::SyncStatus(progress) => encode(progress)?,
            HubEvent::NewTx(_) | HubEvent::Subscribe(_) | HubEvent::Unsubscribe(_) => {
                error!(client_id = %client.id, event = %event, "Not sending event to the client");
                return None;
            }
        };

        Some(WebSocketMessage::push(event.kind(), message))
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(error = %e, "Failed to encode push payload");
            None
        }
    }
}
