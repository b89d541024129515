//! Hub event types.

use crate::error::RealtimeError;
use crate::subscription::SubscriptionRequest;
use blockpulse_types::{AddressMessage, MempoolTx, SyncProgress};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`HubEvent`].
///
/// The string form is the `event_id` used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Client request to add a subscription.
    Subscribe,
    /// Client request to drop a subscription.
    Unsubscribe,
    /// A block was connected.
    NewBlock,
    /// The mempool inventory was refreshed.
    #[serde(rename = "mempool")]
    MempoolUpdate,
    /// Heartbeat carrying the connected client count.
    #[serde(rename = "ping")]
    PingAndUserCount,
    /// One transaction entered the mempool.
    NewTx,
    /// Buffered transactions are ready to send.
    NewTxs,
    /// A watched address was involved in a transaction.
    #[serde(rename = "address")]
    AddressTx,
    /// Initial sync progress.
    SyncStatus,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 9] = [
        EventKind::Subscribe,
        EventKind::Unsubscribe,
        EventKind::NewBlock,
        EventKind::MempoolUpdate,
        EventKind::PingAndUserCount,
        EventKind::NewTx,
        EventKind::NewTxs,
        EventKind::AddressTx,
        EventKind::SyncStatus,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Subscribe => "subscribe",
            EventKind::Unsubscribe => "unsubscribe",
            EventKind::NewBlock => "newblock",
            EventKind::MempoolUpdate => "mempool",
            EventKind::PingAndUserCount => "ping",
            EventKind::NewTx => "newtx",
            EventKind::NewTxs => "newtxs",
            EventKind::AddressTx => "address",
            EventKind::SyncStatus => "syncstatus",
        }
    }

    /// Looks up a kind by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether clients may subscribe to this kind.
    ///
    /// Single transactions are only ever delivered batched as `newtxs`.
    pub fn is_subscribable(&self) -> bool {
        !matches!(
            self,
            EventKind::Subscribe | EventKind::Unsubscribe | EventKind::NewTx
        )
    }

    /// Whether subscriptions to this kind carry a filter.
    pub fn requires_filter(&self) -> bool {
        matches!(self, EventKind::AddressTx)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event flowing through the hub.
///
/// Each variant carries exactly the payload its kind needs.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A block was connected; clients read the latest block state.
    NewBlock,
    /// The mempool inventory was refreshed.
    MempoolUpdate,
    /// Heartbeat; clients receive the connected client count.
    PingAndUserCount,
    /// One transaction entered the mempool.
    NewTx(MempoolTx),
    /// Each client's transaction buffer is ready to flush.
    NewTxs,
    /// A watched address was involved in a transaction.
    AddressTx(AddressMessage),
    /// Initial sync progress.
    SyncStatus(Vec<SyncProgress>),
    /// Subscription request. Never valid on the broadcast channel.
    Subscribe(SubscriptionRequest),
    /// Unsubscription request. Never valid on the broadcast channel.
    Unsubscribe(SubscriptionRequest),
}

impl HubEvent {
    /// Kind of the event.
    pub fn kind(&self) -> EventKind {
        match self {
            HubEvent::NewBlock => EventKind::NewBlock,
            HubEvent::MempoolUpdate => EventKind::MempoolUpdate,
            HubEvent::PingAndUserCount => EventKind::PingAndUserCount,
            HubEvent::NewTx(_) => EventKind::NewTx,
            HubEvent::NewTxs => EventKind::NewTxs,
            HubEvent::AddressTx(_) => EventKind::AddressTx,
            HubEvent::SyncStatus(_) => EventKind::SyncStatus,
            HubEvent::Subscribe(_) => EventKind::Subscribe,
            HubEvent::Unsubscribe(_) => EventKind::Unsubscribe,
        }
    }

    /// Checks that the payload is well formed for the kind.
    pub fn validate(&self) -> Result<(), RealtimeError> {
        let valid = match self {
            HubEvent::NewTx(tx) => tx.is_valid(),
            HubEvent::AddressTx(msg) => msg.is_valid() && !msg.tx_hash.is_empty(),
            HubEvent::Subscribe(req) | HubEvent::Unsubscribe(req) => req.is_valid(),
            HubEvent::NewBlock
            | HubEvent::MempoolUpdate
            | HubEvent::PingAndUserCount
            | HubEvent::NewTxs
            | HubEvent::SyncStatus(_) => true,
        };
        if valid {
            Ok(())
        } else {
            Err(RealtimeError::MalformedEvent(self.kind().to_string()))
        }
    }

    /// Shorthand for [`HubEvent::validate`].
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubEvent::NewTx(tx) => write!(f, "newtx({})", tx.hash),
            HubEvent::AddressTx(msg) => write!(f, "address({}, {})", msg.address, msg.tx_hash),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("blocks"), None);
    }

    #[test]
    fn test_kind_serde_matches_wire_name() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_subscribable_kinds() {
        assert!(EventKind::NewBlock.is_subscribable());
        assert!(EventKind::NewTxs.is_subscribable());
        assert!(!EventKind::NewTx.is_subscribable());
        assert!(!EventKind::Subscribe.is_subscribable());
    }

    #[test]
    fn test_event_validation() {
        assert!(HubEvent::NewBlock.is_valid());
        assert!(HubEvent::AddressTx(AddressMessage::new("DsAddr", "ab")).is_valid());
        assert!(!HubEvent::AddressTx(AddressMessage::new("", "ab")).is_valid());
        assert!(!HubEvent::AddressTx(AddressMessage::filter("DsAddr")).is_valid());
        assert!(!HubEvent::NewTx(MempoolTx::default()).is_valid());

        let err = HubEvent::NewTx(MempoolTx::default()).validate().unwrap_err();
        assert!(matches!(err, RealtimeError::MalformedEvent(kind) if kind == "newtx"));
    }

    #[test]
    fn test_event_display() {
        let tx = MempoolTx {
            hash: "abcd".to_string(),
            ..Default::default()
        };
        assert_eq!(HubEvent::NewTx(tx).to_string(), "newtx(abcd)");
        assert_eq!(HubEvent::NewBlock.to_string(), "newblock");
    }
}
