//! Subscription management for hub events.

use crate::error::RealtimeError;
use crate::event::{EventKind, HubEvent};
use blockpulse_types::AddressMessage;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Maximum addresses a single client may watch.
pub const MAX_SUBSCRIBED_ADDRESSES: usize = 100;

/// Prefix of per-address subscription strings.
const ADDRESS_PREFIX: &str = "address:";

/// A parsed `subscribe`/`unsubscribe` argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionRequest {
    /// Kind being (un)subscribed.
    pub kind: EventKind,
    /// Address filter, present only for address activity.
    pub filter: Option<AddressMessage>,
}

impl SubscriptionRequest {
    /// Subscription to an unfiltered kind.
    pub fn kind(kind: EventKind) -> Self {
        Self { kind, filter: None }
    }

    /// Subscription to activity on one address.
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            kind: EventKind::AddressTx,
            filter: Some(AddressMessage::filter(address)),
        }
    }

    /// Parse a subscription string.
    ///
    /// Formats:
    /// - `newblock`, `newtxs`, `mempool`, `ping`, `syncstatus`
    /// - `address:<address>` - transactions touching one address
    pub fn parse(s: &str) -> Result<Self, RealtimeError> {
        if let Some(address) = s.strip_prefix(ADDRESS_PREFIX) {
            let request = Self::address(address);
            if !request.is_valid() {
                return Err(RealtimeError::MalformedFilterPayload(
                    EventKind::AddressTx.to_string(),
                ));
            }
            return Ok(request);
        }

        let kind = EventKind::from_name(s)
            .filter(EventKind::is_subscribable)
            .ok_or_else(|| RealtimeError::InvalidSubscription(s.to_string()))?;

        if kind.requires_filter() {
            return Err(RealtimeError::MalformedFilterPayload(kind.to_string()));
        }

        Ok(Self::kind(kind))
    }

    /// Whether the request names a subscribable kind with the filter it needs.
    pub fn is_valid(&self) -> bool {
        if !self.kind.is_subscribable() {
            return false;
        }
        if self.kind.requires_filter() {
            return self.filter.as_ref().is_some_and(AddressMessage::is_valid);
        }
        true
    }
}

impl fmt::Display for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{}{}", ADDRESS_PREFIX, filter.address),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

/// Manages subscriptions for a single client.
#[derive(Debug, Default)]
pub struct ClientSubscriptions {
    /// Subscribed event kinds.
    kinds: HashSet<EventKind>,
    /// Watched addresses, consulted only for address activity.
    addresses: HashSet<String>,
}

impl ClientSubscriptions {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a kind, with the filter required by address activity.
    ///
    /// Returns whether anything changed.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        filter: Option<&AddressMessage>,
    ) -> Result<bool, RealtimeError> {
        if !kind.is_subscribable() {
            return Err(RealtimeError::InvalidSubscription(kind.to_string()));
        }

        if !kind.requires_filter() {
            return Ok(self.kinds.insert(kind));
        }

        let address = Self::filter_address(kind, filter)?;
        if self.addresses.contains(address) {
            return Ok(false);
        }
        if self.addresses.len() >= MAX_SUBSCRIBED_ADDRESSES {
            return Err(RealtimeError::SubscriptionLimit(MAX_SUBSCRIBED_ADDRESSES));
        }

        self.addresses.insert(address.to_string());
        self.kinds.insert(kind);
        Ok(true)
    }

    /// Unsubscribe from a kind, or from one address of address activity.
    ///
    /// Address activity stays subscribed while other addresses remain.
    /// Returns whether anything changed.
    pub fn unsubscribe(
        &mut self,
        kind: EventKind,
        filter: Option<&AddressMessage>,
    ) -> Result<bool, RealtimeError> {
        if !kind.requires_filter() {
            return Ok(self.kinds.remove(&kind));
        }

        let address = Self::filter_address(kind, filter)?;
        let removed = self.addresses.remove(address);
        if self.addresses.is_empty() {
            self.kinds.remove(&kind);
        }
        Ok(removed)
    }

    /// Apply a parsed subscribe request.
    pub fn subscribe_request(
        &mut self,
        request: &SubscriptionRequest,
    ) -> Result<bool, RealtimeError> {
        self.subscribe(request.kind, request.filter.as_ref())
    }

    /// Apply a parsed unsubscribe request.
    pub fn unsubscribe_request(
        &mut self,
        request: &SubscriptionRequest,
    ) -> Result<bool, RealtimeError> {
        self.unsubscribe(request.kind, request.filter.as_ref())
    }

    /// Clear all subscriptions.
    pub fn unsubscribe_all(&mut self) {
        self.kinds.clear();
        self.addresses.clear();
    }

    /// Check whether an event should be delivered.
    pub fn is_subscribed(&self, event: &HubEvent) -> bool {
        if !self.kinds.contains(&event.kind()) {
            return false;
        }

        match event {
            HubEvent::AddressTx(msg) => {
                if !msg.is_valid() {
                    warn!(address = %msg.address, "Malformed address event payload");
                    return false;
                }
                self.addresses.contains(&msg.address)
            }
            _ => true,
        }
    }

    /// Check whether a kind is subscribed, ignoring filters.
    pub fn has_kind(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Get subscribed kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.kinds.iter()
    }

    /// Number of kinds plus watched addresses.
    pub fn count(&self) -> usize {
        let unfiltered = self
            .kinds
            .iter()
            .filter(|kind| !kind.requires_filter())
            .count();
        unfiltered + self.addresses.len()
    }

    fn filter_address(
        kind: EventKind,
        filter: Option<&AddressMessage>,
    ) -> Result<&str, RealtimeError> {
        match filter {
            Some(msg) if msg.is_valid() => Ok(msg.address.as_str()),
            _ => Err(RealtimeError::MalformedFilterPayload(kind.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn address_event(address: &str) -> HubEvent {
        HubEvent::AddressTx(AddressMessage::new(address, "deadbeef"))
    }

    #[test]
    fn test_parse_kinds() {
        for name in ["newblock", "newtxs", "mempool", "ping", "syncstatus"] {
            let request = SubscriptionRequest::parse(name).unwrap();
            assert_eq!(request.kind.as_str(), name);
            assert!(request.filter.is_none());
            assert_eq!(request.to_string(), name);
        }
    }

    #[test]
    fn test_parse_address() {
        let request = SubscriptionRequest::parse("address:DsAddr1").unwrap();
        assert_eq!(request.kind, EventKind::AddressTx);
        assert_eq!(request.filter.as_ref().unwrap().address, "DsAddr1");
        assert_eq!(request.to_string(), "address:DsAddr1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            SubscriptionRequest::parse("blocks"),
            Err(RealtimeError::InvalidSubscription(_))
        ));
        assert!(matches!(
            SubscriptionRequest::parse("newtx"),
            Err(RealtimeError::InvalidSubscription(_))
        ));
        assert!(matches!(
            SubscriptionRequest::parse("subscribe"),
            Err(RealtimeError::InvalidSubscription(_))
        ));
        assert!(matches!(
            SubscriptionRequest::parse("address"),
            Err(RealtimeError::MalformedFilterPayload(_))
        ));
        assert!(matches!(
            SubscriptionRequest::parse("address:"),
            Err(RealtimeError::MalformedFilterPayload(_))
        ));
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut subs = ClientSubscriptions::new();

        assert!(subs.subscribe(EventKind::NewBlock, None).unwrap());
        assert!(subs.is_subscribed(&HubEvent::NewBlock));
        assert!(!subs.is_subscribed(&HubEvent::MempoolUpdate));

        // Duplicate subscription changes nothing.
        assert!(!subs.subscribe(EventKind::NewBlock, None).unwrap());
        assert_eq!(subs.count(), 1);

        assert!(subs.unsubscribe(EventKind::NewBlock, None).unwrap());
        assert!(!subs.is_subscribed(&HubEvent::NewBlock));

        // Unsubscribing again is a no-op success.
        assert!(!subs.unsubscribe(EventKind::NewBlock, None).unwrap());
    }

    #[test]
    fn test_address_subscription_requires_filter() {
        let mut subs = ClientSubscriptions::new();

        assert!(matches!(
            subs.subscribe(EventKind::AddressTx, None),
            Err(RealtimeError::MalformedFilterPayload(_))
        ));
        assert!(matches!(
            subs.subscribe(EventKind::AddressTx, Some(&AddressMessage::filter(""))),
            Err(RealtimeError::MalformedFilterPayload(_))
        ));
        assert!(!subs.has_kind(EventKind::AddressTx));
        assert_eq!(subs.count(), 0);
    }

    #[test]
    fn test_unsubscribe_one_address_keeps_others() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe_request(&SubscriptionRequest::address("A1"))
            .unwrap();
        subs.subscribe_request(&SubscriptionRequest::address("A2"))
            .unwrap();

        subs.unsubscribe_request(&SubscriptionRequest::address("A1"))
            .unwrap();
        assert!(!subs.is_subscribed(&address_event("A1")));
        assert!(subs.is_subscribed(&address_event("A2")));

        subs.unsubscribe_request(&SubscriptionRequest::address("A2"))
            .unwrap();
        assert!(!subs.has_kind(EventKind::AddressTx));
    }

    #[test]
    fn test_subscription_limit() {
        let mut subs = ClientSubscriptions::new();

        for i in 0..MAX_SUBSCRIBED_ADDRESSES {
            subs.subscribe_request(&SubscriptionRequest::address(format!("addr{i}")))
                .unwrap();
        }

        // Already watched addresses stay idempotent at the limit.
        assert!(!subs
            .subscribe_request(&SubscriptionRequest::address("addr0"))
            .unwrap());
        assert!(matches!(
            subs.subscribe_request(&SubscriptionRequest::address("extra")),
            Err(RealtimeError::SubscriptionLimit(_))
        ));
    }

    #[test]
    fn test_malformed_address_event_not_subscribed() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe_request(&SubscriptionRequest::address("A1"))
            .unwrap();
        let malformed = HubEvent::AddressTx(AddressMessage::new("", "ab"));
        assert!(!subs.is_subscribed(&malformed));
    }

    #[test]
    fn test_unsubscribe_all() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(EventKind::NewBlock, None).unwrap();
        subs.subscribe_request(&SubscriptionRequest::address("A1"))
            .unwrap();
        assert_eq!(subs.count(), 2);

        subs.unsubscribe_all();
        assert_eq!(subs.count(), 0);
        assert!(!subs.is_subscribed(&address_event("A1")));
    }

    fn kind_strategy() -> impl Strategy<Value = EventKind> {
        prop_oneof![
            Just(EventKind::NewBlock),
            Just(EventKind::NewTxs),
            Just(EventKind::MempoolUpdate),
            Just(EventKind::PingAndUserCount),
            Just(EventKind::SyncStatus),
        ]
    }

    proptest! {
        /// Property: subscribing twice leaves the same state as subscribing once
        #[test]
        fn prop_subscribe_idempotent(kinds in prop::collection::vec(kind_strategy(), 0..10)) {
            let mut once = ClientSubscriptions::new();
            let mut twice = ClientSubscriptions::new();
            for kind in &kinds {
                once.subscribe(*kind, None).unwrap();
                twice.subscribe(*kind, None).unwrap();
                twice.subscribe(*kind, None).unwrap();
            }
            let a: HashSet<_> = once.kinds().copied().collect();
            let b: HashSet<_> = twice.kinds().copied().collect();
            prop_assert_eq!(a, b);
        }

        /// Property: unsubscribing from anything never subscribed succeeds as a no-op
        #[test]
        fn prop_unsubscribe_unknown_is_noop(kind in kind_strategy(), addr in "[A-Za-z0-9]{1,35}") {
            let mut subs = ClientSubscriptions::new();
            prop_assert!(!subs.unsubscribe(kind, None).unwrap());
            prop_assert!(!subs.unsubscribe_request(&SubscriptionRequest::address(addr)).unwrap());
            prop_assert_eq!(subs.count(), 0);
        }

        /// Property: address events match only the watched address
        #[test]
        fn prop_address_filter(a in "[A-Za-z0-9]{1,35}", b in "[A-Za-z0-9]{1,35}") {
            let mut subs = ClientSubscriptions::new();
            subs.subscribe_request(&SubscriptionRequest::address(a.clone())).unwrap();
            prop_assert!(subs.is_subscribed(&address_event(&a)));
            prop_assert_eq!(subs.is_subscribed(&address_event(&b)), a == b);
        }
    }
}
