//! Wire protocol spoken on the websocket.
//!
//! Every frame in both directions is a JSON object
//! `{"event_id": "...", "message": "..."}`. Replies to a request carry the
//! request's `event_id` with a `Resp` suffix; pushes carry the event kind name.

use crate::error::RealtimeError;
use crate::event::EventKind;
use serde::{Deserialize, Serialize};

/// Default maximum length of an inbound message body.
pub const MAX_PAYLOAD_BYTES: usize = 1 << 20;

/// Suffix appended to a request's event id in its reply.
pub const RESPONSE_SUFFIX: &str = "Resp";

/// Reply text for a rejected subscription.
pub const INVALID_SUBSCRIPTION: &str = "invalid subscription";

/// Reply text for an oversized request.
pub const REQUEST_TOO_LARGE: &str = "Request too large";

/// Event id of the reply to a frame that is not valid JSON.
pub const INVALID_REQUEST_EVENT: &str = "invalidResp";

/// One websocket frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketMessage {
    /// Request name, `<request>Resp` for replies, or the pushed event kind.
    pub event_id: String,
    /// Request argument or response/push payload.
    #[serde(default)]
    pub message: String,
}

impl WebSocketMessage {
    /// Create a frame.
    pub fn new(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            message: message.into(),
        }
    }

    /// Create a push for an event kind.
    pub fn push(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(kind.as_str(), message)
    }

    /// Create the reply to this request.
    pub fn reply(&self, message: impl Into<String>) -> Self {
        Self::new(format!("{}{}", self.event_id, RESPONSE_SUFFIX), message)
    }

    /// Parse a frame from text.
    pub fn from_json(text: &str) -> Result<Self, RealtimeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the frame.
    pub fn to_json(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The parsed request, if the event id names one.
    pub fn request(&self) -> Option<RequestKind> {
        RequestKind::from_name(&self.event_id)
    }
}

/// Requests a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Add a subscription.
    Subscribe,
    /// Remove a subscription.
    Unsubscribe,
    /// Decode a hex transaction.
    DecodeTx,
    /// Broadcast a hex transaction.
    SendTx,
    /// Fetch the full mempool summary.
    GetMempoolTxs,
    /// Keepalive; never answered.
    Ping,
}

impl RequestKind {
    /// Name used as `event_id`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Subscribe => "subscribe",
            RequestKind::Unsubscribe => "unsubscribe",
            RequestKind::DecodeTx => "decodetx",
            RequestKind::SendTx => "sendtx",
            RequestKind::GetMempoolTxs => "getmempooltxs",
            RequestKind::Ping => "ping",
        }
    }

    /// Parse a request name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "subscribe" => Some(RequestKind::Subscribe),
            "unsubscribe" => Some(RequestKind::Unsubscribe),
            "decodetx" => Some(RequestKind::DecodeTx),
            "sendtx" => Some(RequestKind::SendTx),
            "getmempooltxs" => Some(RequestKind::GetMempoolTxs),
            "ping" => Some(RequestKind::Ping),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shorten a client-supplied string for logging.
pub(crate) fn truncate_for_log(s: &str) -> &str {
    const MAX: usize = 40;
    if s.len() <= MAX {
        return s;
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
