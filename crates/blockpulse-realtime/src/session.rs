//! Per-connection send and receive pumps.
//!
//! A session registers a client with the hub, then runs two loops over the
//! same transport until either one ends:
//!
//! - the receive loop answers client requests,
//! - the send loop writes pushed events from the client's delivery channel.
//!
//! The transport is any text [`Stream`] plus [`Sink`] pair, so the pumps are
//! independent of the websocket library.

use crate::client::{Client, ClientMetadata, ClientReceiver};
use crate::error::RealtimeError;
use crate::protocol::{
    truncate_for_log, WebSocketMessage, INVALID_REQUEST_EVENT, MAX_PAYLOAD_BYTES, REQUEST_TOO_LARGE,
};
use crate::pubsub::PubSubHub;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Default rolling read deadline.
pub const READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Default write deadline.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest accepted request message.
    pub max_request_bytes: usize,
    /// Idle period after which the receive loop re-arms its read.
    pub read_timeout: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: MAX_PAYLOAD_BYTES,
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

/// An inbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying one JSON message.
    Text(String),
    /// The peer closed the connection.
    Close,
    /// Binary and control frames; ignored.
    Control,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    Disconnected,
    /// Reading from the transport failed.
    ReceiveFailed,
    /// Writing to the transport failed or timed out.
    WriteFailed,
    /// The hub closed the delivery channel.
    ChannelClosed,
    /// The hub is shutting down.
    Shutdown,
}

impl SessionEnd {
    /// Whether the hub still holds the client and must be told to drop it.
    fn needs_unregister(self) -> bool {
        matches!(
            self,
            SessionEnd::Disconnected | SessionEnd::ReceiveFailed | SessionEnd::WriteFailed
        )
    }
}

type SharedSink<K> = Mutex<Pin<Box<K>>>;

/// Serve one connection until it closes or the hub stops.
///
/// Registers a client, runs both pumps, and on return has cleared the
/// client's subscriptions, unregistered it and closed the sink.
pub async fn serve_connection<S, K, E>(
    pubsub: &PubSubHub,
    metadata: ClientMetadata,
    stream: S,
    sink: K,
    config: &SessionConfig,
) -> Result<SessionEnd, RealtimeError>
where
    S: Stream<Item = Result<Frame, E>> + Send,
    E: Display,
    K: Sink<String> + Send,
    K::Error: Display,
{
    let hub = pubsub.hub();
    let (client, events) = hub.register(metadata).await?;
    debug!(client_id = %client.id, "Websocket client connected");

    let stream = Box::pin(stream);
    let sink: SharedSink<K> = Mutex::new(Box::pin(sink));
    let shutdown = hub.shutdown_token();

    let end = tokio::select! {
        end = receive_loop(pubsub, &client, stream, &sink, config) => end,
        end = send_loop(pubsub, &client, events, &sink, config, &shutdown) => end,
    };

    client.unsubscribe_all();
    if end.needs_unregister() {
        hub.unregister(&client.id);
    }

    let mut sink = sink.lock().await;
    match timeout(config.write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(client_id = %client.id, error = %e, "Failed to close websocket"),
        Err(_) => trace!(client_id = %client.id, "Timed out closing websocket"),
    }

    debug!(client_id = %client.id, reason = ?end, "Websocket client disconnected");
    Ok(end)
}

async fn receive_loop<S, E, K>(
    pubsub: &PubSubHub,
    client: &Client,
    mut stream: Pin<Box<S>>,
    sink: &SharedSink<K>,
    config: &SessionConfig,
) -> SessionEnd
where
    S: Stream<Item = Result<Frame, E>>,
    E: Display,
    K: Sink<String>,
    K::Error: Display,
{
    loop {
        let frame = match timeout(config.read_timeout, stream.next()).await {
            // Idle client; keep waiting.
            Err(_) => continue,
            Ok(None) => return SessionEnd::Disconnected,
            Ok(Some(Err(e))) => {
                debug!(client_id = %client.id, error = %e, "Websocket receive error");
                return SessionEnd::ReceiveFailed;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Close => return SessionEnd::Disconnected,
            Frame::Control => continue,
        };

        let reply = match WebSocketMessage::from_json(&text) {
            Ok(request) if request.message.len() > config.max_request_bytes => {
                debug!(
                    client_id = %client.id,
                    size = request.message.len(),
                    "Request size over limit"
                );
                Some(request.reply(REQUEST_TOO_LARGE))
            }
            Ok(request) => pubsub.handle_request(client, &request).await,
            Err(e) => {
                debug!(
                    client_id = %client.id,
                    error = %e,
                    "Malformed request: {}",
                    truncate_for_log(&text)
                );
                Some(WebSocketMessage::new(INVALID_REQUEST_EVENT, format!("Error: {e}")))
            }
        };

        if let Some(reply) = reply {
            if !write_frame(client, sink, &reply, config.write_timeout).await {
                return SessionEnd::WriteFailed;
            }
        }
    }
}

async fn send_loop<K>(
    pubsub: &PubSubHub,
    client: &Client,
    mut events: ClientReceiver,
    sink: &SharedSink<K>,
    config: &SessionConfig,
    shutdown: &CancellationToken,
) -> SessionEnd
where
    K: Sink<String>,
    K::Error: Display,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return SessionEnd::Shutdown,
            event = events.recv() => match event {
                Some(event) => event,
                None => return SessionEnd::ChannelClosed,
            },
        };

        if !client.is_subscribed(&event) {
            error!(
                client_id = %client.id,
                event = %event.kind(),
                "Client not subscribed to delivered event"
            );
            continue;
        }

        let Some(push) = pubsub.render_event(client, &event) else {
            continue;
        };

        trace!(client_id = %client.id, event = %push.event_id, "Signaling client");
        if !write_frame(client, sink, &push, config.write_timeout).await {
            return SessionEnd::WriteFailed;
        }
    }
}

/// Write one frame under the write deadline. Returns false when the
/// connection should be considered gone.
async fn write_frame<K>(
    client: &Client,
    sink: &SharedSink<K>,
    frame: &WebSocketMessage,
    write_timeout: Duration,
) -> bool
where
    K: Sink<String>,
    K::Error: Display,
{
    let text = match frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!(client_id = %client.id, error = %e, "Failed to encode websocket message");
            return true;
        }
    };

    let mut sink = sink.lock().await;
    match timeout(write_timeout, sink.send(text)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(
                client_id = %client.id,
                event = %frame.event_id,
                error = %e,
                "Websocket send failed"
            );
            false
        }
        Err(_) => {
            debug!(client_id = %client.id, event = %frame.event_id, "Websocket write timed out");
            false
        }
    }
}
