//! Periodic ping-and-count injection.

use crate::event::HubEvent;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default interval between heartbeats.
pub const PING_INTERVAL: Duration = Duration::from_secs(45);

/// Start the heartbeat task.
///
/// Every `interval` a [`HubEvent::PingAndUserCount`] is offered to the hub,
/// waiting at most `send_timeout`; a busy hub just skips that beat. The task
/// holds the relay weakly and ends when `shutdown` is cancelled, the hub
/// relay closes or every other sender is gone.
pub fn spawn_heartbeat(
    relay: mpsc::WeakSender<HubEvent>,
    interval: Duration,
    send_timeout: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(relay) = relay.upgrade() else {
                break;
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = relay.send_timeout(HubEvent::PingAndUserCount, send_timeout) => match sent {
                    Ok(()) => trace!("Heartbeat sent"),
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!("Websocket hub busy, skipping heartbeat");
                    }
                    Err(SendTimeoutError::Closed(_)) => break,
                },
            }
        }

        debug!("Heartbeat stopped");
    })
}
