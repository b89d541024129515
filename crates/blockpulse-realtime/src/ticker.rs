//! Periodic flush scheduler for buffered mempool transactions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default interval between transaction buffer flushes.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(3);

/// Capacity of the ticker's control channel.
const CONTROL_CHANNEL_SIZE: usize = 5;

/// Control signals understood by the ticker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerSignal {
    /// Restart the interval from now.
    Reset,
    /// End the ticker task.
    Stop,
}

/// Timer task raising a "time to flush" flag on a fixed cadence.
///
/// The hub reads and clears the flag; the task itself never touches hub
/// state.
#[derive(Debug)]
pub struct FlushTicker {
    control: mpsc::Sender<TickerSignal>,
    flush_due: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FlushTicker {
    /// Start the ticker on the current runtime.
    pub fn spawn(interval: Duration) -> Self {
        let (control, control_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let flush_due = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run(interval, flush_due.clone(), control_rx));
        Self {
            control,
            flush_due,
            task,
        }
    }

    /// Whether the interval elapsed since the last flush.
    pub fn time_to_flush(&self) -> bool {
        self.flush_due.load(Ordering::Acquire)
    }

    /// Mark the buffers as just flushed.
    pub fn clear(&self) {
        self.flush_due.store(false, Ordering::Release);
    }

    /// Restart the interval. Never blocks; a pending reset already covers a
    /// dropped one.
    pub fn reset(&self) {
        match self.control.try_send(TickerSignal::Reset) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Flush ticker reset already pending"),
            Err(TrySendError::Closed(_)) => debug!("Flush ticker already stopped"),
        }
    }

    /// Stop the ticker and wait for its task to end.
    pub async fn stop(self) {
        // Dropping the sender also ends the task if the queue is full.
        let _ = self.control.try_send(TickerSignal::Stop);
        drop(self.control);
        let _ = self.task.await;
    }
}

async fn run(
    interval: Duration,
    flush_due: Arc<AtomicBool>,
    mut control: mpsc::Receiver<TickerSignal>,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_due.store(true, Ordering::Release);
            }
            signal = control.recv() => match signal {
                Some(TickerSignal::Reset) => ticker.reset(),
                Some(TickerSignal::Stop) | None => {
                    debug!("Flush ticker stopped");
                    return;
                }
            },
        }
    }
}
