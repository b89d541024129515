//! Per-client buffer of pending mempool transactions.

use blockpulse_types::MempoolTx;
use parking_lot::Mutex;

/// Default number of buffered transactions that triggers a flush.
pub const NEW_TX_BUFFER_SIZE: usize = 5;

/// Ordered buffer of transactions awaiting a coalesced `newtxs` push.
///
/// The hub appends while the client's send pump drains, so both sides go
/// through the lock.
#[derive(Debug)]
pub struct TxBuffer {
    capacity: usize,
    txs: Mutex<Vec<MempoolTx>>,
}

impl TxBuffer {
    /// Creates an empty buffer that reports ready at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            txs: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Appends a transaction. Returns true once the buffer holds at least
    /// `capacity` entries.
    pub fn append(&self, tx: MempoolTx) -> bool {
        let mut txs = self.txs.lock();
        txs.push(tx);
        txs.len() >= self.capacity
    }

    /// Takes everything buffered so far, leaving the buffer empty.
    pub fn drain_and_reset(&self) -> Vec<MempoolTx> {
        let mut txs = self.txs.lock();
        std::mem::replace(&mut *txs, Vec::with_capacity(self.capacity))
    }

    /// Number of buffered transactions.
    pub fn len(&self) -> usize {
        self.txs.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush threshold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new(NEW_TX_BUFFER_SIZE)
    }
}
