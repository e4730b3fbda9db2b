// ── Revision counter ──
//
// Bumped on every mutation of persisted state so a single consumer can
// write the state file back out.

use tokio::sync::watch;

/// Monotonic mutation counter with push-based change notification.
#[derive(Debug)]
pub struct Revision {
    tx: watch::Sender<u64>,
}

impl Revision {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0u64);
        Self { tx }
    }

    /// Record one mutation.
    pub fn bump(&self) {
        self.tx.send_modify(|v| *v += 1);
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Subscribe to mutations.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::new()
    }
}
