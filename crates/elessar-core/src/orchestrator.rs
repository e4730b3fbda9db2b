// ── Orchestrator ──
//
// Turns the per-sweep presence signal into lighting commands. The latch
// remembers the last fully successful command so a stable signal doesn't
// resend it every sweep; any partial failure resets it to `Unknown` so the
// next sweep retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::beacon::manager::{BeaconManager, SweepReport};
use crate::bridge::Bridge;
use crate::bridge::manager::BridgeManager;
use crate::discovery::ServiceBrowser;
use crate::revision::Revision;
use crate::scanner::AdvertisementScanner;

/// Last confirmed lighting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LightsLatch {
    On,
    Off,
    #[default]
    Unknown,
}

impl From<bool> for LightsLatch {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl LightsLatch {
    /// `true` if the latch already confirms `desired`.
    pub fn matches(self, desired: bool) -> bool {
        self == Self::from(desired)
    }
}

/// What one reconciliation round did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// No beacons are tracked.
    Skipped,
    /// The latch already matched.
    Debounced { desired: bool },
    /// Commands were sent. `remaining` counts tracked bridges that did
    /// not confirm.
    Dispatched { desired: bool, remaining: usize },
}

/// Presence-driven reconciliation over all tracked bridges.
pub struct Orchestrator<S, B> {
    beacons: Arc<BeaconManager<S>>,
    bridges: Arc<BridgeManager<B>>,
    latch: watch::Sender<LightsLatch>,
    force_override: AtomicBool,
    revision: Revision,
}

impl<S: AdvertisementScanner, B: ServiceBrowser> Orchestrator<S, B> {
    pub fn new(beacons: Arc<BeaconManager<S>>, bridges: Arc<BridgeManager<B>>) -> Self {
        let (latch, _) = watch::channel(LightsLatch::Unknown);
        Self {
            beacons,
            bridges,
            latch,
            force_override: AtomicBool::new(false),
            revision: Revision::new(),
        }
    }

    pub fn beacons(&self) -> &Arc<BeaconManager<S>> {
        &self.beacons
    }

    pub fn bridges(&self) -> &Arc<BridgeManager<B>> {
        &self.bridges
    }

    pub fn latch(&self) -> LightsLatch {
        *self.latch.borrow()
    }

    pub fn subscribe_latch(&self) -> watch::Receiver<LightsLatch> {
        self.latch.subscribe()
    }

    pub fn force_override(&self) -> bool {
        self.force_override.load(Ordering::Relaxed)
    }

    /// When set, every round dispatches regardless of the latch.
    pub fn set_force_override(&self, force: bool) {
        if self.force_override.swap(force, Ordering::Relaxed) != force {
            self.revision.bump();
        }
    }

    /// Mutations of persisted state (force override).
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Run one round against the current presence state.
    pub async fn reconcile(&self) -> Reconciliation {
        if !self.beacons.has_tracked() {
            return Reconciliation::Skipped;
        }

        let desired = self.beacons.has_active_presence();
        let latch = self.latch();
        if !self.force_override() && latch.matches(desired) {
            debug!(desired, %latch, "lights already in desired state");
            return Reconciliation::Debounced { desired };
        }

        let remaining = self.dispatch(desired).await;
        let next = if remaining == 0 {
            LightsLatch::from(desired)
        } else {
            LightsLatch::Unknown
        };

        let previous = self.latch.send_replace(next);
        if previous == next {
            debug!(latch = %next, remaining, "dispatch round complete");
        } else {
            info!(from = %previous, to = %next, remaining, "lights latch changed");
        }
        Reconciliation::Dispatched { desired, remaining }
    }

    /// Send `desired` to every reachable tracked bridge.
    ///
    /// Returns how many tracked bridges did not confirm, counting the
    /// unreachable ones.
    async fn dispatch(&self, desired: bool) -> usize {
        let reachable = self.bridges.available_bridges().await;
        let mut tracked = self.bridges.lock_bridges().await;
        let total = tracked.len();

        let before: Vec<_> = tracked.values().map(Bridge::to_state).collect();
        let rounds = tracked
            .values_mut()
            .filter(|bridge| reachable.contains_key(bridge.id()))
            .map(|bridge| self.dispatch_to(bridge, desired));
        let confirmed = join_all(rounds).await.into_iter().filter(|ok| *ok).count();

        let after: Vec<_> = tracked.values().map(Bridge::to_state).collect();
        if after != before {
            self.bridges.mark_changed();
        }

        debug!(desired, total, confirmed, reachable = reachable.len(), "dispatch fan-in");
        total.saturating_sub(confirmed)
    }

    async fn dispatch_to(&self, bridge: &mut Bridge, desired: bool) -> bool {
        let address = match self.bridges.get_address(bridge.id()) {
            Ok(address) => address,
            Err(e) => {
                debug!(bridge = bridge.id(), error = %e, "bridge skipped");
                return false;
            }
        };

        if let Err(e) = bridge.ensure_connected(&address).await {
            if e.is_pairing_pending() {
                info!(bridge = bridge.id(), "bridge waiting for link button");
            } else {
                warn!(bridge = bridge.id(), error = %e, "bridge connection failed");
            }
            return false;
        }

        match bridge.set_groups_on(desired).await {
            Ok(report) => {
                if !report.is_complete() {
                    warn!(
                        bridge = bridge.id(),
                        failed = report.failed.len(),
                        succeeded = report.succeeded.len(),
                        "partial group dispatch"
                    );
                }
                report.is_complete()
            }
            Err(e) => {
                warn!(bridge = bridge.id(), error = %e, "group dispatch failed");
                false
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Reconcile after every sweep report until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, mut sweeps: mpsc::Receiver<SweepReport>) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                report = sweeps.recv() => {
                    let Some(report) = report else { break };
                    debug!(?report, "sweep report");
                    self.reconcile().await;
                }
            }
        }
        debug!("orchestrator stopped");
    }

    pub fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
        sweeps: mpsc::Receiver<SweepReport>,
    ) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(cancel, sweeps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_matches_only_confirmed_state() {
        assert!(LightsLatch::On.matches(true));
        assert!(!LightsLatch::On.matches(false));
        assert!(LightsLatch::Off.matches(false));
        assert!(!LightsLatch::Unknown.matches(true));
        assert!(!LightsLatch::Unknown.matches(false));
    }

    #[test]
    fn latch_displays_lowercase() {
        assert_eq!(LightsLatch::from(true).to_string(), "on");
        assert_eq!(LightsLatch::Unknown.to_string(), "unknown");
    }
}
