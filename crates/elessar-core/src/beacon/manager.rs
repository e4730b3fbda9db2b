// ── Beacon manager ──
//
// Owns the periodic scan sweep. Available beacons are rebuilt from
// scratch each cycle; tracked beacons only change through explicit
// configuration, though a sweep refreshes their display metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::matcher::match_advertisement;
use super::{Beacon, BeaconId};
use crate::error::CoreError;
use crate::revision::Revision;
use crate::scanner::AdvertisementScanner;

/// Default sweep interval.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(3);

type BeaconMap = HashMap<BeaconId, Beacon>;

/// Outcome of one completed sweep, sent every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Beacons heard this cycle.
    pub available: usize,
    /// Tracked beacons heard this cycle.
    pub tracked_present: usize,
    /// At least one tracked beacon was heard.
    pub present: bool,
}

/// Periodic scanner bookkeeping over an [`AdvertisementScanner`].
pub struct BeaconManager<S> {
    scanner: S,
    available: ArcSwap<BeaconMap>,
    tracked: ArcSwap<BeaconMap>,
    scan_period_ms: AtomicU64,
    revision: Revision,
}

impl<S: AdvertisementScanner> BeaconManager<S> {
    pub fn new(scanner: S) -> Self {
        Self {
            scanner,
            available: ArcSwap::from_pointee(HashMap::new()),
            tracked: ArcSwap::from_pointee(HashMap::new()),
            scan_period_ms: AtomicU64::new(duration_ms(DEFAULT_SCAN_PERIOD)),
            revision: Revision::new(),
        }
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    // ── Configuration ────────────────────────────────────────────────

    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms.load(Ordering::Relaxed))
    }

    /// Takes effect from the next sweep.
    pub fn set_scan_period(&self, period: Duration) {
        let ms = duration_ms(period);
        if self.scan_period_ms.swap(ms, Ordering::Relaxed) != ms {
            self.revision.bump();
        }
    }

    /// Replace the tracked set.
    pub fn set_tracked(&self, beacons: impl IntoIterator<Item = Beacon>) {
        let tracked: BeaconMap = beacons.into_iter().map(|b| (b.id(), b)).collect();
        info!(count = tracked.len(), "tracked beacons updated");
        self.tracked.store(Arc::new(tracked));
        self.revision.bump();
    }

    /// Replace the tracked set from user-supplied ids.
    ///
    /// Each id resolves against the tracked set, then the available set,
    /// then falls back to [`Beacon::from_persisted_id`]. Nothing changes
    /// if any id fails to parse.
    pub fn track_ids<I, T>(&self, ids: I) -> Result<Vec<BeaconId>, CoreError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let tracked = self.tracked.load();
        let available = self.available.load();
        let lookup = |map: &BeaconMap, raw: &str| {
            map.iter()
                .find(|(id, _)| id.as_str() == raw)
                .map(|(_, b)| b.clone())
        };

        let beacons = ids
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                lookup(&tracked, raw)
                    .or_else(|| lookup(&available, raw))
                    .map_or_else(|| Beacon::from_persisted_id(raw), Ok)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ids = beacons.iter().map(Beacon::id).collect();
        self.set_tracked(beacons);
        Ok(ids)
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Beacons heard during the last completed sweep.
    pub fn available_beacons(&self) -> Arc<HashMap<BeaconId, Beacon>> {
        self.available.load_full()
    }

    pub fn tracked(&self) -> Arc<HashMap<BeaconId, Beacon>> {
        self.tracked.load_full()
    }

    pub fn has_tracked(&self) -> bool {
        !self.tracked.load().is_empty()
    }

    /// A tracked beacon was heard during the last completed sweep.
    pub fn has_active_presence(&self) -> bool {
        let tracked = self.tracked.load();
        let available = self.available.load();
        tracked.keys().any(|id| available.contains_key(id))
    }

    /// Serialized tracked beacons, ordered by id.
    pub fn tracked_states(&self) -> Vec<Map<String, Value>> {
        let tracked = self.tracked.load();
        let mut beacons: Vec<&Beacon> = tracked.values().collect();
        beacons.sort_by_key(|b| b.id());
        beacons.into_iter().map(Beacon::to_state).collect()
    }

    // ── Decoding ─────────────────────────────────────────────────────

    pub fn from_persisted_id(&self, raw: &str) -> Result<Beacon, CoreError> {
        Beacon::from_persisted_id(raw)
    }

    pub fn from_serialized_state(&self, state: &Map<String, Value>) -> Result<Beacon, CoreError> {
        Beacon::from_state(state)
    }

    /// Mutations of persisted state (tracked set, scan period).
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ── Sweep ────────────────────────────────────────────────────────

    /// Run one scan window and rebuild the available set.
    ///
    /// A scanner that cannot start or cannot report what it heard leaves
    /// all state untouched and returns the error.
    pub async fn sweep(&self) -> Result<SweepReport, CoreError> {
        self.scanner.start().await?;
        tokio::time::sleep(self.scan_period()).await;

        // A failed read says nothing about presence; keep the last sweep.
        let advertisements = match self.scanner.advertisements().await {
            Ok(advertisements) => advertisements,
            Err(e) => {
                self.stop_scanner().await;
                return Err(e);
            }
        };

        let mut available = BeaconMap::new();
        for adv in &advertisements {
            for beacon in match_advertisement(adv) {
                debug!(beacon = %beacon.id(), name = %beacon.name(), "beacon seen");
                available.insert(beacon.id(), beacon);
            }
        }

        let tracked_present = self.refresh_tracked(&available);
        let report = SweepReport {
            available: available.len(),
            tracked_present,
            present: tracked_present > 0,
        };
        self.available.store(Arc::new(available));
        self.stop_scanner().await;

        debug!(
            advertisements = advertisements.len(),
            available = report.available,
            tracked_present,
            "sweep complete"
        );
        Ok(report)
    }

    async fn stop_scanner(&self) {
        if let Err(e) = self.scanner.stop().await {
            warn!(error = %e, "stopping scan failed");
        }
    }

    /// Swap in fresh objects for tracked beacons seen this sweep.
    fn refresh_tracked(&self, available: &BeaconMap) -> usize {
        let current = self.tracked.load();
        let seen = current.keys().filter(|id| available.contains_key(*id)).count();
        if seen > 0 {
            self.tracked.rcu(|tracked| {
                let mut next = BeaconMap::clone(tracked);
                for (id, beacon) in &mut next {
                    if let Some(fresh) = available.get(id) {
                        beacon.clone_from(fresh);
                    }
                }
                next
            });
        }
        seen
    }

    /// Sweep until cancelled, sending a report after every cycle.
    ///
    /// Cancellation is checked between sweeps; a sweep in progress
    /// always completes.
    pub async fn run(&self, cancel: CancellationToken, reports: mpsc::Sender<SweepReport>) {
        while !cancel.is_cancelled() {
            match self.sweep().await {
                Ok(report) => {
                    if reports.send(report).await.is_err() {
                        debug!("sweep receiver closed, stopping");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "scan sweep failed");
                    tokio::time::sleep(self.scan_period()).await;
                }
            }
        }
        debug!("beacon sweep loop stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
        reports: mpsc::Sender<SweepReport>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(cancel, reports).await })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
