// ── Bridge manager ──
//
// Follows service discovery, keeps a cache of bridge id → address, and
// owns the tracked bridges. The cache heals itself: an unreachable
// address clears it and triggers a fresh resolution pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use elessar_api::BridgeClient;
use futures_util::future::join_all;
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Bridge, BridgeState};
use crate::discovery::{DiscoveryEvent, ServiceBrowser};
use crate::error::CoreError;
use crate::revision::Revision;

/// Discovery cache plus the set of tracked bridges.
pub struct BridgeManager<B> {
    browser: B,
    /// Unconfigured client whose connection pool every bridge shares.
    template: BridgeClient,
    /// Service instance names seen by the browser.
    records: Mutex<BTreeSet<String>>,
    /// bridge id → address, replaced wholesale by each refresh.
    resolved: ArcSwap<HashMap<String, String>>,
    /// bridge id → service name it resolved from.
    services: ArcSwap<HashMap<String, String>>,
    refreshing: AtomicBool,
    refresh_again: AtomicBool,
    bridges: Mutex<BTreeMap<String, Bridge>>,
    revision: Revision,
}

impl<B: ServiceBrowser> BridgeManager<B> {
    pub fn new(browser: B, template: BridgeClient) -> Self {
        Self {
            browser,
            template,
            records: Mutex::new(BTreeSet::new()),
            resolved: ArcSwap::from_pointee(HashMap::new()),
            services: ArcSwap::from_pointee(HashMap::new()),
            refreshing: AtomicBool::new(false),
            refresh_again: AtomicBool::new(false),
            bridges: Mutex::new(BTreeMap::new()),
            revision: Revision::new(),
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    // ── Discovery ────────────────────────────────────────────────────

    async fn note_event(&self, event: &DiscoveryEvent) {
        let mut records = self.records.lock().await;
        match event {
            DiscoveryEvent::Added(name) | DiscoveryEvent::Updated(name) => {
                records.insert(name.clone());
            }
            DiscoveryEvent::Removed(name) => {
                records.remove(name);
            }
        }
        debug!(?event, known = records.len(), "discovery event");
    }

    /// Apply one discovery event and refresh the address cache.
    pub async fn handle_event(&self, event: &DiscoveryEvent) {
        self.note_event(event).await;
        self.refresh().await;
    }

    /// Re-resolve every known service record.
    ///
    /// Single-flight: while a refresh is running, further calls only ask
    /// it to go around once more and return immediately.
    pub async fn refresh(&self) {
        self.refresh_again.store(true, Ordering::Release);
        loop {
            if self.refreshing.swap(true, Ordering::AcqRel) {
                return;
            }
            while self.refresh_again.swap(false, Ordering::AcqRel) {
                self.refresh_once().await;
            }
            self.refreshing.store(false, Ordering::Release);
            if !self.refresh_again.load(Ordering::Acquire) {
                return;
            }
        }
    }

    async fn refresh_once(&self) {
        let names: Vec<String> = self.records.lock().await.iter().cloned().collect();
        let outcomes = join_all(names.iter().map(|name| self.browser.resolve(name))).await;

        let mut resolved = HashMap::new();
        let mut services = HashMap::new();
        let mut gone = Vec::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Ok(Some(record)) => match record.bridge_id() {
                    Some(bridge_id) => {
                        debug!(service = %name, %bridge_id, address = %record.address, "bridge resolved");
                        services.insert(bridge_id.clone(), name.clone());
                        resolved.insert(bridge_id, record.address);
                    }
                    None => warn!(service = %name, "service record has no usable bridgeid"),
                },
                Ok(None) => {
                    debug!(service = %name, "service no longer resolves");
                    gone.push(name);
                }
                Err(e) => {
                    warn!(service = %name, error = %e, "service resolution failed");
                    gone.push(name);
                }
            }
        }

        if !gone.is_empty() {
            let mut records = self.records.lock().await;
            for name in &gone {
                records.remove(name);
            }
        }
        self.resolved.store(Arc::new(resolved));
        self.services.store(Arc::new(services));
    }

    /// Clear the address cache and resolve everything again.
    pub async fn rediscover(&self) {
        info!("clearing bridge address cache");
        self.resolved.store(Arc::new(HashMap::new()));
        self.refresh().await;
    }

    /// Snapshot of bridge id → address.
    pub fn resolved_addresses(&self) -> Arc<HashMap<String, String>> {
        self.resolved.load_full()
    }

    pub fn get_address(&self, bridge_id: &str) -> Result<String, CoreError> {
        self.resolved
            .load()
            .get(bridge_id)
            .cloned()
            .ok_or_else(|| CoreError::BridgeNotResolved {
                bridge_id: bridge_id.to_owned(),
            })
    }

    /// Resolved bridges that answer a public config probe, as `{id → name}`.
    ///
    /// An unreachable address clears the cache and triggers
    /// [`rediscover`](Self::rediscover); that bridge is left out of this
    /// result and reappears once it resolves again.
    pub async fn available_bridges(&self) -> HashMap<String, String> {
        let resolved = self.resolved.load_full();
        let probes = join_all(resolved.iter().map(|(bridge_id, address)| async move {
            let client = self.template.sibling().at(address.clone());
            (bridge_id, client.get_public_config().await)
        }))
        .await;

        let mut available = HashMap::new();
        let mut stale = false;
        let services = self.services.load_full();
        for (bridge_id, probe) in probes {
            match probe {
                Ok(config) => {
                    available.insert(bridge_id.clone(), config.name);
                }
                Err(e) if e.invalidates_address() => {
                    warn!(bridge = %bridge_id, error = %e, "bridge unreachable at cached address");
                    if let (Some(name), Some(address)) =
                        (services.get(bridge_id), resolved.get(bridge_id))
                    {
                        self.browser.invalidate(name, address);
                    }
                    stale = true;
                }
                Err(e) => warn!(bridge = %bridge_id, error = %e, "bridge probe failed"),
            }
        }

        if stale {
            self.rediscover().await;
        }
        available
    }

    // ── Tracked bridges ──────────────────────────────────────────────

    /// Exclusive access to the tracked bridges.
    ///
    /// Call [`mark_changed`](Self::mark_changed) after mutating anything
    /// that is persisted.
    pub async fn lock_bridges(&self) -> MutexGuard<'_, BTreeMap<String, Bridge>> {
        self.bridges.lock().await
    }

    /// Record a mutation of persisted bridge state.
    pub fn mark_changed(&self) {
        self.revision.bump();
    }

    /// Mutations of persisted state (tracked set, groups, tokens, names).
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// A bridge with no token, sharing this manager's connection pool.
    pub fn new_bridge(&self, bridge_id: &str) -> Bridge {
        Bridge::new(bridge_id, self.template.sibling())
    }

    /// Replace the tracked set with persisted bridges.
    pub async fn load_bridges(&self, states: impl IntoIterator<Item = BridgeState>) {
        let loaded: BTreeMap<String, Bridge> = states
            .into_iter()
            .map(|state| {
                let bridge = Bridge::from_state(state, self.template.sibling());
                (bridge.id().to_owned(), bridge)
            })
            .collect();
        debug!(count = loaded.len(), "bridges loaded");
        *self.bridges.lock().await = loaded;
    }

    pub async fn bridge_states(&self) -> Vec<BridgeState> {
        self.bridges
            .lock()
            .await
            .values()
            .map(Bridge::to_state)
            .collect()
    }

    /// Start tracking a bridge. Returns `false` if it already was.
    pub async fn track_bridge(&self, bridge_id: &str) -> bool {
        let mut bridges = self.bridges.lock().await;
        if bridges.contains_key(bridge_id) {
            return false;
        }
        bridges.insert(bridge_id.to_owned(), self.new_bridge(bridge_id));
        info!(bridge = bridge_id, "bridge tracked");
        self.revision.bump();
        true
    }

    /// Stop tracking a bridge. Returns `false` if it wasn't tracked.
    pub async fn untrack_bridge(&self, bridge_id: &str) -> bool {
        let removed = self.bridges.lock().await.remove(bridge_id).is_some();
        if removed {
            info!(bridge = bridge_id, "bridge untracked");
            self.revision.bump();
        }
        removed
    }

    /// Replace the configured groups of a tracked bridge.
    pub async fn set_bridge_groups(
        &self,
        bridge_id: &str,
        group_ids: impl IntoIterator<Item = String>,
    ) -> Result<(), CoreError> {
        let mut bridges = self.bridges.lock().await;
        let bridge = bridges
            .get_mut(bridge_id)
            .ok_or_else(|| CoreError::BridgeNotTracked {
                bridge_id: bridge_id.to_owned(),
            })?;
        bridge.set_group_ids(group_ids);
        self.revision.bump();
        Ok(())
    }

    /// Connect a tracked bridge at its resolved address.
    ///
    /// Drives the pairing handshake: fails with a pending-pairing error
    /// until the link button is pressed.
    pub async fn connect_bridge(&self, bridge_id: &str) -> Result<(), CoreError> {
        let address = self.get_address(bridge_id)?;
        let mut bridges = self.bridges.lock().await;
        let bridge = bridges
            .get_mut(bridge_id)
            .ok_or_else(|| CoreError::BridgeNotTracked {
                bridge_id: bridge_id.to_owned(),
            })?;

        let before = bridge.to_state();
        let result = bridge.connect(Some(address), None).await;
        if bridge.to_state() != before {
            self.revision.bump();
        }
        result
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Consume discovery events until cancelled.
    ///
    /// Each event spawns a refresh; the single-flight guard folds bursts
    /// into at most one extra pass.
    pub async fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut events: mpsc::Receiver<DiscoveryEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.note_event(&event).await;
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.refresh().await });
                }
            }
        }
        debug!("discovery loop stopped");
    }

    /// Start browsing and spawn [`run`](Self::run).
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<()>, CoreError> {
        let events = self.browser.browse()?;
        Ok(tokio::spawn(Arc::clone(self).run(cancel, events)))
    }

    /// Stop browsing.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.browser.shutdown()
    }
}
