//! The `run` command: wire the managers together and persist their state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use elessar_api::BridgeClient;
use elessar_config::SavedState;
use elessar_core::{BeaconManager, BridgeManager, Orchestrator};

use crate::ble::BleScanner;
use crate::commands::Context;
use crate::error::CliError;
use crate::mdns::MdnsBrowser;

type Daemon = Orchestrator<BleScanner, MdnsBrowser>;

const SWEEP_QUEUE: usize = 8;

pub async fn run(ctx: &Context) -> Result<(), CliError> {
    let decoded = ctx.load_decoded()?;

    let scanner = BleScanner::new().await?;
    let browser = MdnsBrowser::new(&ctx.settings.discovery_service)?;
    let template = BridgeClient::new(&ctx.settings.transport())?;

    let beacons = Arc::new(BeaconManager::new(scanner));
    beacons.set_scan_period(decoded.scan_period);
    beacons.set_tracked(decoded.beacons);

    let bridges = Arc::new(BridgeManager::new(browser, template));
    bridges.load_bridges(decoded.bridges).await;

    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&beacons), Arc::clone(&bridges)));
    orchestrator.set_force_override(decoded.force_lights_state);

    let cancel = CancellationToken::new();
    let (sweep_tx, sweep_rx) = mpsc::channel(SWEEP_QUEUE);

    let handles = [
        bridges.start(cancel.child_token())?,
        orchestrator.start(cancel.child_token(), sweep_rx),
        beacons.start(cancel.child_token(), sweep_tx),
        spawn_persistence(Arc::clone(&orchestrator), ctx.state_path.clone(), cancel.child_token()),
    ];

    info!(
        tracked_beacons = beacons.tracked().len(),
        tracked_bridges = bridges.bridge_states().await.len(),
        scan_period = ?beacons.scan_period(),
        "presence daemon running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c, shutting down");
    }
    info!("shutting down");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "task ended abnormally");
        }
    }
    if let Err(e) = bridges.stop() {
        warn!(error = %e, "failed to stop discovery");
    }

    save(&orchestrator, &ctx.state_path).await;
    Ok(())
}

/// Write the state file whenever any manager records a mutation.
fn spawn_persistence(
    orchestrator: Arc<Daemon>,
    path: PathBuf,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut beacon_rev = orchestrator.beacons().revision();
    let mut bridge_rev = orchestrator.bridges().revision();
    let mut orch_rev = orchestrator.revision();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                r = beacon_rev.changed() => if r.is_err() { break },
                r = bridge_rev.changed() => if r.is_err() { break },
                r = orch_rev.changed() => if r.is_err() { break },
            }
            beacon_rev.mark_unchanged();
            bridge_rev.mark_unchanged();
            orch_rev.mark_unchanged();
            save(&orchestrator, &path).await;
        }
        debug!("persistence task stopped");
    })
}

async fn save(orchestrator: &Daemon, path: &std::path::Path) {
    let beacons = orchestrator.beacons();
    let state = SavedState::capture(
        beacons.scan_period(),
        orchestrator.force_override(),
        beacons.tracked_states(),
        orchestrator.bridges().bridge_states().await,
    );
    match elessar_config::save_state(path, &state) {
        Ok(()) => debug!(path = %path.display(), "state saved"),
        Err(e) => warn!(error = %e, path = %path.display(), "failed to save state"),
    }
}
