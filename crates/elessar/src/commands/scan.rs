//! One-shot beacon scan.

use std::time::Duration;

use elessar_core::BeaconManager;

use crate::ble::BleScanner;
use crate::cli::ScanArgs;
use crate::commands::Context;
use crate::commands::beacons::{BeaconView, print_beacons};
use crate::error::CliError;

pub async fn handle(ctx: &Context, args: ScanArgs) -> Result<(), CliError> {
    let mut state = ctx.load_state()?;
    let decoded = ctx.load_decoded()?;

    let beacons = BeaconManager::new(BleScanner::new().await?);
    beacons.set_tracked(decoded.beacons);
    beacons.set_scan_period(args.window.map_or(decoded.scan_period, Duration::from_secs));

    let report = beacons.sweep().await?;
    tracing::info!(available = report.available, present = report.present, "scan complete");

    if !args.track.is_empty() {
        beacons.track_ids(&args.track)?;
        state.beacons = beacons
            .tracked_states()
            .into_iter()
            .map(serde_json::Value::Object)
            .collect();
        ctx.save_state(&state)?;
    }

    let tracked = beacons.tracked();
    let available = beacons.available_beacons();
    let mut views: Vec<BeaconView> = available
        .values()
        .map(|b| BeaconView::new(b, tracked.contains_key(&b.id())))
        .collect();
    views.sort_by(|a, b| a.id.cmp(&b.id));
    print_beacons(ctx, &views);
    Ok(())
}
