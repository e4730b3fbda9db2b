//! Tracked beacon editing.

use serde::Serialize;
use tabled::Tabled;

use elessar_core::Beacon;

use crate::cli::BeaconsArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
pub struct BeaconView {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub tracked: bool,
}

impl BeaconView {
    pub fn new(beacon: &Beacon, tracked: bool) -> Self {
        Self {
            id: beacon.id().to_string(),
            name: beacon.name(),
            vendor: beacon.vendor().to_string(),
            tracked,
        }
    }
}

#[derive(Tabled)]
pub struct BeaconRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Tracked")]
    tracked: String,
}

impl From<&BeaconView> for BeaconRow {
    fn from(v: &BeaconView) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone(),
            vendor: v.vendor.clone(),
            tracked: if v.tracked { "yes" } else { "" }.into(),
        }
    }
}

pub fn print_beacons(ctx: &Context, views: &[BeaconView]) {
    let out = output::render_list(&ctx.output, views, |v| BeaconRow::from(v), |v| v.id.clone());
    output::print_output(&out, ctx.quiet);
}

pub fn handle(ctx: &Context, args: BeaconsArgs) -> Result<(), CliError> {
    let mut state = ctx.load_state()?;
    let decoded = state.decode();

    if args.clear || !args.ids.is_empty() {
        // Keep stored metadata (advertised names) for ids already tracked.
        let beacons = args
            .ids
            .iter()
            .map(|raw| {
                decoded
                    .beacons
                    .iter()
                    .find(|b| b.id().as_str() == raw)
                    .cloned()
                    .map_or_else(|| Beacon::from_persisted_id(raw), Ok)
            })
            .collect::<Result<Vec<_>, _>>()?;

        state.beacons = beacons
            .iter()
            .map(|b| serde_json::Value::Object(b.to_state()))
            .collect();
        ctx.save_state(&state)?;
        tracing::info!(count = beacons.len(), "tracked beacons saved");

        let views: Vec<BeaconView> = beacons.iter().map(|b| BeaconView::new(b, true)).collect();
        print_beacons(ctx, &views);
        return Ok(());
    }

    let views: Vec<BeaconView> = decoded
        .beacons
        .iter()
        .map(|b| BeaconView::new(b, true))
        .collect();
    print_beacons(ctx, &views);
    Ok(())
}
