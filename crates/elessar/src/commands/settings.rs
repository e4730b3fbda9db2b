//! Persisted settings.

use serde::Serialize;

use crate::cli::{OutputFormat, SettingsArgs};
use crate::commands::Context;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct SettingsView<'a> {
    settings_file: String,
    state_file: String,
    scan_period: u64,
    force_lights_state: bool,
    tracked_beacons: usize,
    tracked_bridges: usize,
    app_name: &'a str,
    discovery_service: &'a str,
}

pub fn handle(ctx: &Context, args: SettingsArgs) -> Result<(), CliError> {
    if args.init {
        elessar_config::save_settings(&ctx.settings_path, &ctx.settings)
            .map_err(|e| CliError::config(e, &ctx.settings_path))?;
        tracing::info!(path = %ctx.settings_path.display(), "settings written");
    }

    let mut state = ctx.load_state()?;
    if args.scan_period.is_some() || args.force_lights_state.is_some() {
        if let Some(period) = args.scan_period {
            if period == 0 {
                return Err(CliError::Validation {
                    field: "scan_period".into(),
                    reason: "must be at least one second".into(),
                });
            }
            state.scan_period = period;
        }
        if let Some(force) = args.force_lights_state {
            state.force_lights_state = force;
        }
        ctx.save_state(&state)?;
    }

    let view = SettingsView {
        settings_file: ctx.settings_path.display().to_string(),
        state_file: ctx.state_path.display().to_string(),
        scan_period: state.scan_period,
        force_lights_state: state.force_lights_state,
        tracked_beacons: state.beacons.len(),
        tracked_bridges: state.bridges.len(),
        app_name: &ctx.settings.app_name,
        discovery_service: &ctx.settings.discovery_service,
    };

    let out = match ctx.output {
        OutputFormat::Json => output::render_json(&view),
        OutputFormat::Table | OutputFormat::Plain => [
            ("settings_file", view.settings_file.clone()),
            ("state_file", view.state_file.clone()),
            ("scan_period", view.scan_period.to_string()),
            ("force_lights_state", view.force_lights_state.to_string()),
            ("tracked_beacons", view.tracked_beacons.to_string()),
            ("tracked_bridges", view.tracked_bridges.to_string()),
            ("app_name", view.app_name.to_owned()),
            ("discovery_service", view.discovery_service.to_owned()),
        ]
        .iter()
        .map(|(k, v)| format!("{k} = {v}"))
        .collect::<Vec<_>>()
        .join("\n"),
    };
    output::print_output(&out, ctx.quiet);
    Ok(())
}
