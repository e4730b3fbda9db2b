//! Tracked bridge management.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use elessar_core::BridgeState;

use crate::cli::{BridgeArgs, BridgeCommand};
use crate::commands::Context;
use crate::commands::discover;
use crate::error::CliError;
use crate::output;

const PAIR_RETRY: Duration = Duration::from_secs(2);
const DISCOVERY_SETTLE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct TrackedBridgeView {
    id: String,
    name: Option<String>,
    groups: Vec<String>,
    paired: bool,
}

impl From<&BridgeState> for TrackedBridgeView {
    fn from(s: &BridgeState) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            groups: s.group_ids.clone(),
            paired: s.username.is_some(),
        }
    }
}

#[derive(Tabled)]
struct TrackedBridgeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Groups")]
    groups: String,
    #[tabled(rename = "Paired")]
    paired: String,
}

impl From<&TrackedBridgeView> for TrackedBridgeRow {
    fn from(v: &TrackedBridgeView) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone().unwrap_or_default(),
            groups: v.groups.join(","),
            paired: if v.paired { "yes" } else { "no" }.into(),
        }
    }
}

#[derive(Serialize)]
struct GroupView {
    id: String,
    name: String,
    selected: bool,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Selected")]
    selected: String,
}

impl From<&GroupView> for GroupRow {
    fn from(v: &GroupView) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone(),
            selected: if v.selected { "yes" } else { "" }.into(),
        }
    }
}

fn print_bridges(ctx: &Context, states: &[BridgeState]) {
    let views: Vec<TrackedBridgeView> = states.iter().map(TrackedBridgeView::from).collect();
    let out = output::render_list(&ctx.output, &views, |v| TrackedBridgeRow::from(v), |v| v.id.clone());
    output::print_output(&out, ctx.quiet);
}

fn write_bridges(ctx: &Context, states: &[BridgeState]) -> Result<(), CliError> {
    let mut state = ctx.load_state()?;
    state.bridges = states
        .iter()
        .filter_map(|b| serde_json::to_value(b).ok())
        .collect();
    ctx.save_state(&state)
}

fn not_tracked(id: &str) -> CliError {
    CliError::NotFound {
        resource_type: "bridge".into(),
        identifier: id.to_owned(),
        list_command: "bridge list".into(),
    }
}

pub async fn handle(ctx: &Context, args: BridgeArgs) -> Result<(), CliError> {
    let mut states = ctx.load_decoded()?.bridges;

    match args.command {
        BridgeCommand::List => {
            print_bridges(ctx, &states);
            Ok(())
        }

        BridgeCommand::Add { id, groups } => {
            if id.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "bridge id".into(),
                    reason: "must not be empty".into(),
                });
            }
            match states.iter_mut().find(|s| s.id == id) {
                Some(existing) if !groups.is_empty() => existing.group_ids = dedup(groups),
                Some(_) => {}
                None => states.push(BridgeState {
                    id: id.clone(),
                    group_ids: dedup(groups),
                    ..BridgeState::default()
                }),
            }
            write_bridges(ctx, &states)?;
            tracing::info!(bridge = %id, "bridge tracked");
            print_bridges(ctx, &states);
            Ok(())
        }

        BridgeCommand::Remove { id } => {
            let before = states.len();
            states.retain(|s| s.id != id);
            if states.len() == before {
                return Err(not_tracked(&id));
            }
            write_bridges(ctx, &states)?;
            tracing::info!(bridge = %id, "bridge untracked");
            print_bridges(ctx, &states);
            Ok(())
        }

        BridgeCommand::Groups { id, groups } => {
            let entry = states
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| not_tracked(&id))?;
            entry.group_ids = dedup(groups);
            write_bridges(ctx, &states)?;
            print_bridges(ctx, &states);
            Ok(())
        }

        BridgeCommand::Pair { id, timeout } => pair(ctx, states, &id, timeout).await,
    }
}

fn dedup(mut groups: Vec<String>) -> Vec<String> {
    groups.retain(|g| !g.trim().is_empty());
    groups.sort();
    groups.dedup();
    groups
}

async fn pair(
    ctx: &Context,
    states: Vec<BridgeState>,
    id: &str,
    timeout: u64,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let bridges = discover::browse(ctx, DISCOVERY_SETTLE, &cancel).await?;
    bridges.load_bridges(states).await;
    bridges.track_bridge(id).await;

    let deadline = Instant::now() + Duration::from_secs(timeout);
    let result = loop {
        match bridges.connect_bridge(id).await {
            Ok(()) => break Ok(()),
            Err(e) if e.is_pairing_pending() => {
                if !ctx.quiet {
                    eprintln!("Press the link button on bridge {id}...");
                }
            }
            // Not announced yet; keep browsing.
            Err(elessar_core::CoreError::BridgeNotResolved { .. }) => {}
            Err(e) => break Err(CliError::for_bridge(e, id)),
        }
        if Instant::now() >= deadline {
            break Err(CliError::Timeout {
                bridge_id: id.to_owned(),
                seconds: timeout,
            });
        }
        tokio::time::sleep(PAIR_RETRY).await;
    };

    // Keep whatever the attempts learned, even on failure.
    write_bridges(ctx, &bridges.bridge_states().await)?;
    cancel.cancel();
    bridges.stop()?;
    result?;

    let groups = {
        let tracked = bridges.lock_bridges().await;
        match tracked.get(id) {
            Some(bridge) => {
                let selected = bridge.group_ids().clone();
                bridge
                    .available_groups()
                    .await
                    .map_err(|e| CliError::for_bridge(e, id))?
                    .into_iter()
                    .map(|(gid, name)| GroupView {
                        selected: selected.contains(&gid),
                        id: gid,
                        name,
                    })
                    .collect::<Vec<_>>()
            }
            None => Vec::new(),
        }
    };

    let out = output::render_list(&ctx.output, &groups, |g| GroupRow::from(g), |g| g.id.clone());
    output::print_output(&out, ctx.quiet);
    Ok(())
}
