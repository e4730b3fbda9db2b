//! Bridge discovery listing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use elessar_api::BridgeClient;
use elessar_core::BridgeManager;

use crate::cli::DiscoverArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::mdns::MdnsBrowser;
use crate::output;

#[derive(Serialize)]
struct BridgeView {
    id: String,
    name: String,
    address: String,
    tracked: bool,
}

#[derive(Tabled)]
struct BridgeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Tracked")]
    tracked: String,
}

impl From<&BridgeView> for BridgeRow {
    fn from(v: &BridgeView) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone(),
            address: v.address.clone(),
            tracked: if v.tracked { "yes" } else { "" }.into(),
        }
    }
}

/// Start discovery and give it `wait` to settle.
pub async fn browse(
    ctx: &Context,
    wait: Duration,
    cancel: &CancellationToken,
) -> Result<Arc<BridgeManager<MdnsBrowser>>, CliError> {
    let browser = MdnsBrowser::new(&ctx.settings.discovery_service)?;
    let template = BridgeClient::new(&ctx.settings.transport())?;
    let bridges = Arc::new(BridgeManager::new(browser, template));
    // The loop ends with `cancel`; nothing waits on it.
    let _discovery = bridges.start(cancel.child_token())?;
    tokio::time::sleep(wait).await;
    Ok(bridges)
}

pub async fn handle(ctx: &Context, args: DiscoverArgs) -> Result<(), CliError> {
    let decoded = ctx.load_decoded()?;
    let cancel = CancellationToken::new();
    let bridges = browse(ctx, Duration::from_secs(args.wait), &cancel).await?;

    let available = bridges.available_bridges().await;
    let addresses = bridges.resolved_addresses();
    cancel.cancel();
    bridges.stop()?;

    let mut views: Vec<BridgeView> = available
        .into_iter()
        .map(|(id, name)| BridgeView {
            address: addresses.get(&id).cloned().unwrap_or_default(),
            tracked: decoded.bridges.iter().any(|b| b.id == id),
            id,
            name,
        })
        .collect();
    views.sort_by(|a, b| a.id.cmp(&b.id));

    let out = output::render_list(&ctx.output, &views, |v| BridgeRow::from(v), |v| v.id.clone());
    output::print_output(&out, ctx.quiet);
    Ok(())
}
