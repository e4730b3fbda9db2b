// ── Bridge ──
//
// One lighting bridge: its pairing token, its cached network address, and
// the user's selection of groups to drive. The address is never persisted;
// it always comes back through discovery.

pub mod manager;

use std::collections::{BTreeMap, BTreeSet};

use elessar_api::BridgeClient;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Persisted form of a [`Bridge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeState {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Per-group outcome of one [`Bridge::set_groups_on`] call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, elessar_api::Error)>,
    /// Configured groups the bridge no longer reports.
    pub dropped: Vec<String>,
}

impl DispatchReport {
    /// Every remaining group accepted the command.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A tracked lighting bridge.
#[derive(Debug)]
pub struct Bridge {
    id: String,
    display_name: Option<String>,
    group_ids: BTreeSet<String>,
    client: BridgeClient,
    verified: bool,
}

impl Bridge {
    /// An unpaired bridge. `client` should carry no address or token.
    pub fn new(id: impl Into<String>, client: BridgeClient) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            group_ids: BTreeSet::new(),
            client,
            verified: false,
        }
    }

    pub fn from_state(state: BridgeState, mut client: BridgeClient) -> Self {
        client.set_token(state.username);
        client.set_address(None);
        Self {
            id: state.id,
            display_name: state.name,
            group_ids: state.group_ids.into_iter().collect(),
            client,
            verified: false,
        }
    }

    pub fn to_state(&self) -> BridgeState {
        BridgeState {
            id: self.id.clone(),
            name: self.display_name.clone(),
            group_ids: self.group_ids.iter().cloned().collect(),
            username: self.client.token().map(str::to_owned),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn group_ids(&self) -> &BTreeSet<String> {
        &self.group_ids
    }

    pub fn set_group_ids(&mut self, group_ids: impl IntoIterator<Item = String>) {
        self.group_ids = group_ids.into_iter().collect();
    }

    pub fn address(&self) -> Option<&str> {
        self.client.address()
    }

    pub fn has_token(&self) -> bool {
        self.client.has_token()
    }

    /// Address and token present, token verified.
    pub fn is_connected(&self) -> bool {
        self.verified && self.client.address().is_some() && self.client.has_token()
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Pair if needed, then verify the token.
    ///
    /// Supplied values replace the cached ones. Without a token this
    /// registers with the bridge, which fails with `ButtonNotPressed`
    /// until the link button is pressed; call again to retry. A rejected
    /// token is dropped so the next attempt pairs from scratch.
    pub async fn connect(
        &mut self,
        address: Option<String>,
        token: Option<String>,
    ) -> Result<(), CoreError> {
        if let Some(address) = address {
            if self.client.address() != Some(address.as_str()) {
                self.verified = false;
            }
            self.client.set_address(Some(address));
        }
        if token.is_some() {
            self.client.set_token(token);
            self.verified = false;
        }

        if self.client.address().is_none() {
            return Err(CoreError::MissingAddress {
                bridge_id: self.id.clone(),
            });
        }

        if !self.client.has_token() {
            self.pair().await?;
        }

        match self.client.get_config().await {
            Ok(config) => {
                if !config.name.is_empty() {
                    self.display_name = Some(config.name);
                }
                if !self.verified {
                    info!(bridge = %self.id, address = ?self.client.address(), "bridge connected");
                }
                self.verified = true;
                Ok(())
            }
            Err(e) => {
                self.verified = false;
                self.absorb(&e);
                Err(e.into())
            }
        }
    }

    /// Connect unless already connected at `address`.
    pub async fn ensure_connected(&mut self, address: &str) -> Result<(), CoreError> {
        if self.is_connected() && self.client.address() == Some(address) {
            return Ok(());
        }
        self.connect(Some(address.to_owned()), None).await
    }

    async fn pair(&mut self) -> Result<(), CoreError> {
        match self.client.register_app().await {
            Ok(Some(token)) => {
                info!(bridge = %self.id, "paired with bridge");
                self.client.set_token(Some(token));
                Ok(())
            }
            Ok(None) => Err(CoreError::PairingFailed {
                bridge_id: self.id.clone(),
                reason: "bridge answered without a username".into(),
            }),
            Err(e) => {
                if e.is_pairing_pending() {
                    info!(bridge = %self.id, "waiting for link button");
                } else {
                    self.absorb(&e);
                }
                Err(e.into())
            }
        }
    }

    /// Drop whichever cached credential `err` invalidates.
    pub fn absorb(&mut self, err: &elessar_api::Error) {
        if err.invalidates_token() {
            debug!(bridge = %self.id, "dropping rejected token");
            self.client.set_token(None);
            self.verified = false;
        }
        if err.invalidates_address() {
            debug!(bridge = %self.id, "dropping stale address");
            self.client.set_address(None);
            self.verified = false;
        }
    }

    // ── Group control ────────────────────────────────────────────────

    /// Switch every configured group on or off.
    ///
    /// Groups the bridge no longer reports are removed from the
    /// configuration first. Remaining groups are commanded concurrently;
    /// individual failures land in the report rather than failing the call.
    pub async fn set_groups_on(&mut self, value: bool) -> Result<DispatchReport, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected {
                bridge_id: self.id.clone(),
            });
        }

        let live = match self.client.get_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                self.absorb(&e);
                return Err(e.into());
            }
        };

        let mut report = DispatchReport::default();
        self.group_ids.retain(|id| {
            let keep = live.contains_key(id);
            if !keep {
                report.dropped.push(id.clone());
            }
            keep
        });
        if !report.dropped.is_empty() {
            debug!(bridge = %self.id, dropped = ?report.dropped, "dropped stale groups");
        }

        let client = &self.client;
        let outcomes = join_all(self.group_ids.iter().map(|group_id| async move {
            (group_id.clone(), client.set_group_on(group_id, value).await)
        }))
        .await;

        for (group_id, outcome) in outcomes {
            match outcome {
                Ok(_) => report.succeeded.push(group_id),
                Err(e) => {
                    warn!(bridge = %self.id, group = %group_id, error = %e, "group command failed");
                    report.failed.push((group_id, e));
                }
            }
        }

        let invalidating = report
            .failed
            .iter()
            .find(|(_, e)| e.invalidates_address() || e.invalidates_token())
            .map(|(_, e)| e.clone());
        if let Some(e) = invalidating {
            self.absorb(&e);
        }

        Ok(report)
    }

    /// Groups the bridge currently reports, as `{id → name}`.
    pub async fn available_groups(&self) -> Result<BTreeMap<String, String>, CoreError> {
        let groups = self.client.get_groups().await?;
        Ok(groups.into_iter().map(|(id, g)| (id, g.name)).collect())
    }

    /// Re-read the display name from the public config.
    ///
    /// Keeps the previous name if the bridge can't be reached.
    pub async fn refresh_name(&mut self) -> Option<&str> {
        if self.client.address().is_some() {
            match self.client.get_public_config().await {
                Ok(config) if !config.name.is_empty() => self.display_name = Some(config.name),
                Ok(_) => {}
                Err(e) => debug!(bridge = %self.id, error = %e, "name refresh failed"),
            }
        }
        self.display_name.as_deref()
    }
}
