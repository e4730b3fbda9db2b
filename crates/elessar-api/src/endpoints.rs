// Bridge API endpoints
//
// Pairing, configuration, and group control on top of `BridgeClient::request`.

use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::BridgeClient;
use crate::error::Error;
use crate::models::{BridgeConfig, Group, RegisterEntry};

impl BridgeClient {
    /// Public configuration (no token needed).
    ///
    /// `GET /api/config`
    pub async fn get_public_config(&self) -> Result<BridgeConfig, Error> {
        self.request_as(Method::GET, "/config", true, None).await
    }

    /// Authenticated configuration. Doubles as a token check.
    ///
    /// `GET /api/{token}/config`
    pub async fn get_config(&self) -> Result<BridgeConfig, Error> {
        self.request_as(Method::GET, "/config", false, None).await
    }

    /// Ask the bridge for a new token.
    ///
    /// `POST /api` with `{"devicetype": app_name}`. Fails with
    /// [`Error::ButtonNotPressed`] until the link button is pressed.
    /// Returns `None` if the bridge answered without a username.
    pub async fn register_app(&self) -> Result<Option<String>, Error> {
        debug!(app = self.app_name(), "registering with bridge");
        let body = json!({ "devicetype": self.app_name() });
        let entries: Vec<RegisterEntry> =
            self.request_as(Method::POST, "", true, Some(&body)).await?;
        Ok(entries
            .into_iter()
            .find_map(|entry| entry.success.map(|s| s.username)))
    }

    /// All groups keyed by group id.
    ///
    /// `GET /api/{token}/groups`
    pub async fn get_groups(&self) -> Result<BTreeMap<String, Group>, Error> {
        self.request_as(Method::GET, "/groups", false, None).await
    }

    /// Switch one group on or off.
    ///
    /// `PUT /api/{token}/groups/{id}/action` with `{"on": value}`
    pub async fn set_group_on(&self, group_id: &str, value: bool) -> Result<Vec<Value>, Error> {
        debug!(group_id, value, "setting group state");
        let path = format!("/groups/{group_id}/action");
        self.request_as(Method::PUT, &path, false, Some(&json!({ "on": value })))
            .await
    }
}
