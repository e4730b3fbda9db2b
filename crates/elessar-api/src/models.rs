// Bridge API response types
//
// Only the fields the daemon reads are modelled explicitly; everything
// else is kept in `extra` so nothing is lost when debugging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bridge configuration from `GET /api/config` (public subset) or
/// `GET /api/{token}/config` (full).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    #[serde(default)]
    pub bridgeid: Option<String>,
    #[serde(default)]
    pub modelid: Option<String>,
    #[serde(default)]
    pub apiversion: Option<String>,
    #[serde(default)]
    pub swversion: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One entry from `GET /api/{token}/groups`, keyed by group id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(default)]
    pub action: Option<GroupAction>,
}

/// Last action applied to a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupAction {
    #[serde(default)]
    pub on: Option<bool>,
}

/// One entry of the `POST /api` registration response.
#[derive(Debug, Deserialize)]
pub(crate) struct RegisterEntry {
    #[serde(default)]
    pub success: Option<RegisterSuccess>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterSuccess {
    pub username: String,
}
