//! Settings and persisted state for the elessar daemon.
//!
//! [`Settings`] come from defaults, a TOML file and `ELESSAR_*` environment
//! variables. [`SavedState`] is the JSON document holding the tracked
//! beacons and bridges; it is rewritten after every mutation and decoded
//! one entry at a time so a single bad entry never blocks startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use elessar_api::TransportConfig;
use elessar_core::{Beacon, BridgeState, BRIDGE_SERVICE_TYPE};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("state file {path} is not valid JSON: {source}")]
    State {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Daemon settings. None of these change at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Persisted state document. Defaults to `state.json` in the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// `devicetype` sent when pairing with a bridge.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Sweep interval in seconds, used until the state file sets one.
    #[serde(default = "default_scan_period")]
    pub scan_period: u64,

    #[serde(default = "default_discovery_service")]
    pub discovery_service: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_file: None,
            app_name: default_app_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            scan_period: default_scan_period(),
            discovery_service: default_discovery_service(),
        }
    }
}

fn default_app_name() -> String {
    "elessar".into()
}
fn default_connect_timeout_ms() -> u64 {
    500
}
fn default_request_timeout_ms() -> u64 {
    1000
}
fn default_scan_period() -> u64 {
    3
}
fn default_discovery_service() -> String {
    BRIDGE_SERVICE_TYPE.into()
}

impl Settings {
    /// Reject values the daemon can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "app_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.scan_period == 0 {
            return Err(ConfigError::Validation {
                field: "scan_period".into(),
                reason: "must be at least one second".into(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "request_timeout_ms".into(),
                reason: "must be positive".into(),
            });
        }
        if !self.discovery_service.ends_with(".local.") {
            return Err(ConfigError::Validation {
                field: "discovery_service".into(),
                reason: format!("'{}' is not a fully qualified mDNS type", self.discovery_service),
            });
        }
        Ok(())
    }

    /// HTTP settings shared by every bridge client.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            timeout: Duration::from_millis(self.request_timeout_ms),
            app_name: self.app_name.clone(),
        }
    }

    pub fn scan_period(&self) -> Duration {
        Duration::from_secs(self.scan_period)
    }

    /// Resolved state file location.
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_path)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "elessar", "elessar")
}

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("elessar");
    p
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from the canonical path plus environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_path())
}

/// Load settings from `path` plus environment. A missing file is fine.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ELESSAR_"))
        .extract()?;
    settings.validate()?;
    Ok(settings)
}

/// Write settings as TOML to `path`.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}

// ── Persisted state ─────────────────────────────────────────────────

/// On-disk state document.
///
/// Entries stay as raw JSON until [`decode`](Self::decode) so that one
/// malformed beacon or bridge can be skipped on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(default = "default_scan_period")]
    pub scan_period: u64,
    #[serde(default)]
    pub force_lights_state: bool,
    #[serde(default)]
    pub beacons: Vec<Value>,
    #[serde(default)]
    pub bridges: Vec<Value>,
}

impl Default for SavedState {
    fn default() -> Self {
        Self {
            scan_period: default_scan_period(),
            force_lights_state: false,
            beacons: Vec::new(),
            bridges: Vec::new(),
        }
    }
}

/// A state document translated into core objects.
#[derive(Debug, Default)]
pub struct DecodedState {
    pub scan_period: Duration,
    pub force_lights_state: bool,
    pub beacons: Vec<Beacon>,
    pub bridges: Vec<BridgeState>,
    /// One message per skipped entry.
    pub rejected: Vec<String>,
}

impl SavedState {
    /// Build a document from live state.
    pub fn capture(
        scan_period: Duration,
        force_lights_state: bool,
        beacons: impl IntoIterator<Item = serde_json::Map<String, Value>>,
        bridges: impl IntoIterator<Item = BridgeState>,
    ) -> Self {
        Self {
            scan_period: scan_period.as_secs(),
            force_lights_state,
            beacons: beacons.into_iter().map(Value::Object).collect(),
            bridges: bridges
                .into_iter()
                .filter_map(|b| serde_json::to_value(b).ok())
                .collect(),
        }
    }

    /// Decode every entry independently.
    pub fn decode(&self) -> DecodedState {
        let mut decoded = DecodedState {
            scan_period: Duration::from_secs(self.scan_period),
            force_lights_state: self.force_lights_state,
            ..DecodedState::default()
        };
        if self.scan_period == 0 {
            decoded.scan_period = Duration::from_secs(default_scan_period());
            decoded
                .rejected
                .push("scan_period: must be at least one second, using the default".into());
        }

        for (i, raw) in self.beacons.iter().enumerate() {
            let beacon = raw
                .as_object()
                .ok_or_else(|| "not an object".to_owned())
                .and_then(|state| Beacon::from_state(state).map_err(|e| e.to_string()));
            match beacon {
                Ok(beacon) => decoded.beacons.push(beacon),
                Err(reason) => decoded.rejected.push(format!("beacon #{i}: {reason}")),
            }
        }

        for (i, raw) in self.bridges.iter().enumerate() {
            match serde_json::from_value::<BridgeState>(raw.clone()) {
                Ok(bridge) => decoded.bridges.push(bridge),
                Err(e) => decoded.rejected.push(format!("bridge #{i}: {e}")),
            }
        }

        decoded
    }
}

/// Read the state document. A missing file yields the defaults.
pub fn load_state(path: &Path) -> Result<SavedState, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SavedState::default()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::State {
        path: path.to_owned(),
        source,
    })
}

/// Write the state document with four-space indentation.
pub fn save_state(path: &Path, state: &SavedState) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    state.serialize(&mut ser).map_err(|source| ConfigError::State {
        path: path.to_owned(),
        source,
    })?;
    out.push(b'\n');

    std::fs::write(path, out)?;
    Ok(())
}
