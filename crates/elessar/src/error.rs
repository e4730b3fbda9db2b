//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use elessar_config::ConfigError;
use elessar_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PAIRING: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Radio & discovery ────────────────────────────────────────────
    #[error("Bluetooth scanning failed: {message}")]
    #[diagnostic(
        code(elessar::bluetooth),
        help("Check that a Bluetooth adapter is present, powered on, and that this user may scan.")
    )]
    Bluetooth { message: String },

    #[error("Service discovery failed: {message}")]
    #[diagnostic(
        code(elessar::discovery),
        help("mDNS needs UDP port 5353 on the local network.")
    )]
    Discovery { message: String },

    // ── Bridges ──────────────────────────────────────────────────────
    #[error("Could not reach bridge: {message}")]
    #[diagnostic(
        code(elessar::connection_failed),
        help("Check that the bridge is powered and on this network.\nTry: elessar discover")
    )]
    ConnectionFailed { message: String },

    #[error("Bridge rejected the stored token")]
    #[diagnostic(
        code(elessar::auth_failed),
        help("Pair again with: elessar bridge pair {bridge_id}")
    )]
    AuthFailed { bridge_id: String },

    #[error("Bridge {bridge_id} is waiting for its link button")]
    #[diagnostic(
        code(elessar::pairing_pending),
        help("Press the round button on the bridge, then run: elessar bridge pair {bridge_id}")
    )]
    PairingPending { bridge_id: String },

    #[error("Pairing with {bridge_id} timed out after {seconds}s")]
    #[diagnostic(
        code(elessar::timeout),
        help("Press the link button on the bridge while `elessar bridge pair` is running.")
    )]
    Timeout { bridge_id: String, seconds: u64 },

    #[error("Bridge error: {message}")]
    #[diagnostic(code(elessar::bridge))]
    Bridge { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(elessar::not_found),
        help("Run: elessar {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(elessar::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("{source}")]
    #[diagnostic(
        code(elessar::config),
        help("Settings are read from {path} and ELESSAR_* environment variables.")
    )]
    Config {
        #[source]
        source: ConfigError,
        path: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Bluetooth { .. } | Self::Discovery { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::PairingPending { .. } => exit_code::PAIRING,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the bridge id to credential errors.
    pub fn for_bridge(err: CoreError, bridge_id: &str) -> Self {
        match err {
            CoreError::Api(elessar_api::Error::ButtonNotPressed { .. }) => Self::PairingPending {
                bridge_id: bridge_id.to_owned(),
            },
            CoreError::Api(elessar_api::Error::UnauthorizedUser { .. }) => Self::AuthFailed {
                bridge_id: bridge_id.to_owned(),
            },
            other => other.into(),
        }
    }

    pub fn config(source: ConfigError, path: &std::path::Path) -> Self {
        Self::Config {
            source,
            path: path.display().to_string(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownVendor { vendor } => CliError::Validation {
                field: "beacon id".into(),
                reason: format!("unknown vendor '{vendor}' (expected ibeacon or eddystone)"),
            },
            CoreError::InvalidBeaconId { id, reason } => CliError::Validation {
                field: "beacon id".into(),
                reason: format!("{id}: {reason}"),
            },
            CoreError::InvalidBeaconState { reason } => CliError::Validation {
                field: "beacon state".into(),
                reason,
            },
            CoreError::BridgeNotResolved { bridge_id } => CliError::NotFound {
                resource_type: "bridge".into(),
                identifier: bridge_id,
                list_command: "discover".into(),
            },
            CoreError::BridgeNotTracked { bridge_id } => CliError::NotFound {
                resource_type: "bridge".into(),
                identifier: bridge_id,
                list_command: "bridge list".into(),
            },
            CoreError::MissingAddress { bridge_id } | CoreError::NotConnected { bridge_id } => {
                CliError::ConnectionFailed {
                    message: format!("bridge {bridge_id} has no usable address"),
                }
            }
            CoreError::PairingFailed { bridge_id, reason } => CliError::Bridge {
                message: format!("pairing with {bridge_id} failed: {reason}"),
            },
            CoreError::Scan { message } => CliError::Bluetooth { message },
            CoreError::Discovery { message } => CliError::Discovery { message },
            CoreError::Api(api) => api.into(),
        }
    }
}

impl From<elessar_api::Error> for CliError {
    fn from(err: elessar_api::Error) -> Self {
        match err {
            elessar_api::Error::Connection { message } => CliError::ConnectionFailed { message },
            elessar_api::Error::UnauthorizedUser { .. } => CliError::AuthFailed {
                bridge_id: "<id>".into(),
            },
            elessar_api::Error::ButtonNotPressed { .. } => CliError::PairingPending {
                bridge_id: "<id>".into(),
            },
            other => CliError::Bridge {
                message: other.to_string(),
            },
        }
    }
}
