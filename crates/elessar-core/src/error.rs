// ── Core error types ──
//
// Beacon decoding, bridge lifecycle, and platform seam failures.
// Bridge protocol errors pass through unchanged so callers can still
// tell a pending pairing from a rejected token.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Beacon decoding ──────────────────────────────────────────────
    #[error("Unknown beacon vendor '{vendor}'")]
    UnknownVendor { vendor: String },

    #[error("Invalid beacon state: {reason}")]
    InvalidBeaconState { reason: String },

    #[error("Invalid beacon id '{id}': {reason}")]
    InvalidBeaconId { id: String, reason: String },

    // ── Bridge lifecycle ─────────────────────────────────────────────
    #[error("Bridge {bridge_id} has no network address")]
    MissingAddress { bridge_id: String },

    #[error("Bridge {bridge_id} is not connected")]
    NotConnected { bridge_id: String },

    #[error("Bridge {bridge_id} is not currently resolved")]
    BridgeNotResolved { bridge_id: String },

    #[error("Bridge {bridge_id} is not tracked")]
    BridgeNotTracked { bridge_id: String },

    #[error("Pairing with bridge {bridge_id} failed: {reason}")]
    PairingFailed { bridge_id: String, reason: String },

    // ── Platform seams ───────────────────────────────────────────────
    #[error("Advertisement scan failed: {message}")]
    Scan { message: String },

    #[error("Service discovery failed: {message}")]
    Discovery { message: String },

    // ── Bridge protocol ──────────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] elessar_api::Error),
}

impl CoreError {
    /// Returns `true` while a bridge waits for its link button.
    pub fn is_pairing_pending(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_pairing_pending())
    }
}
