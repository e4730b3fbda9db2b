use thiserror::Error;

/// Top-level error type for the `elessar-api` crate.
///
/// Mirrors the bridge's failure modes: local misuse, transport faults,
/// and the semantic errors the bridge reports inside its JSON envelope.
/// `elessar-core` decides which cached credential each variant invalidates.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Local ───────────────────────────────────────────────────────
    /// Missing address or token for the requested call. Fix the call site.
    #[error("Client error: {message}")]
    Client { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Bridge unreachable (refused, timed out, no route).
    #[error("Bridge unreachable: {message}")]
    Connection { message: String },

    // ── Bridge envelope (`[{ "error": { type, description } }]`) ────
    /// Token rejected (error type 1).
    #[error("Unauthorized user: {description}")]
    UnauthorizedUser { description: String },

    /// Resource does not exist on the bridge (error type 3).
    #[error("Resource unavailable: {description}")]
    ResourceUnavailable { description: String },

    /// Method not available for the resource (error type 4).
    #[error("Method unavailable: {description}")]
    MethodUnavailable { description: String },

    /// Link button has not been pressed yet (error type 101).
    #[error("Link button not pressed: {description}")]
    ButtonNotPressed { description: String },

    // ── Catch-all ───────────────────────────────────────────────────
    /// Any other upstream fault: unexpected HTTP status, malformed body,
    /// or an error type without a dedicated variant.
    #[error("Bridge error: {message}")]
    Bridge { message: String, code: Option<u16> },
}

impl Error {
    /// Build the variant for an error type code from the bridge envelope.
    pub fn from_api_error(code: u16, description: String) -> Self {
        match code {
            1 => Self::UnauthorizedUser { description },
            3 => Self::ResourceUnavailable { description },
            4 => Self::MethodUnavailable { description },
            101 => Self::ButtonNotPressed { description },
            _ => Self::Bridge {
                message: description,
                code: Some(code),
            },
        }
    }

    /// Returns `true` if the cached bridge address should be dropped.
    pub fn invalidates_address(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if the cached token should be dropped.
    pub fn invalidates_token(&self) -> bool {
        matches!(self, Self::UnauthorizedUser { .. })
    }

    /// Returns `true` while pairing waits for the physical button.
    pub fn is_pairing_pending(&self) -> bool {
        matches!(self, Self::ButtonNotPressed { .. })
    }

    /// Extract the bridge error type code, if one was reported.
    pub fn api_error_code(&self) -> Option<u16> {
        match self {
            Self::UnauthorizedUser { .. } => Some(1),
            Self::ResourceUnavailable { .. } => Some(3),
            Self::MethodUnavailable { .. } => Some(4),
            Self::ButtonNotPressed { .. } => Some(101),
            Self::Bridge { code, .. } => *code,
            Self::Client { .. } | Self::Connection { .. } => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if err.is_builder() {
            Self::Client {
                message: err.to_string(),
            }
        } else {
            Self::Bridge {
                message: err.to_string(),
                code: None,
            }
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Client {
            message: format!("invalid bridge address: {err}"),
        }
    }
}
