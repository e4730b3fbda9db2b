// Bridge HTTP client
//
// Wraps `reqwest::Client` with bridge-specific URL construction and
// error-envelope unwrapping. Endpoint helpers live in `endpoints.rs`
// to keep this module focused on transport mechanics.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Request helper for one bridge.
///
/// Holds the bridge's network address and authentication token but keeps
/// no other state between calls. Invalidating cached credentials after a
/// failure is the caller's decision.
#[derive(Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    address: Option<String>,
    token: Option<SecretString>,
    app_name: String,
}

impl BridgeClient {
    /// Create a client with no address or token from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, transport.app_name.clone()))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// Bridges share one connection pool this way.
    pub fn with_client(http: reqwest::Client, app_name: String) -> Self {
        Self {
            http,
            address: None,
            token: None,
            app_name,
        }
    }

    /// A client sharing this one's connection pool, with no address or token.
    pub fn sibling(&self) -> Self {
        Self::with_client(self.http.clone(), self.app_name.clone())
    }

    /// Builder-style address setter.
    pub fn at(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Builder-style token setter.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        self.address = address;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(ExposeSecret::expose_secret)
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.map(SecretString::from);
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// The `devicetype` sent on registration.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Build `http://{address}/api[/{token}]{path}`.
    ///
    /// Every path segment is pushed individually so ids and tokens are
    /// percent-encoded.
    pub(crate) fn api_url(&self, path: &str, public: bool) -> Result<Url, Error> {
        let address = self.address.as_deref().ok_or_else(|| Error::Client {
            message: "API needs a bridge address".into(),
        })?;

        let mut url = Url::parse(&format!("http://{address}/api"))?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| Error::Client {
                message: format!("address cannot carry a path: {address}"),
            })?;
            if !public {
                let token = self.token.as_ref().ok_or_else(|| Error::Client {
                    message: "private endpoint needs a token".into(),
                })?;
                segments.push(token.expose_secret());
            }
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send one request and unwrap the bridge's error envelope.
    ///
    /// `public` requests omit the token from the path. A JSON array
    /// response containing an `error` object is mapped onto the
    /// matching [`Error`] variant.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        public: bool,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.api_url(path, public)?;
        debug!(%method, path, public, "bridge request");

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Bridge {
                message: format!("HTTP {status}"),
                code: None,
            });
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| Error::Bridge {
            message: format!("malformed response body: {e}"),
            code: None,
        })?;

        check_envelope(&value)?;
        Ok(value)
    }

    /// `request` followed by typed decoding of the payload.
    pub(crate) async fn request_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        public: bool,
        body: Option<&Value>,
    ) -> Result<T, Error> {
        let value = self.request(method, path, public, body).await?;
        serde_json::from_value(value).map_err(|e| Error::Bridge {
            message: format!("unexpected response shape for {path}: {e}"),
            code: None,
        })
    }
}

/// One `error` object inside the response envelope.
#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(rename = "type")]
    kind: u16,
    #[serde(default)]
    description: String,
}

/// Scan a list response for the first `{"error": {...}}` entry.
fn check_envelope(value: &Value) -> Result<(), Error> {
    let Some(messages) = value.as_array() else {
        return Ok(());
    };

    for message in messages {
        let Some(error) = message.get("error") else {
            continue;
        };
        let parsed: EnvelopeError =
            serde_json::from_value(error.clone()).map_err(|e| Error::Bridge {
                message: format!("malformed error envelope: {e}"),
                code: None,
            })?;
        return Err(Error::from_api_error(parsed.kind, parsed.description));
    }

    Ok(())
}
