// Shared transport configuration for building reqwest::Client instances.
//
// Every bridge client shares the same short timeouts so a single
// unreachable bridge cannot stall a dispatch round.

use std::time::Duration;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect bound.
    pub connect_timeout: Duration,
    /// Whole-request bound.
    pub timeout: Duration,
    /// `devicetype` sent when registering with a bridge.
    pub app_name: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            timeout: Duration::from_millis(1000),
            app_name: "elessar".into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(concat!("elessar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::Error::Client {
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}
