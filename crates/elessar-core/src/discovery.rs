// ── Service discovery seam ──
//
// Bridges announce themselves over mDNS. The platform browser reports
// add/update/remove notifications by service instance name and resolves
// a name to its current address and TXT properties on demand.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::CoreError;

/// Service type every lighting bridge announces.
pub const BRIDGE_SERVICE_TYPE: &str = "_hue._tcp.local.";

/// TXT property carrying the bridge identifier.
pub const BRIDGE_ID_PROPERTY: &str = "bridgeid";

/// Change notification for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added(String),
    Updated(String),
    Removed(String),
}

impl DiscoveryEvent {
    /// Full service instance name the event refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::Added(name) | Self::Updated(name) | Self::Removed(name) => name,
        }
    }
}

/// A resolved service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    /// `host` or `host:port`, ready to put into a URL authority.
    pub address: String,
    pub properties: HashMap<String, Vec<u8>>,
}

impl ServiceRecord {
    /// The advertised bridge id, if present and valid UTF-8.
    pub fn bridge_id(&self) -> Option<String> {
        let raw = self.properties.get(BRIDGE_ID_PROPERTY)?;
        String::from_utf8(raw.clone()).ok()
    }
}

/// Platform service browser.
pub trait ServiceBrowser: Send + Sync + 'static {
    /// Start browsing for bridges. Events arrive on the returned channel
    /// until [`shutdown`](Self::shutdown) is called.
    fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError>;

    /// Resolve a service instance. `Ok(None)` means it no longer exists.
    fn resolve(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ServiceRecord>, CoreError>> + Send;

    /// `address`, last resolved for `name`, stopped answering.
    ///
    /// Later resolves must not hand that address back until the service
    /// is heard from again.
    fn invalidate(&self, _name: &str, _address: &str) {}

    /// Stop browsing.
    fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
