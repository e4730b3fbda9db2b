//! mdns-sd-backed service browser.
//!
//! The daemon thread resolves services continuously; resolved records are
//! cached by full service name and `resolve` reads from that cache.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use elessar_core::{CoreError, DiscoveryEvent, ServiceBrowser, ServiceRecord};

fn discovery_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Discovery {
        message: e.to_string(),
    }
}

/// How long a stale instance gets to answer before it is reported removed.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

type RecordCache = Arc<Mutex<HashMap<String, ServiceRecord>>>;

pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    service_type: String,
    records: RecordCache,
}

impl MdnsBrowser {
    pub fn new(service_type: &str) -> Result<Self, CoreError> {
        Ok(Self {
            daemon: ServiceDaemon::new().map_err(discovery_error)?,
            service_type: service_type.to_owned(),
            records: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

/// IPv4 first; IPv6 gets brackets so it can go straight into a URL.
fn preferred_address(info: &ServiceInfo) -> Option<String> {
    let addresses = info.get_addresses();
    let ip = addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.iter().next())?;
    Some(match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    })
}

fn record_from(info: &ServiceInfo) -> Option<ServiceRecord> {
    let address = preferred_address(info)?;
    let properties = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_owned(), p.val().map(<[u8]>::to_vec).unwrap_or_default()))
        .collect();
    Some(ServiceRecord {
        name: info.get_fullname().to_owned(),
        address,
        properties,
    })
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError> {
        let receiver = self
            .daemon
            .browse(&self.service_type)
            .map_err(discovery_error)?;
        let (tx, rx) = mpsc::channel(32);
        let records = Arc::clone(&self.records);

        tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                let change = match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(record) = record_from(&info) else {
                            trace!(service = info.get_fullname(), "resolved without address");
                            continue;
                        };
                        let name = record.name.clone();
                        let previous = records
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(name.clone(), record);
                        if previous.is_some() {
                            DiscoveryEvent::Updated(name)
                        } else {
                            DiscoveryEvent::Added(name)
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        records
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&fullname);
                        DiscoveryEvent::Removed(fullname)
                    }
                    other => {
                        trace!(?other, "mdns event");
                        continue;
                    }
                };
                if tx.blocking_send(change).is_err() {
                    break;
                }
            }
            debug!("mdns event thread stopped");
        });

        Ok(rx)
    }

    async fn resolve(&self, name: &str) -> Result<Option<ServiceRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    /// Drop the dead record and ask the network whether the instance is
    /// still there. An answer arrives as a fresh `ServiceResolved`, no
    /// answer as `ServiceRemoved`.
    fn invalidate(&self, name: &str, address: &str) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.get(name).is_some_and(|r| r.address == address) {
            records.remove(name);
            debug!(service = name, address, "dropped stale mdns record");
        }
        drop(records);

        if let Err(e) = self.daemon.verify(name.to_owned(), VERIFY_TIMEOUT) {
            debug!(service = name, error = %e, "mdns verify query failed");
        }
    }

    fn shutdown(&self) -> Result<(), CoreError> {
        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            debug!(service_type = %self.service_type, error = %e, "stop_browse failed");
        }
        self.daemon.shutdown().map_err(discovery_error)?;
        Ok(())
    }
}
