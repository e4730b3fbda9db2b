//! btleplug-backed advertisement scanner.
//!
//! Collects the ids of peripherals that advertise while a window is open,
//! then reads their latest manufacturer data, service data and local name.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use elessar_core::{Advertisement, AdvertisementScanner, CoreError};

fn scan_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Scan {
        message: e.to_string(),
    }
}

/// Scanner over the first Bluetooth adapter.
pub struct BleScanner {
    adapter: Adapter,
    seen: Arc<Mutex<HashSet<PeripheralId>>>,
    collector: Mutex<Option<CancellationToken>>,
}

impl BleScanner {
    /// Open the first adapter the platform reports.
    pub async fn new() -> Result<Self, CoreError> {
        let manager = Manager::new().await.map_err(scan_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(scan_error)?
            .into_iter()
            .next()
            .ok_or_else(|| scan_error("no Bluetooth adapter found"))?;
        if let Ok(info) = adapter.adapter_info().await {
            debug!(adapter = %info, "using Bluetooth adapter");
        }
        Ok(Self {
            adapter,
            seen: Arc::new(Mutex::new(HashSet::new())),
            collector: Mutex::new(None),
        })
    }

    fn stop_collector(&self) {
        let previous = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

/// The peripheral an event reports an advertisement for.
fn advertised(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// Keep every readable peripheral; one that vanished mid-read is skipped.
fn collect_advertisements<I: std::fmt::Debug>(
    reads: Vec<(I, btleplug::Result<Option<PeripheralProperties>>)>,
) -> Vec<Advertisement> {
    reads
        .into_iter()
        .filter_map(|(id, read)| match read {
            Ok(props) => props,
            Err(e) => {
                debug!(?id, error = %e, "skipping unreadable peripheral");
                None
            }
        })
        .map(|props| Advertisement {
            address: props.address.to_string(),
            local_name: props.local_name,
            manufacturer_data: props.manufacturer_data,
            service_data: props.service_data,
        })
        .collect()
}

impl AdvertisementScanner for BleScanner {
    async fn start(&self) -> Result<(), CoreError> {
        self.stop_collector();
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let mut events = self.adapter.events().await.map_err(scan_error)?;
        let cancel = CancellationToken::new();
        *self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        let seen = Arc::clone(&self.seen);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.next() => {
                        let Some(event) = event else { break };
                        if let Some(id) = advertised(event) {
                            trace!(?id, "advertisement");
                            seen.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
                        }
                    }
                }
            }
        });

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(scan_error)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.stop_collector();
        self.adapter.stop_scan().await.map_err(scan_error)
    }

    async fn advertisements(&self) -> Result<Vec<Advertisement>, CoreError> {
        let ids: Vec<PeripheralId> = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        let mut reads = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                continue;
            };
            reads.push((id, peripheral.properties().await));
        }
        Ok(collect_advertisements(reads))
    }
}
