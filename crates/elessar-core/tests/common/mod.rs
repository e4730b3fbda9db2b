// Shared fakes for the platform seams and wiremock bridge helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use elessar_api::{BridgeClient, TransportConfig};
use elessar_core::beacon::matcher::APPLE_COMPANY_ID;
use elessar_core::discovery::BRIDGE_ID_PROPERTY;
use elessar_core::{
    Advertisement, AdvertisementScanner, CoreError, DiscoveryEvent, ServiceBrowser, ServiceRecord,
};

pub const TOKEN: &str = "tok";
pub const BEACON_UUID: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";

// ── Scanner ─────────────────────────────────────────────────────────

/// Replays whatever advertisements the test puts in it.
#[derive(Default)]
pub struct FakeScanner {
    advertisements: Mutex<Vec<Advertisement>>,
}

impl FakeScanner {
    pub fn hear(&self, advertisements: Vec<Advertisement>) {
        *self.advertisements.lock().unwrap() = advertisements;
    }
}

impl AdvertisementScanner for FakeScanner {
    async fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn advertisements(&self) -> Result<Vec<Advertisement>, CoreError> {
        Ok(self.advertisements.lock().unwrap().clone())
    }
}

pub fn ibeacon_adv(major: u16, minor: u16) -> Advertisement {
    let mut data = vec![0x02, 0x15];
    data.extend_from_slice(Uuid::parse_str(BEACON_UUID).unwrap().as_bytes());
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(0xc5);
    Advertisement {
        address: format!("beacon-{major}-{minor}"),
        manufacturer_data: HashMap::from([(APPLE_COMPANY_ID, data)]),
        ..Advertisement::default()
    }
}

pub fn ibeacon_id(major: u16, minor: u16) -> String {
    format!("ibeacon:{BEACON_UUID}:{major}:{minor}")
}

// ── Browser ─────────────────────────────────────────────────────────

enum Resolution {
    Found(ServiceRecord),
    Broken,
}

/// Resolves service names from a table the test controls.
#[derive(Default)]
pub struct FakeBrowser {
    table: Mutex<HashMap<String, Resolution>>,
    resolves: Mutex<usize>,
    events: Mutex<Option<mpsc::Sender<DiscoveryEvent>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    invalidated: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn announce(&self, name: &str, bridge_id: &str, address: &str) {
        let record = ServiceRecord {
            name: name.to_owned(),
            address: address.to_owned(),
            properties: HashMap::from([(
                BRIDGE_ID_PROPERTY.to_owned(),
                bridge_id.as_bytes().to_vec(),
            )]),
        };
        self.table
            .lock()
            .unwrap()
            .insert(name.to_owned(), Resolution::Found(record));
    }

    pub fn break_resolution(&self, name: &str) {
        self.table
            .lock()
            .unwrap()
            .insert(name.to_owned(), Resolution::Broken);
    }

    /// Make the next resolve wait until the returned handle is notified.
    pub fn hold_next_resolve(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    pub fn resolve_count(&self) -> usize {
        *self.resolves.lock().unwrap()
    }

    pub async fn emit(&self, event: DiscoveryEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(event).await.unwrap();
        }
    }
}

impl ServiceBrowser for FakeBrowser {
    fn browse(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError> {
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn resolve(&self, name: &str) -> Result<Option<ServiceRecord>, CoreError> {
        *self.resolves.lock().unwrap() += 1;
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.table.lock().unwrap().get(name) {
            Some(Resolution::Found(record)) => Ok(Some(record.clone())),
            Some(Resolution::Broken) => Err(CoreError::Discovery {
                message: format!("cannot resolve {name}"),
            }),
            None => Ok(None),
        }
    }

    /// Like a real cache: forget the record unless a newer address is known.
    fn invalidate(&self, name: &str, address: &str) {
        self.invalidated.lock().unwrap().push(name.to_owned());
        let mut table = self.table.lock().unwrap();
        if matches!(table.get(name), Some(Resolution::Found(r)) if r.address == address) {
            table.remove(name);
        }
    }
}

// ── Bridges ─────────────────────────────────────────────────────────

pub fn template() -> BridgeClient {
    BridgeClient::new(&TransportConfig::default()).unwrap()
}

pub fn service_name(bridge_id: &str) -> String {
    format!("Hue Bridge - {bridge_id}._hue._tcp.local.")
}

/// An address nothing listens on.
pub fn closed_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub fn bridge_config(name: &str) -> Value {
    json!({
        "name": name,
        "bridgeid": "001788FFFE000000",
        "modelid": "BSB002",
        "apiversion": "1.60.0",
        "swversion": "1960149030"
    })
}

pub fn groups(ids: &[&str]) -> Value {
    let mut map = serde_json::Map::new();
    for id in ids {
        map.insert(
            (*id).to_owned(),
            json!({ "name": format!("Room {id}"), "type": "Room", "lights": ["1"], "action": { "on": false } }),
        );
    }
    Value::Object(map)
}

pub fn group_ok(group_id: &str, on: bool) -> Value {
    json!([{ "success": { format!("/groups/{group_id}/action/on"): on } }])
}

pub fn bridge_error(kind: u16, description: &str) -> Value {
    json!([{ "error": { "type": kind, "address": "/", "description": description } }])
}

/// Mount config and group listing for a paired bridge.
pub async fn mount_paired_bridge(server: &MockServer, name: &str, group_ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bridge_config(name)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/{TOKEN}/config")))
        .respond_with(ResponseTemplate::new(200).set_body_json(bridge_config(name)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/{TOKEN}/groups")))
        .respond_with(ResponseTemplate::new(200).set_body_json(groups(group_ids)))
        .mount(server)
        .await;
}

/// Expect exactly `times` group commands with `{"on": on}`.
pub async fn expect_group_command(server: &MockServer, group_id: &str, on: bool, times: u64) {
    Mock::given(method("PUT"))
        .and(path(format!("/api/{TOKEN}/groups/{group_id}/action")))
        .and(body_json(json!({ "on": on })))
        .respond_with(ResponseTemplate::new(200).set_body_json(group_ok(group_id, on)))
        .expect(times)
        .mount(server)
        .await;
}
