//! Presence detection and lighting orchestration between BLE beacons and
//! HTTP lighting bridges.
//!
//! - **[`BeaconManager`]**: Runs the periodic scan sweep through an
//!   [`AdvertisementScanner`], matches every advertisement against the known
//!   beacon formats, and reports each completed sweep over an `mpsc` channel.
//!
//! - **[`BridgeManager`]**: Follows service discovery through a
//!   [`ServiceBrowser`], caches resolved bridge addresses, and owns the
//!   tracked [`Bridge`]s with their pairing credentials.
//!
//! - **[`Orchestrator`]**: Consumes sweep reports, debounces the presence
//!   signal against the [`LightsLatch`], and fans group commands out to every
//!   reachable bridge.
//!
//! Platform radio and mDNS access stay outside this crate; the binary plugs
//! concrete implementations into the two seam traits.

pub mod beacon;
pub mod bridge;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod revision;
pub mod scanner;

// ── Primary re-exports ──────────────────────────────────────────────
pub use beacon::manager::{BeaconManager, SweepReport};
pub use beacon::matcher::{Advertisement, match_advertisement};
pub use beacon::{Beacon, BeaconId, EddystoneUid, IBeacon, Vendor};
pub use bridge::manager::BridgeManager;
pub use bridge::{Bridge, BridgeState, DispatchReport};
pub use discovery::{BRIDGE_SERVICE_TYPE, DiscoveryEvent, ServiceBrowser, ServiceRecord};
pub use error::CoreError;
pub use orchestrator::{LightsLatch, Orchestrator, Reconciliation};
pub use scanner::AdvertisementScanner;
