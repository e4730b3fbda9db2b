// ── Beacon identity ──
//
// A closed set of beacon formats. Identity is `vendor:localId`; equality
// and hashing only ever look at that string, never at display metadata.

pub mod manager;
pub mod matcher;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::CoreError;

/// Key holding the vendor tag in a serialized beacon state.
pub const VENDOR_KEY: &str = "_vendor";

/// Eddystone-UID namespace length in bytes.
pub const NAMESPACE_LEN: usize = 10;
/// Eddystone-UID instance length in bytes.
pub const INSTANCE_LEN: usize = 6;

// ── Vendor ──────────────────────────────────────────────────────────

/// Supported advertisement formats, in matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Vendor {
    IBeacon,
    Eddystone,
}

// ── BeaconId ────────────────────────────────────────────────────────

/// Global beacon identity: `vendor:localId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconId(String);

impl BeaconId {
    pub fn new(vendor: Vendor, local_id: &str) -> Self {
        Self(format!("{vendor}:{local_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BeaconId {
    type Err = CoreError;

    /// Parse and normalize through [`Beacon::from_persisted_id`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Beacon::from_persisted_id(s).map(|b| b.id())
    }
}

// ── Vendor payloads ─────────────────────────────────────────────────

/// iBeacon identity: proximity UUID plus major/minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IBeacon {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

/// Eddystone-UID identity: hex-encoded namespace and instance.
///
/// `name` is the advertised local name and takes no part in identity.
#[derive(Debug, Clone)]
pub struct EddystoneUid {
    pub namespace: String,
    pub instance: String,
    pub name: Option<String>,
}

// ── Beacon ──────────────────────────────────────────────────────────

/// A beacon of one of the supported formats.
#[derive(Debug, Clone)]
pub enum Beacon {
    IBeacon(IBeacon),
    Eddystone(EddystoneUid),
}

impl Beacon {
    pub fn vendor(&self) -> Vendor {
        match self {
            Self::IBeacon(_) => Vendor::IBeacon,
            Self::Eddystone(_) => Vendor::Eddystone,
        }
    }

    /// Vendor-local part of the identity.
    pub fn local_id(&self) -> String {
        match self {
            Self::IBeacon(b) => format!("{}:{}:{}", b.uuid, b.major, b.minor),
            Self::Eddystone(b) => format!("{}:{}", b.namespace, b.instance),
        }
    }

    pub fn id(&self) -> BeaconId {
        BeaconId::new(self.vendor(), &self.local_id())
    }

    /// Human-readable name for listings.
    pub fn name(&self) -> String {
        match self {
            Self::IBeacon(_) => format!("iBeacon: {}", self.local_id()),
            Self::Eddystone(b) => b
                .name
                .clone()
                .unwrap_or_else(|| format!("Eddystone: {}", self.local_id())),
        }
    }

    /// Parse a persisted `vendor:localId` string.
    pub fn from_persisted_id(raw: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidBeaconId {
            id: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let (vendor, local) = raw
            .split_once(':')
            .ok_or_else(|| invalid("expected 'vendor:id'"))?;
        let vendor = Vendor::from_str(vendor).map_err(|_| CoreError::UnknownVendor {
            vendor: vendor.to_owned(),
        })?;

        match vendor {
            Vendor::IBeacon => {
                let parts: Vec<&str> = local.split(':').collect();
                let [uuid, major, minor] = parts.as_slice() else {
                    return Err(invalid("expected 'uuid:major:minor'"));
                };
                Ok(Self::IBeacon(IBeacon {
                    uuid: Uuid::parse_str(uuid).map_err(|e| invalid(&e.to_string()))?,
                    major: major.parse().map_err(|_| invalid("major is not a u16"))?,
                    minor: minor.parse().map_err(|_| invalid("minor is not a u16"))?,
                }))
            }
            Vendor::Eddystone => {
                let parts: Vec<&str> = local.split(':').collect();
                let [namespace, instance] = parts.as_slice() else {
                    return Err(invalid("expected 'namespace:instance'"));
                };
                let (Some(namespace), Some(instance)) = (
                    normalize_hex(namespace, NAMESPACE_LEN),
                    normalize_hex(instance, INSTANCE_LEN),
                ) else {
                    return Err(invalid("expected a 10-byte hex namespace and 6-byte hex instance"));
                };
                Ok(Self::Eddystone(EddystoneUid {
                    namespace,
                    instance,
                    name: None,
                }))
            }
        }
    }

    /// Serialized form with the vendor tag under [`VENDOR_KEY`].
    pub fn to_state(&self) -> Map<String, Value> {
        let value = match self {
            Self::IBeacon(b) => json!({
                "uuid": b.uuid.to_string(),
                "major": b.major.to_string(),
                "minor": b.minor.to_string(),
                VENDOR_KEY: Vendor::IBeacon.as_ref(),
            }),
            Self::Eddystone(b) => json!({
                "namespace": b.namespace,
                "instance": b.instance,
                "name": b.name,
                VENDOR_KEY: Vendor::Eddystone.as_ref(),
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Decode a serialized state produced by [`to_state`](Self::to_state).
    pub fn from_state(state: &Map<String, Value>) -> Result<Self, CoreError> {
        let vendor = state
            .get(VENDOR_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::InvalidBeaconState {
                reason: format!("missing '{VENDOR_KEY}'"),
            })?;
        let vendor = Vendor::from_str(vendor).map_err(|_| CoreError::UnknownVendor {
            vendor: vendor.to_owned(),
        })?;

        let invalid = |e: serde_json::Error| CoreError::InvalidBeaconState {
            reason: format!("{vendor}: {e}"),
        };
        let value = Value::Object(state.clone());

        match vendor {
            Vendor::IBeacon => {
                let s: IBeaconState = serde_json::from_value(value).map_err(invalid)?;
                let uuid = Uuid::parse_str(&s.uuid).map_err(|e| CoreError::InvalidBeaconState {
                    reason: format!("ibeacon: {e}"),
                })?;
                Ok(Self::IBeacon(IBeacon {
                    uuid,
                    major: s.major,
                    minor: s.minor,
                }))
            }
            Vendor::Eddystone => {
                let s: EddystoneState = serde_json::from_value(value).map_err(invalid)?;
                let (Some(namespace), Some(instance)) = (
                    normalize_hex(&s.namespace, NAMESPACE_LEN),
                    normalize_hex(&s.instance, INSTANCE_LEN),
                ) else {
                    return Err(CoreError::InvalidBeaconState {
                        reason: format!("eddystone: bad namespace/instance '{}:{}'", s.namespace, s.instance),
                    });
                };
                Ok(Self::Eddystone(EddystoneUid {
                    namespace,
                    instance,
                    name: s.name,
                }))
            }
        }
    }
}

impl PartialEq for Beacon {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Beacon {}

impl Hash for Beacon {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

// ── Serialized state shapes ─────────────────────────────────────────

#[derive(Deserialize)]
struct IBeaconState {
    uuid: String,
    #[serde(deserialize_with = "u16_from_number_or_string")]
    major: u16,
    #[serde(deserialize_with = "u16_from_number_or_string")]
    minor: u16,
}

#[derive(Deserialize)]
struct EddystoneState {
    namespace: String,
    instance: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

/// Older state files wrote major/minor as strings.
fn u16_from_number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(n) => u16::try_from(n).map_err(serde::de::Error::custom),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Lowercase hex of exactly `len` bytes, or `None`.
fn normalize_hex(raw: &str, len: usize) -> Option<String> {
    hex::decode(raw)
        .ok()
        .filter(|bytes| bytes.len() == len)
        .map(hex::encode)
}
