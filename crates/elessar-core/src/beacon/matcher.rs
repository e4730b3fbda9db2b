// ── Advertisement matchers ──
//
// One pure decoder per vendor format. Each matcher either recognizes the
// advertisement, declines it, or reports why the payload is unusable.
// `match_advertisement` runs all of them and never lets one matcher's
// failure hide another's result.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::{Beacon, EddystoneUid, IBeacon, Vendor};

/// Company identifier registered for iBeacon hardware.
pub const APPLE_COMPANY_ID: u16 = 0x004c;

/// Company identifier used by beacons that don't register one.
pub const UNKNOWN_COMPANY_ID: u16 = 0xffff;

/// 16-bit Eddystone service UUID expanded onto the Bluetooth base UUID.
pub const EDDYSTONE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_feaa_0000_1000_8000_0080_5f9b_34fb);

/// Eddystone UID frame type.
pub const EDDYSTONE_UID_FRAME: u8 = 0x00;

const IBEACON_LEN: usize = 22;
const EDDYSTONE_UID_LEN: usize = 18;

/// One advertisement as reported by the platform scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform device handle, for logging only.
    pub address: String,
    pub local_name: Option<String>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
}

/// A payload claimed the format but could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("{vendor} payload truncated: {len} bytes, need {need}")]
    Truncated {
        vendor: Vendor,
        len: usize,
        need: usize,
    },
}

type Matcher = fn(&Advertisement) -> Result<Option<Beacon>, MatchError>;

/// Matchers in evaluation order.
const MATCHERS: [(Vendor, Matcher); 2] = [
    (Vendor::IBeacon, match_ibeacon),
    (Vendor::Eddystone, match_eddystone),
];

/// Run every matcher over one advertisement.
///
/// Matcher errors are logged and skipped.
pub fn match_advertisement(adv: &Advertisement) -> Vec<Beacon> {
    let mut found = Vec::new();
    for (vendor, matcher) in MATCHERS {
        match matcher(adv) {
            Ok(Some(beacon)) => found.push(beacon),
            Ok(None) => {}
            Err(e) => warn!(device = %adv.address, %vendor, error = %e, "advertisement rejected"),
        }
    }
    found
}

/// iBeacon: manufacturer data, marker, UUID at 2..18, major at 18..20,
/// minor at 20..22 (big endian).
pub fn match_ibeacon(adv: &Advertisement) -> Result<Option<Beacon>, MatchError> {
    let data = adv
        .manufacturer_data
        .get(&APPLE_COMPANY_ID)
        .filter(|d| !d.is_empty())
        .or_else(|| adv.manufacturer_data.get(&UNKNOWN_COMPANY_ID));

    let Some(data) = data else {
        return Ok(None);
    };
    let marked = data.first() == Some(&0x02) || data.starts_with(&[0xbe, 0xac]);
    if !marked {
        return Ok(None);
    }
    if data.len() < IBEACON_LEN {
        return Err(MatchError::Truncated {
            vendor: Vendor::IBeacon,
            len: data.len(),
            need: IBEACON_LEN,
        });
    }

    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&data[2..18]);
    Ok(Some(Beacon::IBeacon(IBeacon {
        uuid: Uuid::from_bytes(uuid),
        major: u16::from_be_bytes([data[18], data[19]]),
        minor: u16::from_be_bytes([data[20], data[21]]),
    })))
}

/// Eddystone-UID: service data, frame type 0x00, namespace at 2..12,
/// instance at 12..18, hex encoded.
pub fn match_eddystone(adv: &Advertisement) -> Result<Option<Beacon>, MatchError> {
    let Some(data) = adv.service_data.get(&EDDYSTONE_SERVICE_UUID) else {
        return Ok(None);
    };
    let Some(&frame) = data.first() else {
        return Err(MatchError::Truncated {
            vendor: Vendor::Eddystone,
            len: 0,
            need: EDDYSTONE_UID_LEN,
        });
    };
    if frame != EDDYSTONE_UID_FRAME {
        return Ok(None);
    }
    if data.len() < EDDYSTONE_UID_LEN {
        return Err(MatchError::Truncated {
            vendor: Vendor::Eddystone,
            len: data.len(),
            need: EDDYSTONE_UID_LEN,
        });
    }

    Ok(Some(Beacon::Eddystone(EddystoneUid {
        namespace: hex::encode(&data[2..12]),
        instance: hex::encode(&data[12..18]),
        name: adv.local_name.clone(),
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ibeacon_payload(uuid: Uuid, major: u16, minor: u16) -> Vec<u8> {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(uuid.as_bytes());
        data.extend_from_slice(&major.to_be_bytes());
        data.extend_from_slice(&minor.to_be_bytes());
        data.push(0xc5);
        data
    }

    fn ibeacon_adv(company: u16, data: Vec<u8>) -> Advertisement {
        Advertisement {
            address: "AA:BB:CC:DD:EE:FF".into(),
            manufacturer_data: HashMap::from([(company, data)]),
            ..Advertisement::default()
        }
    }

    fn eddystone_adv(data: Vec<u8>, name: Option<&str>) -> Advertisement {
        Advertisement {
            address: "11:22:33:44:55:66".into(),
            local_name: name.map(str::to_owned),
            service_data: HashMap::from([(EDDYSTONE_SERVICE_UUID, data)]),
            ..Advertisement::default()
        }
    }

    fn eddystone_payload() -> Vec<u8> {
        let mut data = vec![EDDYSTONE_UID_FRAME, 0xee];
        data.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99]);
        data.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        data
    }

    #[test]
    fn eddystone_service_uuid_is_expanded_16_bit() {
        assert_eq!(
            EDDYSTONE_SERVICE_UUID.to_string(),
            "0000feaa-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn ibeacon_recovers_exact_fields() {
        let cases = [
            (Uuid::nil(), 0, 0),
            (Uuid::from_u128(u128::MAX), u16::MAX, u16::MAX),
            (
                Uuid::parse_str("e2c56db5-dffb-48d2-b060-d0f5a71096e0").unwrap(),
                0x0102,
                0xfeed,
            ),
        ];
        for (uuid, major, minor) in cases {
            let adv = ibeacon_adv(APPLE_COMPANY_ID, ibeacon_payload(uuid, major, minor));
            let Some(Beacon::IBeacon(b)) = match_ibeacon(&adv).unwrap() else {
                panic!("expected iBeacon");
            };
            assert_eq!((b.uuid, b.major, b.minor), (uuid, major, minor));
        }
    }

    #[test]
    fn ibeacon_accepts_unknown_company_and_alt_marker() {
        let uuid = Uuid::from_u128(7);
        let mut data = ibeacon_payload(uuid, 1, 2);
        data[0] = 0xbe;
        data[1] = 0xac;
        let beacon = match_ibeacon(&ibeacon_adv(UNKNOWN_COMPANY_ID, data)).unwrap().unwrap();
        assert_eq!(beacon.id().as_str(), format!("ibeacon:{uuid}:1:2"));
    }

    #[test]
    fn ibeacon_falls_back_when_apple_record_is_empty() {
        let mut adv = ibeacon_adv(UNKNOWN_COMPANY_ID, ibeacon_payload(Uuid::nil(), 3, 4));
        adv.manufacturer_data.insert(APPLE_COMPANY_ID, Vec::new());
        assert!(match_ibeacon(&adv).unwrap().is_some());
    }

    #[test]
    fn ibeacon_declines_other_payloads() {
        assert_eq!(match_ibeacon(&Advertisement::default()), Ok(None));
        let adv = ibeacon_adv(APPLE_COMPANY_ID, vec![0x10, 0x05, 0x01]);
        assert_eq!(match_ibeacon(&adv), Ok(None));
        let adv = ibeacon_adv(0x0059, ibeacon_payload(Uuid::nil(), 1, 1));
        assert_eq!(match_ibeacon(&adv), Ok(None));
    }

    #[test]
    fn ibeacon_truncated_is_an_error() {
        let adv = ibeacon_adv(APPLE_COMPANY_ID, vec![0x02, 0x15, 0x00]);
        assert_eq!(
            match_ibeacon(&adv),
            Err(MatchError::Truncated {
                vendor: Vendor::IBeacon,
                len: 3,
                need: 22
            })
        );
    }

    #[test]
    fn eddystone_uid_decodes_hex_and_name() {
        let adv = eddystone_adv(eddystone_payload(), Some("Keys"));
        let Some(Beacon::Eddystone(b)) = match_eddystone(&adv).unwrap() else {
            panic!("expected Eddystone");
        };
        assert_eq!(b.namespace, "00112233445566778899");
        assert_eq!(b.instance, "aabbccddeeff");
        assert_eq!(b.name.as_deref(), Some("Keys"));
    }

    #[test]
    fn eddystone_ignores_other_frames() {
        let mut data = eddystone_payload();
        data[0] = 0x10;
        assert_eq!(match_eddystone(&eddystone_adv(data, None)), Ok(None));
    }

    #[test]
    fn eddystone_short_or_empty_payload_is_an_error() {
        assert!(match_eddystone(&eddystone_adv(Vec::new(), None)).is_err());
        assert!(match_eddystone(&eddystone_adv(vec![0x00, 0xee, 0x01], None)).is_err());
    }

    #[test]
    fn one_bad_matcher_does_not_hide_the_other() {
        let mut adv = eddystone_adv(eddystone_payload(), None);
        adv.manufacturer_data
            .insert(APPLE_COMPANY_ID, vec![0x02, 0x15, 0x00]);
        let found = match_advertisement(&adv);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].vendor(), Vendor::Eddystone);
    }

    #[test]
    fn advertisement_can_carry_both_formats() {
        let mut adv = eddystone_adv(eddystone_payload(), None);
        adv.manufacturer_data
            .insert(APPLE_COMPANY_ID, ibeacon_payload(Uuid::nil(), 1, 2));
        let vendors: Vec<Vendor> = match_advertisement(&adv).iter().map(Beacon::vendor).collect();
        assert_eq!(vendors, vec![Vendor::IBeacon, Vendor::Eddystone]);
    }
}
