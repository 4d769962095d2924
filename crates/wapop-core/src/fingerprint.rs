//! Canonical JSON helpers and the SHA-256 fingerprint used for drift detection.
//!
//! Each decision input is encoded on its own and the encodings are concatenated in a
//! fixed order before hashing. Maps are always emitted with sorted keys so that the
//! same logical inputs produce the same fingerprint whatever order they were built in.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::ByteString;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
#[error("failed to serialise {field} for fingerprinting: {source}")]
pub struct FingerprintError {
    pub field: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Serialize a value into JSON with object keys in sorted order.
///
/// The value is first lowered to a `serde_json::Value`, whose object map is ordered by
/// key, so any map type (including hash maps) encodes deterministically.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    serde_json::to_vec(&canonical)
}

/// Everything the actuation outcome depends on, in hashing order.
#[derive(Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub boot_id: &'a str,
    pub activate: bool,
    /// Settings ConfigMap data; `None` when the ConfigMap has no data.
    pub config: Option<&'a BTreeMap<String, String>>,
    /// Settings Secret data; bytes are encoded as base64 strings.
    pub secret: Option<&'a BTreeMap<String, ByteString>>,
}

impl DecisionInputs<'_> {
    pub fn fingerprint(&self) -> Result<Fingerprint, FingerprintError> {
        let mut hasher = Sha256::new();
        hasher.update(encode("boot id", &self.boot_id)?);
        hasher.update(encode("activation", &self.activate)?);
        hasher.update(encode("config", &self.config)?);
        hasher.update(encode("secret", &self.secret)?);
        Ok(Fingerprint(hasher.finalize().into()))
    }
}

impl fmt::Debug for DecisionInputs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionInputs")
            .field("boot_id", &self.boot_id)
            .field("activate", &self.activate)
            .field("config", &self.config)
            .field("secret_keys", &self.secret.map(|data| data.keys().collect::<Vec<_>>()))
            .finish()
    }
}

fn encode<T: Serialize>(field: &'static str, value: &T) -> Result<Vec<u8>, FingerprintError> {
    to_canonical_json(value).map_err(|source| FingerprintError { field, source })
}

/// SHA-256 digest over the decision inputs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, the form stored in `AccessPoint.status.hash`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether a stored status hash records this fingerprint.
    pub fn matches(&self, stored: Option<&str>) -> bool {
        stored.is_some_and(|stored| stored.eq_ignore_ascii_case(&self.to_hex()))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn secret(pairs: &[(&str, &[u8])]) -> BTreeMap<String, ByteString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
            .collect()
    }

    #[test]
    fn canonical_json_sorts_hash_map_keys() {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        for key in ["a", "m", "z", "b"] {
            forward.insert(key, 1);
        }
        for key in ["b", "z", "m", "a"] {
            backward.insert(key, 1);
        }
        let bytes = to_canonical_json(&forward).unwrap();
        assert_eq!(bytes, to_canonical_json(&backward).unwrap());
        assert_eq!(bytes, br#"{"a":1,"b":1,"m":1,"z":1}"#);
    }

    #[test]
    fn fingerprint_matches_concatenated_json_digest() {
        let cfg = config(&[("ssid", "home")]);
        let sec = secret(&[("password", b"hunter2")]);
        let inputs = DecisionInputs {
            boot_id: "boot-1",
            activate: true,
            config: Some(&cfg),
            secret: Some(&sec),
        };
        let expected = Sha256::digest(
            br#""boot-1"true{"ssid":"home"}{"password":"aHVudGVyMg=="}"#.as_slice(),
        );
        assert_eq!(inputs.fingerprint().unwrap().to_hex(), hex::encode(expected));
    }

    #[test]
    fn absent_maps_encode_as_null() {
        let inputs = DecisionInputs {
            boot_id: "",
            activate: false,
            config: None,
            secret: None,
        };
        let expected = Sha256::digest(br#"""falsenullnull"#.as_slice());
        assert_eq!(inputs.fingerprint().unwrap().as_bytes(), expected.as_slice());
    }

    #[test]
    fn insertion_order_does_not_change_fingerprint() {
        let cfg_a = config(&[("ssid", "home"), ("nodeSelector", "{}"), ("channel", "6")]);
        let cfg_b = config(&[("channel", "6"), ("ssid", "home"), ("nodeSelector", "{}")]);
        let sec_a = secret(&[("password", b"x"), ("country", b"FR")]);
        let sec_b = secret(&[("country", b"FR"), ("password", b"x")]);
        let a = DecisionInputs {
            boot_id: "b",
            activate: true,
            config: Some(&cfg_a),
            secret: Some(&sec_a),
        };
        let b = DecisionInputs {
            config: Some(&cfg_b),
            secret: Some(&sec_b),
            ..a
        };
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn every_input_moves_the_fingerprint() {
        let cfg = config(&[("ssid", "home")]);
        let sec = secret(&[("password", b"hunter2")]);
        let other_sec = secret(&[("password", b"hunter3")]);
        let other_cfg = config(&[("ssid", "away")]);
        let base = DecisionInputs {
            boot_id: "boot-1",
            activate: true,
            config: Some(&cfg),
            secret: Some(&sec),
        };
        let fp = base.fingerprint().unwrap();
        let variants = [
            DecisionInputs { boot_id: "boot-2", ..base },
            DecisionInputs { activate: false, ..base },
            DecisionInputs { config: Some(&other_cfg), ..base },
            DecisionInputs { secret: Some(&other_sec), ..base },
            DecisionInputs { secret: None, ..base },
        ];
        for variant in variants {
            assert_ne!(fp, variant.fingerprint().unwrap(), "{variant:?}");
        }
    }

    #[test]
    fn stored_hash_comparison() {
        let fp = DecisionInputs {
            boot_id: "b",
            activate: true,
            config: None,
            secret: None,
        }
        .fingerprint()
        .unwrap();
        assert!(fp.matches(Some(&fp.to_hex())));
        assert!(fp.matches(Some(&fp.to_hex().to_uppercase())));
        assert!(!fp.matches(Some("")));
        assert!(!fp.matches(None));
    }
}
