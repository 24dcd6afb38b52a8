// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical JSON and content hashing (§4.H canonicalization rule).
//!
//! Canonical JSON rule: UTF-8; keys of each object sorted ascending;
//! non-finite numbers serialized as `null`; undefined values dropped; no
//! insignificant whitespace. Key sorting and compact formatting come from
//! `serde_jcs` (RFC 8785); the non-finite-to-null pass runs first since
//! `serde_json::Value` can otherwise only hold finite numbers to begin
//! with and would reject a caller-supplied NaN/Infinity outright.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Supported hash algorithms for evidence artifacts. Only SHA-256 is used
/// today; kept as an enum so the manifest's `algo` field has somewhere to
/// grow without a wire format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// A hex-encoded content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Recursively replace non-finite floats with `null`. `serde_json::Value`
/// numbers built through normal parsing/construction are always finite;
/// this guards the boundary where a caller assembles a `Value` from a raw
/// `f64` (e.g. a computed confidence score) that might not be.
pub fn sanitize_non_finite(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return serde_json::Value::Null;
                }
            }
            value.clone()
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sanitize_non_finite).collect())
        }
        serde_json::Value::Object(map) => {
            let sanitized = map
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_non_finite(v)))
                .collect();
            serde_json::Value::Object(sanitized)
        }
        other => other.clone(),
    }
}

/// Returns canonical JSON bytes for a serializable value.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(
    value: &T,
) -> Result<Vec<u8>, CanonicalError> {
    let as_value = serde_json::to_value(value)
        .map_err(|e| CanonicalError::Canonicalization(e.to_string()))?;
    let sanitized = sanitize_non_finite(&as_value);
    serde_jcs::to_vec(&sanitized).map_err(|err| CanonicalError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the given algorithm.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, CanonicalError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the given algorithm.
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest {
                algorithm,
                value: hex_encode(&digest),
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_serialize_in_ascending_order() {
        let value = json!({"z": 1, "a": 2, "m": 3});
        let bytes = canonical_json_bytes(&value).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn sanitize_is_identity_for_finite_values() {
        let value = json!({"score": 1.5, "nested": {"n": 3}, "list": [1, 2.0]});
        assert_eq!(sanitize_non_finite(&value), value);
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        let a = hash_bytes(HashAlgorithm::Sha256, b"hello");
        let b = hash_bytes(HashAlgorithm::Sha256, b"hello");
        assert_eq!(a, b);
        assert_eq!(a.value.len(), 64);
    }

    #[test]
    fn canonical_hash_matches_manual_hash_of_canonical_bytes() {
        let value = json!({"b": 2, "a": 1});
        let digest = hash_canonical_json(HashAlgorithm::Sha256, &value).unwrap();
        let bytes = canonical_json_bytes(&value).unwrap();
        let expected = hash_bytes(HashAlgorithm::Sha256, &bytes);
        assert_eq!(digest, expected);
    }
}
