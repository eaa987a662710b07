/*
[INPUT]:  Raw wallet signature (hex string, bytes, or provider-specific object)
[OUTPUT]: Canonical `{data:{data:{"0":b0,"1":b1,...}}}` signature for wallet login
[POS]:    Auth layer - signature normalization
[UPDATE]: When wallets return new signature shapes or the backend format changes
*/

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::http::{Result, SessionError};
use crate::wallet::RawSignature;

/// Nesting depth accepted when digging bytes out of signature objects
const MAX_SIGNATURE_DEPTH: usize = 4;

/// Signature bytes in the backend's canonical login shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSignature {
    bytes: Vec<u8>,
}

impl NormalizedSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

struct IndexedBytes<'a>(&'a [u8]);

impl Serialize for IndexedBytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (index, byte) in self.0.iter().enumerate() {
            map.serialize_entry(&index.to_string(), byte)?;
        }
        map.end()
    }
}

#[derive(serde::Serialize)]
struct Inner<'a> {
    data: IndexedBytes<'a>,
}

#[derive(serde::Serialize)]
struct Outer<'a> {
    data: Inner<'a>,
}

impl Serialize for NormalizedSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Outer {
            data: Inner {
                data: IndexedBytes(&self.bytes),
            },
        }
        .serialize(serializer)
    }
}

/// Normalize whatever the wallet returned into the canonical login shape
pub fn normalize_signature(raw: &RawSignature) -> Result<NormalizedSignature> {
    let bytes = match raw {
        RawSignature::Hex(hex) => decode_hex(hex)?,
        RawSignature::Bytes(bytes) => bytes.clone(),
        RawSignature::Object(value) => bytes_from_value(value, 0)?,
    };
    if bytes.is_empty() {
        return Err(SessionError::InvalidChallenge("empty signature".to_string()));
    }
    Ok(NormalizedSignature::from_bytes(bytes))
}

/// Decode a hex string two characters at a time, `0x` prefix optional
fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
        .map_err(|e| SessionError::InvalidChallenge(format!("signature is not valid hex: {e}")))
}

fn bytes_from_value(value: &Value, depth: usize) -> Result<Vec<u8>> {
    if depth > MAX_SIGNATURE_DEPTH {
        return Err(unsupported(value));
    }

    match value {
        Value::String(hex) => decode_hex(hex),
        Value::Array(items) => items.iter().map(byte_from_value).collect(),
        Value::Object(map) => {
            // `{signature: ...}` and `{data: ...}` (including Buffer JSON) wrap the payload
            for key in ["signature", "data"] {
                if let Some(inner) = map.get(key) {
                    return bytes_from_value(inner, depth + 1);
                }
            }

            // Uint8Array serialized as an index map
            let mut indexed = Vec::with_capacity(map.len());
            for (key, item) in map {
                let index: usize = key.parse().map_err(|_| unsupported(value))?;
                indexed.push((index, byte_from_value(item)?));
            }
            indexed.sort_by_key(|(index, _)| *index);
            if indexed
                .iter()
                .enumerate()
                .any(|(position, (index, _))| position != *index)
            {
                return Err(SessionError::InvalidChallenge(
                    "signature index map has gaps".to_string(),
                ));
            }
            Ok(indexed.into_iter().map(|(_, byte)| byte).collect())
        }
        other => Err(unsupported(other)),
    }
}

fn byte_from_value(value: &Value) -> Result<u8> {
    value
        .as_u64()
        .and_then(|byte| u8::try_from(byte).ok())
        .ok_or_else(|| SessionError::InvalidChallenge(format!("invalid signature byte: {value}")))
}

fn unsupported(value: &Value) -> SessionError {
    SessionError::InvalidChallenge(format!("unsupported signature shape: {value}"))
}
