/*
[INPUT]:  Sign requests and transaction payloads from auth and tx layers
[OUTPUT]: Wallet accounts, raw signatures, submitted transaction receipts
[POS]:    Wallet layer - explicit capability interface over wallet handles
[UPDATE]: When adding wallet operations or calling conventions
*/

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tx::EntryFunctionPayload;

/// Address and public key of a connected wallet; replaced, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub address: String,
    pub public_key: String,
}

impl WalletAccount {
    pub fn new(address: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            public_key: public_key.into(),
        }
    }

    /// Addresses compare case-insensitively
    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address.trim())
    }
}

/// Whatever the wallet threw, as text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WalletError {
    message: String,
}

impl WalletError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Arguments of `signMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignMessageRequest {
    pub message: String,
    pub nonce: String,
}

/// Signature exactly as the wallet returned it
#[derive(Debug, Clone, PartialEq)]
pub enum RawSignature {
    /// Hex string, with or without `0x`
    Hex(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Provider-specific object (`{signature}`, `{data}`, index maps, ...)
    Object(Value),
}

impl RawSignature {
    /// Interpret an untyped wallet response
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(hex) => RawSignature::Hex(hex),
            Value::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect();
                match bytes {
                    Some(bytes) => RawSignature::Bytes(bytes),
                    None => RawSignature::Object(Value::Array(items)),
                }
            }
            other => RawSignature::Object(other),
        }
    }
}

/// Calling convention of `signAndSubmitTransaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitConvention {
    /// `signAndSubmitTransaction({ payload })`
    Wrapped,
    /// `signAndSubmitTransaction(payload)`
    Legacy,
}

impl SubmitConvention {
    /// The argument object passed to the wallet for this convention
    pub fn arguments(self, payload: &EntryFunctionPayload) -> Value {
        let payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        match self {
            SubmitConvention::Wrapped => serde_json::json!({ "payload": payload }),
            SubmitConvention::Legacy => payload,
        }
    }
}

/// Result of a submitted transaction; the gateway does not wait for inclusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
    pub hash: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubmittedTransaction {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            extra: Map::new(),
        }
    }

    /// Accept either a bare hash string or an object with a `hash` field
    pub fn from_value(value: Value) -> Result<Self, WalletError> {
        match value {
            Value::String(hash) => Ok(Self::new(hash)),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|err| WalletError::new(format!("unexpected transaction response: {err}"))),
            other => Err(WalletError::new(format!(
                "unexpected transaction response: {other}"
            ))),
        }
    }
}

/// Uniform surface over wallet handles.
///
/// Implementations: [`crate::wallet::ProviderWallet`] (raw injected provider)
/// and [`crate::wallet::KeypairWallet`] (SDK-style adapter over a local key).
#[async_trait]
pub trait WalletCapability: Send + Sync {
    /// Display name of the wallet
    fn name(&self) -> &str;

    /// Whether the handle currently holds an authorized connection
    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<WalletAccount, WalletError>;

    /// Currently authorized account, if any
    async fn account(&self) -> Result<Option<WalletAccount>, WalletError>;

    async fn sign_message(&self, request: &SignMessageRequest) -> Result<RawSignature, WalletError>;

    async fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
        convention: SubmitConvention,
    ) -> Result<SubmittedTransaction, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_signature_from_value() {
        assert_eq!(
            RawSignature::from_value(serde_json::json!("0x0102")),
            RawSignature::Hex("0x0102".to_string())
        );
        assert_eq!(
            RawSignature::from_value(serde_json::json!([1, 2])),
            RawSignature::Bytes(vec![1, 2])
        );
        assert!(matches!(
            RawSignature::from_value(serde_json::json!({"signature": "0x01"})),
            RawSignature::Object(_)
        ));
    }

    #[test]
    fn test_submit_conventions() {
        let payload = EntryFunctionPayload::new("0x1::coin::transfer", vec![], vec![]).unwrap();
        let wrapped = SubmitConvention::Wrapped.arguments(&payload);
        assert_eq!(wrapped["payload"]["function"], "0x1::coin::transfer");

        let legacy = SubmitConvention::Legacy.arguments(&payload);
        assert_eq!(legacy["type"], "entry_function_payload");
    }

    #[test]
    fn test_submitted_transaction_shapes() {
        let tx = SubmittedTransaction::from_value(serde_json::json!("0xhash")).unwrap();
        assert_eq!(tx.hash, "0xhash");

        let tx = SubmittedTransaction::from_value(serde_json::json!({
            "hash": "0xhash",
            "sender": "0xabc"
        }))
        .unwrap();
        assert_eq!(tx.extra.get("sender"), Some(&serde_json::json!("0xabc")));

        assert!(SubmittedTransaction::from_value(serde_json::json!(42)).is_err());
    }
}
