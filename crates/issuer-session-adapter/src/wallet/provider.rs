/*
[INPUT]:  An injected provider object reachable through untyped method calls
[OUTPUT]: WalletCapability implementation over that provider
[POS]:    Wallet layer - raw provider adapter
[UPDATE]: When provider method names or response shapes change
*/

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tx::EntryFunctionPayload;
use crate::wallet::capability::{
    RawSignature, SignMessageRequest, SubmitConvention, SubmittedTransaction, WalletAccount,
    WalletCapability, WalletError,
};

/// A globally exposed wallet object answering untyped method calls
/// (`connect`, `account`, `signMessage`, `signAndSubmitTransaction`, `disconnect`).
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

/// WalletCapability over a raw injected provider
pub struct ProviderWallet {
    provider: Arc<dyn InjectedProvider>,
    account: RwLock<Option<WalletAccount>>,
}

impl ProviderWallet {
    pub fn new(provider: Arc<dyn InjectedProvider>) -> Self {
        Self {
            provider,
            account: RwLock::new(None),
        }
    }

    fn remember(&self, account: Option<WalletAccount>) {
        let mut guard = self.account.write().unwrap_or_else(PoisonError::into_inner);
        *guard = account;
    }
}

impl std::fmt::Debug for ProviderWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderWallet")
            .field("provider", &self.provider.name())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl WalletCapability for ProviderWallet {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn is_connected(&self) -> bool {
        self.account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn connect(&self) -> Result<WalletAccount, WalletError> {
        let response = self.provider.request("connect", Value::Null).await?;
        let account = match parse_account(&response) {
            Some(account) => account,
            // some providers answer `connect` with `true` only
            None => {
                let response = self.provider.request("account", Value::Null).await?;
                parse_account(&response)
                    .ok_or_else(|| WalletError::new("wallet returned no account"))?
            }
        };
        debug!(wallet = %self.provider.name(), address = %account.address, "provider connected");
        self.remember(Some(account.clone()));
        Ok(account)
    }

    async fn account(&self) -> Result<Option<WalletAccount>, WalletError> {
        let response = self.provider.request("account", Value::Null).await?;
        let account = parse_account(&response);
        self.remember(account.clone());
        Ok(account)
    }

    async fn sign_message(&self, request: &SignMessageRequest) -> Result<RawSignature, WalletError> {
        let params = serde_json::json!({
            "message": request.message,
            "nonce": request.nonce,
        });
        let response = self.provider.request("signMessage", params).await?;
        Ok(RawSignature::from_value(response))
    }

    async fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
        convention: SubmitConvention,
    ) -> Result<SubmittedTransaction, WalletError> {
        let response = self
            .provider
            .request("signAndSubmitTransaction", convention.arguments(payload))
            .await?;
        SubmittedTransaction::from_value(response)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.remember(None);
        self.provider.request("disconnect", Value::Null).await?;
        Ok(())
    }
}

fn parse_account(value: &Value) -> Option<WalletAccount> {
    let value = value.get("account").unwrap_or(value);
    let address = value.get("address")?.as_str()?;
    let public_key = match value.get("publicKey") {
        Some(Value::String(key)) => key.clone(),
        // multi-key accounts report a list; the first key is the signer
        Some(Value::Array(keys)) => keys.first()?.as_str()?.to_string(),
        _ => String::new(),
    };
    Some(WalletAccount::new(address, public_key))
}
