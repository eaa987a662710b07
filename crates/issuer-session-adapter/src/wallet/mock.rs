/*
[INPUT]:  Scripted signatures, submit results and delays
[OUTPUT]: WalletCapability test double that records every call
[POS]:    Wallet layer - mock wallet for tests and demos
[UPDATE]: When WalletCapability gains operations
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::tx::EntryFunctionPayload;
use crate::wallet::capability::{
    RawSignature, SignMessageRequest, SubmitConvention, SubmittedTransaction, WalletAccount,
    WalletCapability, WalletError,
};

/// A call observed by [`MockWallet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    Connect,
    Account,
    SignMessage { message: String, nonce: String },
    SignAndSubmit(SubmitConvention),
    Disconnect,
}

/// Mock wallet with predetermined responses
#[derive(Debug)]
pub struct MockWallet {
    name: String,
    account: WalletAccount,
    connected: AtomicBool,
    signature: Mutex<RawSignature>,
    sign_error: Mutex<Option<String>>,
    connect_error: Mutex<Option<String>>,
    submit_script: Mutex<VecDeque<Result<SubmittedTransaction, String>>>,
    submit_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<WalletCall>>,
}

impl MockWallet {
    /// Create a disconnected mock; `connect` succeeds with the given account
    pub fn new(address: &str, public_key: &str) -> Self {
        Self {
            name: "mock".to_string(),
            account: WalletAccount::new(address, public_key),
            connected: AtomicBool::new(false),
            signature: Mutex::new(RawSignature::Hex("0x00".to_string())),
            sign_error: Mutex::new(None),
            connect_error: Mutex::new(None),
            submit_script: Mutex::new(VecDeque::new()),
            submit_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Start out connected
    pub fn connected(self) -> Self {
        self.connected.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_signature(self, signature: RawSignature) -> Self {
        *lock(&self.signature) = signature;
        self
    }

    pub fn fail_signing(&self, message: &str) {
        *lock(&self.sign_error) = Some(message.to_string());
    }

    pub fn fail_connect(&self, message: &str) {
        *lock(&self.connect_error) = Some(message.to_string());
    }

    /// Queue a failure for the next `sign_and_submit` call
    pub fn push_submit_error(&self, message: &str) {
        lock(&self.submit_script).push_back(Err(message.to_string()));
    }

    /// Queue a success for the next `sign_and_submit` call
    pub fn push_submit_ok(&self, hash: &str) {
        lock(&self.submit_script).push_back(Ok(SubmittedTransaction::new(hash)));
    }

    /// Delay every `sign_and_submit` call (uses the tokio clock)
    pub fn set_submit_delay(&self, delay: Duration) {
        *lock(&self.submit_delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        lock(&self.calls).clone()
    }

    pub fn submit_calls(&self) -> Vec<SubmitConvention> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WalletCall::SignAndSubmit(convention) => Some(convention),
                _ => None,
            })
            .collect()
    }

    pub fn sign_message_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, WalletCall::SignMessage { .. }))
            .count()
    }

    fn record(&self, call: WalletCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl WalletCapability for MockWallet {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<WalletAccount, WalletError> {
        self.record(WalletCall::Connect);
        if let Some(message) = lock(&self.connect_error).clone() {
            return Err(WalletError::new(message));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.account.clone())
    }

    async fn account(&self) -> Result<Option<WalletAccount>, WalletError> {
        self.record(WalletCall::Account);
        Ok(self.is_connected().then(|| self.account.clone()))
    }

    async fn sign_message(&self, request: &SignMessageRequest) -> Result<RawSignature, WalletError> {
        self.record(WalletCall::SignMessage {
            message: request.message.clone(),
            nonce: request.nonce.clone(),
        });
        if let Some(message) = lock(&self.sign_error).clone() {
            return Err(WalletError::new(message));
        }
        Ok(lock(&self.signature).clone())
    }

    async fn sign_and_submit(
        &self,
        _payload: &EntryFunctionPayload,
        convention: SubmitConvention,
    ) -> Result<SubmittedTransaction, WalletError> {
        self.record(WalletCall::SignAndSubmit(convention));
        let delay = *lock(&self.submit_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.submit_script).pop_front();
        match next {
            Some(Ok(tx)) => Ok(tx),
            Some(Err(message)) => Err(WalletError::new(message)),
            None => Ok(SubmittedTransaction::new("0xmock")),
        }
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.record(WalletCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_wallet_script() {
        let wallet = MockWallet::new("0xabc", "0xkey");
        assert!(!wallet.is_connected());

        let account = wallet.connect().await.unwrap();
        assert_eq!(account.address, "0xabc");

        wallet.push_submit_error("boom");
        let payload = EntryFunctionPayload::new("0x1::coin::transfer", vec![], vec![]).unwrap();
        assert!(wallet
            .sign_and_submit(&payload, SubmitConvention::Wrapped)
            .await
            .is_err());
        let tx = wallet
            .sign_and_submit(&payload, SubmitConvention::Legacy)
            .await
            .unwrap();
        assert_eq!(tx.hash, "0xmock");
        assert_eq!(
            wallet.submit_calls(),
            vec![SubmitConvention::Wrapped, SubmitConvention::Legacy]
        );
    }
}
