/*
[INPUT]:  Untyped payload from the UI, WalletCoordinator
[OUTPUT]: SubmittedTransaction hash, or a classified SessionError
[POS]:    Transaction layer - multi-strategy dispatch with retry, timeout, fallback
[UPDATE]: When calling conventions, retry policy or fallback rules change
*/

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::http::{Result, SessionError};
use crate::tx::classify::{FailureKind, classify_wallet_error};
use crate::tx::payload::EntryFunctionPayload;
use crate::wallet::{
    SubmitConvention, SubmittedTransaction, WalletCapability, WalletCoordinator, WalletError,
};

/// Retry, backoff and timeout policy
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `n * backoff_step`
    pub backoff_step: Duration,
    /// Bound on one attempt (both calling conventions)
    pub sign_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
            sign_timeout: Duration::from_secs(30),
        }
    }
}

/// Validates payloads and submits them through the best available wallet
#[derive(Debug)]
pub struct TransactionGateway {
    coordinator: Arc<WalletCoordinator>,
    config: GatewayConfig,
}

impl TransactionGateway {
    pub fn new(coordinator: Arc<WalletCoordinator>) -> Self {
        Self::with_config(coordinator, GatewayConfig::default())
    }

    pub fn with_config(coordinator: Arc<WalletCoordinator>, config: GatewayConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate an untyped payload and submit it.
    ///
    /// Validation failures return before any wallet is touched.
    pub async fn submit(&self, payload: &Value) -> Result<SubmittedTransaction> {
        let payload = EntryFunctionPayload::from_value(payload)?;
        self.submit_payload(&payload).await
    }

    pub async fn submit_payload(&self, payload: &EntryFunctionPayload) -> Result<SubmittedTransaction> {
        payload.validate()?;

        if let Some(wallet) = self.coordinator.signing_wallet() {
            self.ensure_account(wallet.as_ref()).await?;
            return self.submit_with_retry(wallet.as_ref(), payload).await;
        }

        // authenticated through the backend but no handle connected
        if self.coordinator.session().is_authenticated() {
            if let Some(provider) = self.coordinator.fallback_provider() {
                info!(wallet = %provider.name(), "no connected wallet, using provider fallback");
                return self.submit_with_retry(provider.as_ref(), payload).await;
            }
        }

        Err(SessionError::Connection(
            "connect a wallet before submitting transactions".to_string(),
        ))
    }

    async fn ensure_account(&self, wallet: &dyn WalletCapability) -> Result<()> {
        if self.coordinator.account().is_some() {
            return Ok(());
        }
        match wallet.account().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SessionError::Connection("wallet has no account".to_string())),
            Err(err) => Err(SessionError::Connection(err.message().to_string())),
        }
    }

    /// Sequential retry loop; only adapter-internal failures are retried
    async fn submit_with_retry(
        &self,
        wallet: &dyn WalletCapability,
        payload: &EntryFunctionPayload,
    ) -> Result<SubmittedTransaction> {
        let mut attempt = 1;
        loop {
            let outcome = timeout(self.config.sign_timeout, probe_conventions(wallet, payload)).await;
            let err = match outcome {
                Ok(Ok(tx)) => {
                    info!(wallet = %wallet.name(), hash = %tx.hash, attempt, "transaction submitted");
                    return Ok(tx);
                }
                Ok(Err(err)) => err,
                Err(_) => {
                    warn!(wallet = %wallet.name(), attempt, "transaction signing timed out");
                    return Err(SessionError::Timeout {
                        operation: "sign_and_submit",
                        duration_secs: self.config.sign_timeout.as_secs(),
                    });
                }
            };

            let kind = classify_wallet_error(err.message());
            if !kind.is_retryable() || attempt >= self.config.max_attempts {
                warn!(wallet = %wallet.name(), attempt, kind = ?kind, error = %err, "transaction failed");
                return Err(kind.into_error(err.message()));
            }

            let delay = self.config.backoff_step * attempt;
            warn!(
                wallet = %wallet.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "adapter error, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Current `{payload}` convention first, then the legacy bare payload.
///
/// A user rejection on the first call is final.
async fn probe_conventions(
    wallet: &dyn WalletCapability,
    payload: &EntryFunctionPayload,
) -> std::result::Result<SubmittedTransaction, WalletError> {
    match wallet.sign_and_submit(payload, SubmitConvention::Wrapped).await {
        Ok(tx) => Ok(tx),
        Err(err) if classify_wallet_error(err.message()) == FailureKind::UserRejected => Err(err),
        Err(err) => {
            debug!(wallet = %wallet.name(), error = %err, "wrapped convention failed, trying legacy");
            wallet.sign_and_submit(payload, SubmitConvention::Legacy).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ChallengeAuthenticator;
    use crate::http::ApiClient;
    use crate::session::{MemoryStorage, SessionStore};
    use crate::tx::PayloadError;
    use crate::wallet::MockWallet;
    use serde_json::json;
    use tokio::time::Instant;

    fn coordinator(session: SessionStore) -> WalletCoordinator {
        let client = Arc::new(ApiClient::new(session.clone()).unwrap());
        WalletCoordinator::new(session, Arc::new(ChallengeAuthenticator::new(client)))
    }

    fn gateway_with(wallet: Arc<MockWallet>) -> TransactionGateway {
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        TransactionGateway::new(Arc::new(coordinator(session).with_adapter(wallet)))
    }

    fn payload() -> Value {
        json!({
            "type": "entry_function_payload",
            "function": "0x1::bonding_curve::buy",
            "typeArguments": [],
            "arguments": ["100"],
        })
    }

    #[tokio::test]
    async fn test_validation_happens_before_wallet() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        let gateway = gateway_with(wallet.clone());

        let err = gateway
            .submit(&json!({"type": "entry_function_payload", "function": "bad"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(PayloadError::MalformedFunction(_))
        ));
        assert!(wallet.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_errors_retry_with_linear_backoff() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        // attempts 1 and 2 fail under both conventions
        for _ in 0..4 {
            wallet.push_submit_error("Cannot read properties of undefined (reading 'function')");
        }
        wallet.push_submit_ok("0xhash");
        let gateway = gateway_with(wallet.clone());

        let started = Instant::now();
        let tx = gateway.submit(&payload()).await.unwrap();

        assert_eq!(tx.hash, "0xhash");
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        let wrapped = wallet
            .submit_calls()
            .into_iter()
            .filter(|convention| *convention == SubmitConvention::Wrapped)
            .count();
        assert_eq!(wrapped, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rejection_is_not_retried() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        wallet.push_submit_error("User rejected the request.");
        let gateway = gateway_with(wallet.clone());

        let err = gateway.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, SessionError::Signing(_)));
        assert_eq!(wallet.submit_calls(), vec![SubmitConvention::Wrapped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_adapter_error() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        for _ in 0..6 {
            wallet.push_submit_error("wallet not ready");
        }
        let gateway = gateway_with(wallet.clone());

        let err = gateway.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, SessionError::AdapterInternal(_)));
        assert_eq!(wallet.submit_calls().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_convention_after_wrapped_failure() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        wallet.push_submit_error("Unexpected argument shape");
        wallet.push_submit_ok("0xlegacy");
        let gateway = gateway_with(wallet.clone());

        let tx = gateway.submit(&payload()).await.unwrap();
        assert_eq!(tx.hash, "0xlegacy");
        assert_eq!(
            wallet.submit_calls(),
            vec![SubmitConvention::Wrapped, SubmitConvention::Legacy]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct() {
        let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
        wallet.set_submit_delay(Duration::from_secs(60));
        let gateway = gateway_with(wallet);

        let err = gateway.submit(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                operation: "sign_and_submit",
                duration_secs: 30
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failures_are_classified() {
        let cases: [(&str, fn(&SessionError) -> bool); 2] = [
            ("Insufficient balance", |err| {
                matches!(err, SessionError::InsufficientFunds(_))
            }),
            ("Move abort 0x1::coin", |err| {
                matches!(err, SessionError::Transaction(_))
            }),
        ];

        for (message, expected) in cases {
            let wallet = Arc::new(MockWallet::new("0xabc", "0xkey").connected());
            wallet.push_submit_error(message);
            wallet.push_submit_error(message);
            let gateway = gateway_with(wallet.clone());

            let err = gateway.submit(&payload()).await.unwrap_err();
            assert!(expected(&err), "unexpected error for {message}: {err:?}");
            assert_eq!(wallet.submit_calls().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_no_wallet_is_connection_error() {
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        let gateway = TransactionGateway::new(Arc::new(coordinator(session)));

        let err = gateway.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
    }

    #[tokio::test]
    async fn test_authenticated_session_falls_back_to_provider() {
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        session.set_tokens("access", "refresh").unwrap();
        // provider is exposed but reports itself disconnected
        let provider = Arc::new(MockWallet::new("0xabc", "0xkey").with_name("provider"));
        provider.push_submit_ok("0xfallback");
        let gateway = TransactionGateway::new(Arc::new(
            coordinator(session).with_provider(provider.clone()),
        ));

        let tx = gateway.submit(&payload()).await.unwrap();
        assert_eq!(tx.hash, "0xfallback");
        assert_eq!(provider.submit_calls(), vec![SubmitConvention::Wrapped]);
    }
}
