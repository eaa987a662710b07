/*
[INPUT]:  Wallet capability, wallet account, ApiClient
[OUTPUT]: Authenticated Session written into the SessionStore
[POS]:    Auth layer - nonce challenge-response login
[UPDATE]: When login endpoints, message format or in-flight policy change
*/

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::auth::signature::{NormalizedSignature, normalize_signature};
use crate::http::{ApiClient, Result, SessionError};
use crate::session::Session;
use crate::types::WalletLoginRequest;
use crate::wallet::{SignMessageRequest, WalletAccount, WalletCapability};

/// The exact text the wallet signs and the backend verifies
pub fn full_message(message: &str, nonce: &str) -> String {
    format!("{message}\nnonce: {nonce}")
}

/// Single-use challenge bound to a wallet address.
///
/// `login` takes it by value, so a challenge cannot be submitted twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceChallenge {
    pub nonce: String,
    pub message: String,
    pub wallet_address: String,
    pub issued_at: DateTime<Utc>,
}

impl NonceChallenge {
    pub fn full_message(&self) -> String {
        full_message(&self.message, &self.nonce)
    }
}

/// Login progress per wallet address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    NonceRequested,
    Signed,
    LoggingIn,
    Authenticated,
    Failed,
}

/// Result of an `authenticate` trigger
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// Another login for the same wallet is already running; nothing was sent
    InProgress,
}

/// Performs the nonce challenge-response login
#[derive(Debug)]
pub struct ChallengeAuthenticator {
    client: Arc<ApiClient>,
    in_flight: Mutex<HashSet<String>>,
    phases: Mutex<HashMap<String, AuthPhase>>,
}

impl ChallengeAuthenticator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            in_flight: Mutex::new(HashSet::new()),
            phases: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Current phase for a wallet address
    pub fn phase(&self, wallet_address: &str) -> AuthPhase {
        let guard = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&address_key(wallet_address))
            .copied()
            .unwrap_or(AuthPhase::Idle)
    }

    /// Step 1: fetch a challenge
    ///
    /// GET /auth/nonce?wallet_address={address}
    pub async fn request_nonce(&self, wallet_address: &str) -> Result<NonceChallenge> {
        let response = self
            .client
            .request_nonce(wallet_address)
            .await
            .map_err(into_network_error)?;
        self.set_phase(wallet_address, AuthPhase::NonceRequested);

        Ok(NonceChallenge {
            nonce: response.nonce,
            message: response.message,
            wallet_address: wallet_address.to_string(),
            issued_at: Utc::now(),
        })
    }

    /// Step 2: have the wallet sign the challenge and normalize the result
    pub async fn sign_challenge(
        &self,
        wallet: &dyn WalletCapability,
        challenge: &NonceChallenge,
    ) -> Result<NormalizedSignature> {
        let request = SignMessageRequest {
            message: challenge.message.clone(),
            nonce: challenge.nonce.clone(),
        };
        let raw = wallet
            .sign_message(&request)
            .await
            .map_err(|err| SessionError::Signing(err.message().to_string()))?;
        let signature = normalize_signature(&raw)?;
        self.set_phase(&challenge.wallet_address, AuthPhase::Signed);
        Ok(signature)
    }

    /// Step 3: submit the signed challenge and store the session.
    ///
    /// Backend errors are returned verbatim; no automatic retry.
    pub async fn login(
        &self,
        account: &WalletAccount,
        challenge: NonceChallenge,
        signature: NormalizedSignature,
    ) -> Result<Session> {
        if !account.matches_address(&challenge.wallet_address) {
            return Err(SessionError::InvalidChallenge(format!(
                "challenge was issued for {}, not {}",
                challenge.wallet_address, account.address
            )));
        }

        self.set_phase(&account.address, AuthPhase::LoggingIn);
        let body = WalletLoginRequest {
            address: account.address.clone(),
            public_key: account.public_key.clone(),
            full_message: challenge.full_message(),
            signature,
            message: challenge.message,
            nonce: challenge.nonce,
        };

        let response = self.client.wallet_login(&body).await?;

        let session_store = self.client.session();
        session_store.set_tokens(&response.access_token, &response.refresh_token)?;
        if let Some(user) = response.user {
            session_store.set_user(user);
        }
        let session = session_store.session().ok_or_else(|| {
            SessionError::InvalidResponse("session missing after login".to_string())
        })?;

        self.set_phase(&account.address, AuthPhase::Authenticated);
        info!(wallet = %account.address, "wallet login succeeded");
        Ok(session)
    }

    /// Complete flow: nonce, sign, login.
    ///
    /// A second trigger for the same wallet while one is running is a no-op.
    pub async fn authenticate(
        &self,
        wallet: &dyn WalletCapability,
        account: &WalletAccount,
    ) -> Result<LoginOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &account.address) else {
            debug!(wallet = %account.address, "login already in flight, ignoring trigger");
            return Ok(LoginOutcome::InProgress);
        };

        let result = async {
            let challenge = self.request_nonce(&account.address).await?;
            let signature = self.sign_challenge(wallet, &challenge).await?;
            self.login(account, challenge, signature).await
        }
        .await;

        match result {
            Ok(session) => Ok(LoginOutcome::Authenticated(session)),
            Err(err) => {
                self.set_phase(&account.address, AuthPhase::Failed);
                warn!(wallet = %account.address, error = %err, "wallet login failed");
                Err(err)
            }
        }
    }

    fn set_phase(&self, wallet_address: &str, phase: AuthPhase) {
        let mut guard = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(address_key(wallet_address), phase);
    }
}

fn address_key(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn into_network_error(err: SessionError) -> SessionError {
    match err {
        SessionError::Http(err) => SessionError::Network(err.to_string()),
        other => other,
    }
}

/// Marks a wallet address as logging in until dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, address: &str) -> Option<Self> {
        let key = address_key(address);
        let mut guard = set.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.clone()).then(|| Self { set, key })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        guard.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_message_format() {
        assert_eq!(full_message("m1", "n1"), "m1\nnonce: n1");
    }

    #[test]
    fn test_in_flight_guard_is_exclusive_per_address() {
        let set = Mutex::new(HashSet::new());
        let first = InFlightGuard::acquire(&set, "0xABC");
        assert!(first.is_some());
        assert!(InFlightGuard::acquire(&set, "0xabc").is_none());
        assert!(InFlightGuard::acquire(&set, "0xdef").is_some());
        drop(first);
        assert!(InFlightGuard::acquire(&set, "0xabc").is_some());
    }
}
