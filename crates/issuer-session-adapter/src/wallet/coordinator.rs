/*
[INPUT]:  Adapter and raw provider wallet handles, SessionStore, ChallengeAuthenticator
[OUTPUT]: One logical "connected" flag and one active account; auto-login on connect
[POS]:    Wallet layer - reconciles independently connectable wallet handles
[UPDATE]: When connection sources or auto-login policy change
*/

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::{ChallengeAuthenticator, LoginOutcome};
use crate::http::{Result, SessionError};
use crate::session::SessionStore;
use crate::wallet::capability::{WalletAccount, WalletCapability};

/// Delay before the single automatic login retry after connecting
const AUTO_LOGIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Where the active account came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSource {
    /// A connected wallet handle
    Wallet,
    /// The authenticated user's primary wallet (no handle connected)
    Session,
}

/// Account exposed to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAccount {
    pub address: String,
    pub public_key: Option<String>,
    pub source: AccountSource,
}

/// Presents the adapter and the raw provider as one wallet connection
pub struct WalletCoordinator {
    adapter: Option<Arc<dyn WalletCapability>>,
    provider: Option<Arc<dyn WalletCapability>>,
    session: SessionStore,
    authenticator: Arc<ChallengeAuthenticator>,
    account: RwLock<Option<WalletAccount>>,
}

impl WalletCoordinator {
    pub fn new(session: SessionStore, authenticator: Arc<ChallengeAuthenticator>) -> Self {
        Self {
            adapter: None,
            provider: None,
            session,
            authenticator,
            account: RwLock::new(None),
        }
    }

    /// The SDK-style adapter (preferred for signing)
    pub fn with_adapter(mut self, adapter: Arc<dyn WalletCapability>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// The globally exposed raw provider
    pub fn with_provider(mut self, provider: Arc<dyn WalletCapability>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// `raw provider connected OR backend session authenticated`
    pub fn is_connected(&self) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|provider| provider.is_connected())
            || self.session.is_authenticated()
    }

    /// Adapter account, else the session user's primary wallet
    pub fn account(&self) -> Option<ActiveAccount> {
        let connected = self
            .account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(account) = connected {
            return Some(ActiveAccount {
                address: account.address,
                public_key: Some(account.public_key),
                source: AccountSource::Wallet,
            });
        }

        self.session
            .user()
            .and_then(|user| user.primary_wallet)
            .map(|address| ActiveAccount {
                address,
                public_key: None,
                source: AccountSource::Session,
            })
    }

    /// Wallet able to sign right now: the connected adapter, else the connected provider
    pub fn signing_wallet(&self) -> Option<Arc<dyn WalletCapability>> {
        [self.adapter.as_ref(), self.provider.as_ref()]
            .into_iter()
            .flatten()
            .find(|wallet| wallet.is_connected())
            .cloned()
    }

    /// Raw provider used as the last-resort signing strategy
    pub fn fallback_provider(&self) -> Option<Arc<dyn WalletCapability>> {
        self.provider.clone()
    }

    /// Connect a wallet handle and log in with it.
    ///
    /// A failed auto-login is retried once, except when the user rejected signing.
    pub async fn connect(&self) -> Result<LoginOutcome> {
        let wallet = self
            .adapter
            .clone()
            .or_else(|| self.provider.clone())
            .ok_or_else(|| SessionError::Connection("no wallet available".to_string()))?;

        let account = wallet
            .connect()
            .await
            .map_err(|err| SessionError::Connection(err.message().to_string()))?;
        info!(wallet = %wallet.name(), address = %account.address, "wallet connected");
        self.set_account(Some(account.clone()));

        if let Some(session) = self.session.session() {
            let same_wallet = session
                .user
                .as_ref()
                .and_then(|user| user.primary_wallet.as_deref())
                .is_some_and(|primary| account.matches_address(primary));
            if same_wallet && session.is_valid() {
                debug!("session already belongs to this wallet, skipping login");
                return Ok(LoginOutcome::Authenticated(session));
            }
        }

        match self.authenticator.authenticate(wallet.as_ref(), &account).await {
            Err(SessionError::Signing(reason)) => Err(SessionError::Signing(reason)),
            Err(err) => {
                warn!(error = %err, "auto-login failed, retrying once");
                tokio::time::sleep(AUTO_LOGIN_RETRY_DELAY).await;
                self.authenticator.authenticate(wallet.as_ref(), &account).await
            }
            ok => ok,
        }
    }

    /// Best-effort silent reconnect after tokens were restored from storage.
    ///
    /// Returns whether a wallet handle is connected afterwards. Failures leave
    /// the session authenticated but unable to sign.
    pub async fn restore(&self) -> bool {
        if self.signing_wallet().is_some() {
            return true;
        }
        if self.session.refresh_token().is_none() {
            return false;
        }
        let Some(adapter) = self.adapter.clone().or_else(|| self.provider.clone()) else {
            return false;
        };

        // an already-authorized handle answers `account` without prompting
        let account = match adapter.account().await {
            Ok(Some(account)) => Ok(account),
            Ok(None) | Err(_) => adapter.connect().await,
        };

        match account {
            Ok(account) => {
                info!(wallet = %adapter.name(), address = %account.address, "wallet reconnected");
                self.set_account(Some(account));
                true
            }
            Err(err) => {
                debug!(wallet = %adapter.name(), error = %err, "silent reconnect failed");
                false
            }
        }
    }

    /// Disconnect every handle and log out
    pub async fn disconnect(&self) -> Result<()> {
        for wallet in [self.adapter.as_ref(), self.provider.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Err(err) = wallet.disconnect().await {
                warn!(wallet = %wallet.name(), error = %err, "wallet disconnect failed");
            }
        }
        self.set_account(None);
        self.session.clear()
    }

    fn set_account(&self, account: Option<WalletAccount>) {
        let mut guard = self.account.write().unwrap_or_else(PoisonError::into_inner);
        *guard = account;
    }
}

impl std::fmt::Debug for WalletCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCoordinator")
            .field("adapter", &self.adapter.as_ref().map(|w| w.name().to_string()))
            .field("provider", &self.provider.as_ref().map(|w| w.name().to_string()))
            .field("connected", &self.is_connected())
            .finish()
    }
}
