/*
[INPUT]:  CliConfig
[OUTPUT]: Restored session, API client and on-demand wallet coordinator
[POS]:    Wiring layer - builds adapter objects shared by commands
[UPDATE]: When commands need new adapter components
*/

use std::sync::Arc;

use anyhow::{Context, Result};
use issuer_session_adapter::{
    ApiClient, ChallengeAuthenticator, FileStorage, KeypairWallet, SessionStore, WalletCoordinator,
};
use tracing::{debug, info};

use crate::config::CliConfig;

/// Adapter objects for one CLI invocation
#[derive(Debug)]
pub struct AppContext {
    pub config: CliConfig,
    pub client: Arc<ApiClient>,
}

impl AppContext {
    /// Build the client over file-backed token storage and restore any saved session
    pub fn new(config: CliConfig) -> Result<Self> {
        let storage_path = config.storage_path()?;
        let session = SessionStore::new(Arc::new(FileStorage::new(&storage_path)));
        let restored = session.init().context("restore saved session")?;
        debug!(path = %storage_path.display(), restored, "session storage ready");

        let client = ApiClient::with_config(config.client_config(), session)
            .context("create api client")?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    pub fn session(&self) -> &SessionStore {
        self.client.session()
    }

    /// Load (or create) the local key and wrap it in a coordinator
    pub fn coordinator(&self) -> Result<(Arc<KeypairWallet>, WalletCoordinator)> {
        let key_file = self.config.key_file()?;
        let wallet = KeypairWallet::from_key_file(&key_file, self.config.wallet_address.clone())
            .with_context(|| format!("load wallet key {}", key_file.display()))?;
        let wallet = Arc::new(wallet);
        info!(address = %wallet.address(), "wallet key loaded");

        let authenticator = Arc::new(ChallengeAuthenticator::new(self.client.clone()));
        let coordinator = WalletCoordinator::new(self.session().clone(), authenticator)
            .with_adapter(wallet.clone());
        Ok((wallet, coordinator))
    }
}
