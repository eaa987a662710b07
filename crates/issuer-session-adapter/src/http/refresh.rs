/*
[INPUT]:  Refresh token from the SessionStore, refresh interval
[OUTPUT]: Rotated token pair, or a cleared session when the refresh token is rejected
[POS]:    HTTP layer - single-flight token refresh and periodic scheduler
[UPDATE]: When refresh policy or scheduling changes
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{ApiClient, Result, SessionError};

/// Default interval of the periodic refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Refresh scheduler configuration
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl ApiClient {
    /// Rotate the token pair now and return the new access token.
    ///
    /// Concurrent callers share one refresh: whoever waits on the guard while
    /// another caller rotates the pair gets the fresh token without a second request.
    pub async fn refresh_session(&self) -> Result<String> {
        let seen = self.session().access_token();
        self.refresh_after(seen).await
    }

    /// Refresh unless the access token already changed since `seen` was read
    pub(crate) async fn refresh_after(&self, seen: Option<String>) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.session().access_token() {
            if seen.as_deref() != Some(current.as_str()) {
                debug!("token already rotated by a concurrent refresh");
                return Ok(current);
            }
        }

        let epoch = self.session().epoch();
        let refresh_token = self
            .session()
            .refresh_token()
            .ok_or(SessionError::Unauthorized)?;

        match self.refresh_token(&refresh_token).await {
            Ok(tokens) => {
                let stored = self.session().set_tokens_if(
                    epoch,
                    &tokens.access_token,
                    &tokens.refresh_token,
                )?;
                if !stored {
                    debug!("logged out while refreshing, discarding rotated pair");
                    return Err(SessionError::SessionExpired);
                }
                info!("session refreshed");
                Ok(tokens.access_token)
            }
            Err(SessionError::Api { status, message }) if (400..500).contains(&status) => {
                if self.session().epoch() != epoch {
                    return Err(SessionError::SessionExpired);
                }
                warn!(status, reason = %message, "refresh token rejected, logging out");
                self.session().clear()?;
                Err(SessionError::SessionExpired)
            }
            Err(err) => Err(err),
        }
    }

    /// Start the periodic refresh while authenticated.
    ///
    /// The scheduler registers its cancellation handle with the SessionStore, so
    /// `SessionStore::clear` stops it.
    pub fn spawn_refresh_scheduler(self: &Arc<Self>, config: RefreshConfig) -> JoinHandle<()> {
        let cancel = CancellationToken::new();
        self.session().attach_refresh_task(cancel.clone());

        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("refresh scheduler stopped");
                        break;
                    }
                    _ = tokio::time::sleep(config.interval) => {}
                }

                if client.session().refresh_token().is_none() {
                    debug!("no session, refresh scheduler exiting");
                    break;
                }

                match client.refresh_session().await {
                    Ok(_) => {}
                    Err(SessionError::SessionExpired) => break,
                    Err(err) => warn!(error = %err, "periodic refresh failed, will retry"),
                }
            }
        })
    }
}
