/*
[INPUT]:  Token pairs from login/refresh, user profile, refresh scheduler handles
[OUTPUT]: Current session, access token at call time, logout
[POS]:    Session layer - process-wide SessionStore
[UPDATE]: When adding session fields or changing clear/refresh semantics
*/

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{Result, SessionError};
use crate::session::jwt::token_expiry;
use crate::session::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TokenStorage};
use crate::types::UserProfile;

/// Paired access/refresh tokens plus cached user profile
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Option<UserProfile>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A session without a usable access token counts as unauthenticated
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => Utc::now() < expires_at,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    // profile may be known before tokens are restored (and survives token rotation)
    user: Option<UserProfile>,
    // bumped by every logout
    epoch: u64,
}

#[derive(Debug)]
struct StoreInner {
    storage: Arc<dyn TokenStorage>,
    state: RwLock<SessionState>,
    refresh_task: Mutex<Option<CancellationToken>>,
}

/// Thread-safe owner of the session.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                storage,
                state: RwLock::new(SessionState::default()),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    /// Restore tokens from durable storage.
    ///
    /// Returns `true` when a complete token pair was found. A half-written pair
    /// is discarded from storage.
    pub fn init(&self) -> Result<bool> {
        let access = self.inner.storage.get(ACCESS_TOKEN_KEY)?;
        let refresh = self.inner.storage.get(REFRESH_TOKEN_KEY)?;

        match (access, refresh) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                self.write_state(|state| {
                    state.session = Some(Session {
                        expires_at: token_expiry(&access),
                        access_token: access,
                        refresh_token: refresh,
                        user: state.user.clone(),
                    });
                });
                info!("session restored from storage");
                Ok(true)
            }
            (None, None) => Ok(false),
            _ => {
                warn!("incomplete token pair in storage, discarding");
                self.inner
                    .storage
                    .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
                Ok(false)
            }
        }
    }

    /// Store a new token pair; both are persisted together
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        validate_pair(access_token, refresh_token)?;
        let mut state = self.write_guard();
        self.store_pair(&mut state, access_token, refresh_token)
    }

    /// Store a rotated pair only if no logout happened since `epoch` was read.
    ///
    /// Returns `false` when the session was cleared in between; nothing is written then.
    pub fn set_tokens_if(&self, epoch: u64, access_token: &str, refresh_token: &str) -> Result<bool> {
        validate_pair(access_token, refresh_token)?;
        let mut state = self.write_guard();
        if state.epoch != epoch {
            debug!(expected = epoch, current = state.epoch, "session ended, rotated tokens dropped");
            return Ok(false);
        }
        self.store_pair(&mut state, access_token, refresh_token)?;
        Ok(true)
    }

    /// Logout generation; changes every time `clear` runs
    pub fn epoch(&self) -> u64 {
        self.read_state(|state| state.epoch)
    }

    /// Current access token, read at call time
    pub fn access_token(&self) -> Option<String> {
        self.read_state(|state| {
            state
                .session
                .as_ref()
                .filter(|session| session.is_valid())
                .map(|session| session.access_token.clone())
        })
    }

    /// Current refresh token
    pub fn refresh_token(&self) -> Option<String> {
        self.read_state(|state| {
            state
                .session
                .as_ref()
                .map(|session| session.refresh_token.clone())
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Snapshot of the session
    pub fn session(&self) -> Option<Session> {
        self.read_state(|state| state.session.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_state(|state| state.user.clone())
    }

    pub fn set_user(&self, user: UserProfile) {
        self.write_state(|state| {
            if let Some(session) = state.session.as_mut() {
                session.user = Some(user.clone());
            }
            state.user = Some(user);
        });
    }

    /// Log out: cancel the refresh scheduler, drop tokens and profile.
    ///
    /// Safe to call repeatedly.
    pub fn clear(&self) -> Result<()> {
        if let Some(token) = self.take_refresh_task() {
            token.cancel();
            debug!("scheduled refresh cancelled");
        }

        let had_session = {
            let mut state = self.write_guard();
            state.epoch = state.epoch.wrapping_add(1);
            state.user = None;
            let had_session = state.session.take().is_some();
            self.inner
                .storage
                .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
            had_session
        };

        if had_session {
            info!("session cleared");
        }
        Ok(())
    }

    /// Register the cancellation handle of the refresh scheduler.
    ///
    /// A previously registered scheduler is cancelled.
    pub fn attach_refresh_task(&self, token: CancellationToken) {
        let previous = {
            let mut guard = self
                .inner
                .refresh_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.replace(token)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Whether a refresh scheduler is registered and still running
    pub fn has_scheduled_refresh(&self) -> bool {
        let guard = self
            .inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|token| !token.is_cancelled())
    }

    fn take_refresh_task(&self) -> Option<CancellationToken> {
        let mut guard = self
            .inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }

    fn read_state<T>(&self, read: impl FnOnce(&SessionState) -> T) -> T {
        let guard = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        read(&guard)
    }

    fn write_state<T>(&self, write: impl FnOnce(&mut SessionState) -> T) -> T {
        write(&mut self.write_guard())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // storage is written under the state lock so a concurrent clear cannot interleave
    fn store_pair(&self, state: &mut SessionState, access_token: &str, refresh_token: &str) -> Result<()> {
        self.inner.storage.set_many(&[
            (ACCESS_TOKEN_KEY, access_token),
            (REFRESH_TOKEN_KEY, refresh_token),
        ])?;
        state.session = Some(Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            user: state.user.clone(),
            expires_at: token_expiry(access_token),
        });
        debug!("session tokens updated");
        Ok(())
    }
}

fn validate_pair(access_token: &str, refresh_token: &str) -> Result<()> {
    if access_token.is_empty() || refresh_token.is_empty() {
        return Err(SessionError::InvalidResponse(
            "access and refresh tokens must both be present".to_string(),
        ));
    }
    Ok(())
}
