/*
[INPUT]:  Popup handle, message listener, per-provider loading registry
[OUTPUT]: One link attempt whose cleanup runs exactly once
[POS]:    Linking layer - attempt state machine and loading flags
[UPDATE]: When attempt phases or cleanup duties change
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::link::popup::{ListenerId, MessageSource, PopupWindow};

/// Phase of a link attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    PopupOpened,
    MessageReceived,
    PopupClosed,
    UrlChanged,
    TimedOut,
    Finalizing,
    Idle,
}

/// Why an attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeReason {
    Linked,
    Failed,
    Cancelled,
    TimedOut,
    Superseded,
}

#[derive(Debug)]
struct ActiveAttempt {
    id: Uuid,
    cancel: CancellationToken,
}

/// Per-provider loading flags, each owned by one attempt
#[derive(Debug, Default)]
pub struct AttemptRegistry {
    active: Mutex<HashMap<String, ActiveAttempt>>,
}

impl AttemptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `provider` as loading for attempt `id`, cancelling any attempt it supersedes
    pub fn begin(&self, provider: &str, id: Uuid) -> CancellationToken {
        let cancel = CancellationToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                provider_key(provider),
                ActiveAttempt {
                    id,
                    cancel: cancel.clone(),
                },
            );
        if let Some(previous) = previous {
            debug!(provider, superseded = %previous.id, "superseding link attempt");
            previous.cancel.cancel();
        }
        cancel
    }

    pub fn is_loading(&self, provider: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&provider_key(provider))
    }

    /// Attempt currently owning the provider's loading flag
    pub fn current(&self, provider: &str) -> Option<Uuid> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider_key(provider))
            .map(|attempt| attempt.id)
    }

    /// Clear the flag only if attempt `id` still owns it
    pub fn clear_if_owner(&self, provider: &str, id: Uuid) -> bool {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let key = provider_key(provider);
        if guard.get(&key).is_some_and(|attempt| attempt.id == id) {
            guard.remove(&key);
            true
        } else {
            false
        }
    }

    /// Cancel every running attempt
    pub fn cancel_all(&self) {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        for attempt in guard.values() {
            attempt.cancel.cancel();
        }
    }
}

fn provider_key(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}

/// A single popup link attempt.
///
/// Every detection channel ends in [`LinkAttempt::finalize`]; only the first
/// call has effects. Dropping an unfinished attempt finalizes it as cancelled.
pub struct LinkAttempt {
    id: Uuid,
    provider: String,
    phase: LinkPhase,
    popup: Option<Arc<dyn PopupWindow>>,
    listener: Option<ListenerId>,
    messages: Arc<dyn MessageSource>,
    registry: Arc<AttemptRegistry>,
    timers: CancellationToken,
    finalized: Option<FinalizeReason>,
}

impl LinkAttempt {
    pub fn new(
        id: Uuid,
        provider: &str,
        popup: Arc<dyn PopupWindow>,
        listener: ListenerId,
        messages: Arc<dyn MessageSource>,
        registry: Arc<AttemptRegistry>,
        timers: CancellationToken,
    ) -> Self {
        Self {
            id,
            provider: provider.to_string(),
            phase: LinkPhase::PopupOpened,
            popup: Some(popup),
            listener: Some(listener),
            messages,
            registry,
            timers,
            finalized: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Correlation id sent to the popup as `state`
    pub fn correlation_id(&self) -> String {
        self.id.to_string()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// Cancelled on finalize and when a newer attempt supersedes this one
    pub fn timers(&self) -> &CancellationToken {
        &self.timers
    }

    pub fn finalized(&self) -> Option<&FinalizeReason> {
        self.finalized.as_ref()
    }

    pub fn transition(&mut self, phase: LinkPhase) {
        if self.finalized.is_none() {
            debug!(provider = %self.provider, attempt = %self.id, from = ?self.phase, to = ?phase, "link phase");
            self.phase = phase;
        }
    }

    /// Cross-origin reads count as "still open"
    pub fn popup_closed(&self) -> bool {
        self.popup
            .as_ref()
            .is_some_and(|popup| popup.is_closed().unwrap_or(false))
    }

    /// Readable popup location; blank pages and cross-origin reads yield `None`
    pub fn popup_location(&self) -> Option<String> {
        let popup = self.popup.as_ref()?;
        match popup.location() {
            Ok(Some(location)) if location != "about:blank" && !location.is_empty() => {
                Some(location)
            }
            _ => None,
        }
    }

    /// Cancel timers, remove the listener, close the popup and release the
    /// loading flag. Returns `false` if the attempt was already finalized.
    pub fn finalize(&mut self, reason: FinalizeReason) -> bool {
        if self.finalized.is_some() {
            return false;
        }
        self.phase = LinkPhase::Finalizing;

        self.timers.cancel();
        if let Some(listener) = self.listener.take() {
            self.messages.remove_listener(listener);
        }
        if let Some(popup) = self.popup.take() {
            if !popup.is_closed().unwrap_or(false) {
                popup.close();
            }
        }
        let released = self.registry.clear_if_owner(&self.provider, self.id);

        debug!(
            provider = %self.provider,
            attempt = %self.id,
            reason = ?reason,
            released,
            "link attempt finalized"
        );
        self.finalized = Some(reason);
        self.phase = LinkPhase::Idle;
        true
    }
}

impl Drop for LinkAttempt {
    fn drop(&mut self) {
        self.finalize(FinalizeReason::Cancelled);
    }
}

impl std::fmt::Debug for LinkAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkAttempt")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("phase", &self.phase)
            .field("finalized", &self.finalized)
            .finish()
    }
}
