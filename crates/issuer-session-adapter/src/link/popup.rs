/*
[INPUT]:  Link URLs, screen geometry, posted window messages
[OUTPUT]: Popup handles and per-listener message channels
[POS]:    Linking layer - host windowing surface behind traits
[UPDATE]: When the host environment exposes new window capabilities
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::link::message::WindowMessage;

/// Available screen area the popup is centered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// Position and size of a popup window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl PopupFeatures {
    /// Center a `width` x `height` popup on the screen, clamped to its origin
    pub fn centered(screen: &ScreenGeometry, width: u32, height: u32) -> Self {
        let offset = |outer: u32, inner: u32| (i64::from(outer) - i64::from(inner)).max(0) / 2;
        Self {
            left: screen.left + offset(screen.width, width) as i32,
            top: screen.top + offset(screen.height, height) as i32,
            width,
            height,
        }
    }

    /// `window.open` feature string
    pub fn to_feature_string(&self) -> String {
        format!(
            "width={},height={},left={},top={},scrollbars=yes,resizable=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Reading popup state after it navigated to another origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("popup state is not readable across origins")]
pub struct CrossOriginError;

/// Handle to an opened popup
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> Result<bool, CrossOriginError>;

    /// Current location, `None` while still on the blank page
    fn location(&self) -> Result<Option<String>, CrossOriginError>;

    fn close(&self);
}

/// Opens popups
pub trait PopupHost: Send + Sync {
    fn screen(&self) -> ScreenGeometry;

    /// `None` when the popup was blocked
    fn open(&self, url: &Url, name: &str, features: &PopupFeatures) -> Option<Arc<dyn PopupWindow>>;
}

pub type ListenerId = u64;

/// Page-level `message` event registration
pub trait MessageSource: Send + Sync {
    fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<WindowMessage>);

    fn remove_listener(&self, id: ListenerId);
}

/// MessageSource fan-out over in-process channels
#[derive(Debug, Default)]
pub struct ChannelMessageSource {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<WindowMessage>>>,
    removals: AtomicUsize,
}

impl ChannelMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every registered listener; returns how many received it
    pub fn post(&self, message: WindowMessage) -> usize {
        let mut guard = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, sender| !sender.is_closed());
        guard
            .values()
            .filter(|sender| sender.send(message.clone()).is_ok())
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of `remove_listener` calls that removed a live listener
    pub fn removal_count(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl MessageSource for ChannelMessageSource {
    fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<WindowMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        (id, rx)
    }

    fn remove_listener(&self, id: ListenerId) {
        let removed = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
    }
}
