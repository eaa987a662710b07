/*
[INPUT]:  Scripted popup behavior and backend link lists
[OUTPUT]: PopupHost, PopupWindow and LinkBackend test doubles
[POS]:    Linking layer - mocks for tests and demos
[UPDATE]: When the linking traits change
*/

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use url::Url;

use crate::http::{Result, SessionError};
use crate::link::orchestrator::LinkBackend;
use crate::link::popup::{CrossOriginError, PopupFeatures, PopupHost, PopupWindow, ScreenGeometry};
use crate::types::{SocialLink, UnlinkResponse};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PopupLocation {
    Blank,
    CrossOrigin,
    Url(String),
}

/// Popup whose location and closed state are driven by the test
#[derive(Debug)]
pub struct MockPopup {
    closed: AtomicBool,
    location: Mutex<PopupLocation>,
    close_calls: AtomicUsize,
}

impl MockPopup {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            location: Mutex::new(PopupLocation::Blank),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// The user closed the window
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Navigated to the third-party domain; state reads now fail
    pub fn navigate_cross_origin(&self) {
        *lock(&self.location) = PopupLocation::CrossOrigin;
    }

    /// Navigated to a readable same-origin URL
    pub fn navigate(&self, url: &str) {
        *lock(&self.location) = PopupLocation::Url(url.to_string());
    }

    /// Calls to `close` made by the code under test
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl PopupWindow for MockPopup {
    fn is_closed(&self) -> std::result::Result<bool, CrossOriginError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(true);
        }
        match *lock(&self.location) {
            PopupLocation::CrossOrigin => Err(CrossOriginError),
            _ => Ok(false),
        }
    }

    fn location(&self) -> std::result::Result<Option<String>, CrossOriginError> {
        match &*lock(&self.location) {
            PopupLocation::Blank => Ok(Some("about:blank".to_string())),
            PopupLocation::CrossOrigin => Err(CrossOriginError),
            PopupLocation::Url(url) => Ok(Some(url.clone())),
        }
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A popup opened through [`MockPopupHost`]
#[derive(Debug, Clone)]
pub struct OpenedPopup {
    pub url: Url,
    pub name: String,
    pub features: PopupFeatures,
    pub popup: Arc<MockPopup>,
}

/// Records opened popups; can simulate a popup blocker
#[derive(Debug, Default)]
pub struct MockPopupHost {
    screen: ScreenGeometry,
    blocked: AtomicBool,
    opened: Mutex<Vec<OpenedPopup>>,
}

impl MockPopupHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(mut self, screen: ScreenGeometry) -> Self {
        self.screen = screen;
        self
    }

    pub fn block_popups(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<OpenedPopup> {
        lock(&self.opened).clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.opened).len()
    }

    pub fn last(&self) -> Option<OpenedPopup> {
        lock(&self.opened).last().cloned()
    }

    /// `state` query parameter of the most recent popup URL
    pub fn last_state(&self) -> Option<String> {
        let opened = self.last()?;
        opened
            .url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
    }
}

impl PopupHost for MockPopupHost {
    fn screen(&self) -> ScreenGeometry {
        self.screen
    }

    fn open(&self, url: &Url, name: &str, features: &PopupFeatures) -> Option<Arc<dyn PopupWindow>> {
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        let popup = Arc::new(MockPopup::new());
        lock(&self.opened).push(OpenedPopup {
            url: url.clone(),
            name: name.to_string(),
            features: *features,
            popup: popup.clone(),
        });
        Some(popup)
    }
}

/// In-memory backend for the link endpoints
#[derive(Debug)]
pub struct MockLinkBackend {
    origin: String,
    links: Mutex<Vec<SocialLink>>,
    fetch_error: Mutex<Option<String>>,
    unlink_response: Mutex<UnlinkResponse>,
    fetches: AtomicUsize,
    unlinks: AtomicUsize,
}

impl MockLinkBackend {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            links: Mutex::new(Vec::new()),
            fetch_error: Mutex::new(None),
            unlink_response: Mutex::new(UnlinkResponse {
                success: Some(true),
                message: None,
                error: None,
            }),
            fetches: AtomicUsize::new(0),
            unlinks: AtomicUsize::new(0),
        }
    }

    /// Replace the server-side link list
    pub fn set_links(&self, links: Vec<SocialLink>) {
        *lock(&self.links) = links;
    }

    pub fn add_link(&self, provider: &str, username: &str) {
        lock(&self.links).push(SocialLink {
            provider: provider.to_string(),
            username: Some(username.to_string()),
            social_id: None,
            linked_at: None,
            optimistic: false,
        });
    }

    pub fn fail_fetches(&self, message: &str) {
        *lock(&self.fetch_error) = Some(message.to_string());
    }

    pub fn set_unlink_response(&self, response: UnlinkResponse) {
        *lock(&self.unlink_response) = response;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn unlink_count(&self) -> usize {
        self.unlinks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkBackend for MockLinkBackend {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    async fn link_url(&self, provider: &str, origin: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.origin)?.join("issuer/me/link/")?;
        url.path_segments_mut()
            .map_err(|_| SessionError::Config(format!("origin cannot hold a path: {}", self.origin)))?
            .pop_if_empty()
            .push(provider);
        url.query_pairs_mut()
            .append_pair("token", "mock-token")
            .append_pair("origin", origin)
            .append_pair("state", state);
        Ok(url)
    }

    async fn social_links(&self) -> Result<Vec<SocialLink>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.fetch_error).clone() {
            return Err(SessionError::Network(message));
        }
        Ok(lock(&self.links).clone())
    }

    async fn unlink(&self, provider: &str) -> Result<UnlinkResponse> {
        self.unlinks.fetch_add(1, Ordering::SeqCst);
        let response = lock(&self.unlink_response).clone();
        if response.is_success() {
            lock(&self.links).retain(|link| !link.is_provider(provider));
        }
        Ok(response)
    }
}
