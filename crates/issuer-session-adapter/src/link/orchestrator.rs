/*
[INPUT]:  Provider name, popup host, message source, link backend
[OUTPUT]: Link outcome plus the in-memory list of linked identities
[POS]:    Linking layer - popup OAuth linking with racing detection channels
[UPDATE]: When detection channels, polling cadence or reconciliation rules change
*/

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::http::{ApiClient, Result, SessionError};
use crate::link::attempt::{AttemptRegistry, FinalizeReason, LinkAttempt, LinkPhase};
use crate::link::message::{LinkSuccess, MessageFilter, OAuthSignal, WindowMessage};
use crate::link::popup::{MessageSource, PopupFeatures, PopupHost};
use crate::types::{SocialLink, UnlinkResponse};

/// Substrings of a readable popup URL that report the outcome
const URL_SUCCESS_MARKERS: &[&str] = &[
    "success=true",
    "status=success",
    "linked=true",
    "connected=true",
    "/success",
];
const URL_FAILURE_MARKERS: &[&str] = &["error=", "status=error", "denied", "/failure"];

/// Backend endpoints the orchestrator needs
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Origin the backend's popup pages post messages from
    fn origin(&self) -> String;

    /// Popup target; may refresh the session first
    async fn link_url(&self, provider: &str, origin: &str, state: &str) -> Result<Url>;

    async fn social_links(&self) -> Result<Vec<SocialLink>>;

    async fn unlink(&self, provider: &str) -> Result<UnlinkResponse>;
}

#[async_trait]
impl LinkBackend for ApiClient {
    fn origin(&self) -> String {
        ApiClient::origin(self)
    }

    async fn link_url(&self, provider: &str, origin: &str, state: &str) -> Result<Url> {
        ApiClient::link_url(self, provider, origin, state).await
    }

    async fn social_links(&self) -> Result<Vec<SocialLink>> {
        ApiClient::social_links(self).await
    }

    async fn unlink(&self, provider: &str) -> Result<UnlinkResponse> {
        self.unlink_provider(provider).await
    }
}

/// Asks the user before a destructive action
pub trait Confirmation: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirmation for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Linking configuration
#[derive(Debug, Clone)]
pub struct LinkingConfig {
    /// Origin of the page hosting the client; sent to the backend and allowed for messages
    pub page_origin: String,
    /// Known deployment origins besides the backend and the page
    pub allowed_origins: Vec<String>,
    /// Accept messages from any origin
    pub dev_mode: bool,
    pub popup_poll_interval: Duration,
    pub backend_poll_interval: Duration,
    /// Absolute bound on one attempt
    pub timeout: Duration,
    /// Delay before the authoritative refetch after an optimistic success
    pub refetch_delay: Duration,
    pub popup_width: u32,
    pub popup_height: u32,
    /// Accept messages that carry no correlation id, for backends that do not echo `state`
    pub allow_uncorrelated_messages: bool,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            page_origin: "http://localhost:3000".to_string(),
            allowed_origins: Vec::new(),
            dev_mode: false,
            popup_poll_interval: Duration::from_secs(1),
            backend_poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(5 * 60),
            refetch_delay: Duration::from_millis(1500),
            popup_width: 600,
            popup_height: 700,
            allow_uncorrelated_messages: false,
        }
    }
}

/// Result of `start_link`
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// The link record, optimistic until the refetch replaces it
    Linked(SocialLink),
    /// No popup was opened
    AlreadyLinked { notice: String },
    /// The user closed the popup and the backend shows no link
    Cancelled,
    /// A newer attempt for the same provider took over
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkOutcome {
    Unlinked,
    Declined,
}

/// How the detection loop ended
#[derive(Debug)]
enum Resolution {
    /// Message or popup URL reported an outcome
    Signal(OAuthSignal),
    /// Backend lists the provider
    Confirmed(Vec<SocialLink>),
    /// Popup closed without the backend showing a link
    Closed,
    TimedOut,
    Superseded,
}

/// Runs popup OAuth link attempts and owns the linked-identity list
pub struct LinkingOrchestrator {
    backend: Arc<dyn LinkBackend>,
    host: Arc<dyn PopupHost>,
    messages: Arc<dyn MessageSource>,
    config: LinkingConfig,
    filter: MessageFilter,
    links: Arc<RwLock<Vec<SocialLink>>>,
    registry: Arc<AttemptRegistry>,
    // replaced after each shutdown so later attempts run normally
    shutdown: Mutex<CancellationToken>,
}

impl LinkingOrchestrator {
    pub fn new(
        backend: Arc<dyn LinkBackend>,
        host: Arc<dyn PopupHost>,
        messages: Arc<dyn MessageSource>,
        config: LinkingConfig,
    ) -> Self {
        let mut origins = vec![backend.origin(), config.page_origin.clone()];
        origins.extend(config.allowed_origins.iter().cloned());
        let filter = MessageFilter::new(
            origins,
            config.dev_mode,
            config.allow_uncorrelated_messages,
        );

        Self {
            backend,
            host,
            messages,
            config,
            filter,
            links: Arc::new(RwLock::new(Vec::new())),
            registry: Arc::new(AttemptRegistry::new()),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &LinkingConfig {
        &self.config
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    /// Snapshot of the linked identities
    pub fn links(&self) -> Vec<SocialLink> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_linked(&self, provider: &str) -> bool {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|link| link.is_provider(provider))
    }

    pub fn is_loading(&self, provider: &str) -> bool {
        self.registry.is_loading(provider)
    }

    /// Replace the list with the backend's
    pub async fn refresh_links(&self) -> Result<Vec<SocialLink>> {
        let fresh = self.backend.social_links().await?;
        self.replace_links(fresh.clone());
        Ok(fresh)
    }

    /// Cancel running attempts and pending refetches (logout)
    pub fn shutdown(&self) {
        let previous = {
            let mut guard = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, CancellationToken::new())
        };
        previous.cancel();
        self.registry.cancel_all();
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Link `provider` through a popup.
    ///
    /// Resolves on the first of: a classified message, a readable popup URL
    /// reporting the outcome, the popup closing (reconciled with the backend),
    /// the backend listing the provider, the absolute timeout, or a newer
    /// attempt for the same provider.
    pub async fn start_link(&self, provider: &str) -> Result<LinkOutcome> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(SessionError::LinkFailed {
                provider: String::new(),
                message: "provider is required".to_string(),
            });
        }
        if self.is_linked(provider) {
            info!(provider, "provider already linked, not opening popup");
            return Ok(LinkOutcome::AlreadyLinked {
                notice: format!("{provider} is already connected"),
            });
        }

        let shutdown = self.shutdown_token();
        let id = Uuid::new_v4();
        let url = self
            .backend
            .link_url(provider, &self.config.page_origin, &id.to_string())
            .await?;
        let features = PopupFeatures::centered(
            &self.host.screen(),
            self.config.popup_width,
            self.config.popup_height,
        );

        let timers = self.registry.begin(provider, id);
        let Some(popup) = self.host.open(&url, &format!("link_{provider}"), &features) else {
            self.registry.clear_if_owner(provider, id);
            warn!(provider, "link popup was blocked");
            return Err(SessionError::PopupBlocked(provider.to_string()));
        };
        let (listener, mut inbox) = self.messages.add_listener();
        let mut attempt = LinkAttempt::new(
            id,
            provider,
            popup,
            listener,
            self.messages.clone(),
            self.registry.clone(),
            timers,
        );
        info!(provider, attempt = %id, "link popup opened");

        let resolution = self.watch(&mut attempt, &mut inbox).await;
        self.settle(&mut attempt, resolution, &shutdown)
    }

    /// Disconnect `provider` after the user confirms
    pub async fn unlink(&self, provider: &str, confirmation: &dyn Confirmation) -> Result<UnlinkOutcome> {
        if !confirmation.confirm(&format!("Disconnect your {provider} account?")) {
            debug!(provider, "unlink declined");
            return Ok(UnlinkOutcome::Declined);
        }

        let response = self.backend.unlink(provider).await?;
        if response.is_success() {
            self.links
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|link| !link.is_provider(provider));
            info!(provider, "provider unlinked");
            return Ok(UnlinkOutcome::Unlinked);
        }

        let message = response
            .error
            .or(response.message)
            .unwrap_or_else(|| format!("Failed to unlink {provider}"));
        warn!(provider, reason = %message, "unlink rejected");
        Err(SessionError::LinkFailed {
            provider: provider.to_string(),
            message,
        })
    }

    async fn watch(
        &self,
        attempt: &mut LinkAttempt,
        inbox: &mut UnboundedReceiver<WindowMessage>,
    ) -> Resolution {
        let timers = attempt.timers().clone();
        let correlation_id = attempt.correlation_id();
        let provider = attempt.provider().to_string();

        let start = Instant::now();
        let mut popup_poll = interval_at(
            start + self.config.popup_poll_interval,
            self.config.popup_poll_interval,
        );
        popup_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backend_poll = interval_at(
            start + self.config.backend_poll_interval,
            self.config.backend_poll_interval,
        );
        backend_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep(self.config.timeout);
        tokio::pin!(deadline);
        let mut inbox_open = true;

        loop {
            tokio::select! {
                _ = timers.cancelled() => return Resolution::Superseded,
                _ = &mut deadline => {
                    attempt.transition(LinkPhase::TimedOut);
                    return Resolution::TimedOut;
                }
                message = inbox.recv(), if inbox_open => match message {
                    Some(message) => {
                        if let Some(signal) = self.filter.classify(&message, &correlation_id) {
                            attempt.transition(LinkPhase::MessageReceived);
                            return Resolution::Signal(signal);
                        }
                        debug!(provider = %provider, origin = %message.origin, "ignoring window message");
                    }
                    None => inbox_open = false,
                },
                _ = popup_poll.tick() => {
                    if attempt.popup_closed() {
                        attempt.transition(LinkPhase::PopupClosed);
                        return match self.fetch_if_linked(&provider).await {
                            Some(links) => Resolution::Confirmed(links),
                            None => Resolution::Closed,
                        };
                    }
                    if let Some(signal) = attempt.popup_location().as_deref().and_then(signal_from_location) {
                        attempt.transition(LinkPhase::UrlChanged);
                        return Resolution::Signal(signal);
                    }
                }
                _ = backend_poll.tick() => {
                    if let Some(links) = self.fetch_if_linked(&provider).await {
                        return Resolution::Confirmed(links);
                    }
                }
            }
        }
    }

    fn settle(
        &self,
        attempt: &mut LinkAttempt,
        resolution: Resolution,
        shutdown: &CancellationToken,
    ) -> Result<LinkOutcome> {
        let provider = attempt.provider().to_string();
        match resolution {
            Resolution::Signal(OAuthSignal::Success(details)) => {
                let link = self.append_optimistic(&provider, details);
                attempt.finalize(FinalizeReason::Linked);
                self.schedule_refetch();
                info!(provider = %provider, "provider linked");
                Ok(LinkOutcome::Linked(link))
            }
            Resolution::Confirmed(links) => {
                attempt.finalize(FinalizeReason::Linked);
                let link = links
                    .iter()
                    .find(|link| link.is_provider(&provider))
                    .cloned();
                self.replace_links(links);
                info!(provider = %provider, "provider link confirmed by backend");
                link.map(LinkOutcome::Linked).ok_or_else(|| {
                    SessionError::InvalidResponse(format!("{provider} missing from link list"))
                })
            }
            Resolution::Signal(OAuthSignal::Failure(message)) => {
                attempt.finalize(FinalizeReason::Failed);
                let message = message.unwrap_or_else(|| format!("Failed to link {provider}"));
                warn!(provider = %provider, reason = %message, "provider link failed");
                Err(SessionError::LinkFailed { provider, message })
            }
            Resolution::Closed => {
                attempt.finalize(FinalizeReason::Cancelled);
                info!(provider = %provider, "link popup closed without linking");
                Ok(LinkOutcome::Cancelled)
            }
            Resolution::TimedOut => {
                attempt.finalize(FinalizeReason::TimedOut);
                warn!(provider = %provider, "link attempt timed out");
                Err(SessionError::Timeout {
                    operation: "link",
                    duration_secs: self.config.timeout.as_secs(),
                })
            }
            Resolution::Superseded => {
                attempt.finalize(FinalizeReason::Superseded);
                if shutdown.is_cancelled() {
                    Ok(LinkOutcome::Cancelled)
                } else {
                    Ok(LinkOutcome::Superseded)
                }
            }
        }
    }

    async fn fetch_if_linked(&self, provider: &str) -> Option<Vec<SocialLink>> {
        match self.backend.social_links().await {
            Ok(links) if links.iter().any(|link| link.is_provider(provider)) => Some(links),
            Ok(_) => None,
            Err(err) => {
                debug!(provider, error = %err, "link status poll failed");
                None
            }
        }
    }

    fn append_optimistic(&self, provider: &str, details: LinkSuccess) -> SocialLink {
        let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = links.iter().find(|link| link.is_provider(provider)) {
            return existing.clone();
        }
        let link = SocialLink {
            provider: provider.to_string(),
            username: details.username.or(details.email),
            social_id: details.social_id,
            linked_at: Some(Utc::now().to_rfc3339()),
            optimistic: true,
        };
        links.push(link.clone());
        link
    }

    fn replace_links(&self, fresh: Vec<SocialLink>) {
        *self.links.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    fn schedule_refetch(&self) {
        let backend = self.backend.clone();
        let links = self.links.clone();
        let shutdown = self.shutdown_token();
        let delay = self.config.refetch_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = sleep(delay) => match backend.social_links().await {
                    Ok(fresh) => {
                        *links.write().unwrap_or_else(PoisonError::into_inner) = fresh;
                    }
                    Err(err) => warn!(error = %err, "link list refetch failed"),
                },
            }
        });
    }
}

fn signal_from_location(location: &str) -> Option<OAuthSignal> {
    let lowered = location.to_ascii_lowercase();
    if URL_FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        Some(OAuthSignal::Failure(None))
    } else if URL_SUCCESS_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        Some(OAuthSignal::Success(LinkSuccess::default()))
    } else {
        None
    }
}

impl std::fmt::Debug for LinkingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkingOrchestrator")
            .field("config", &self.config)
            .field("links", &self.links())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::{MockLinkBackend, MockPopupHost};
    use crate::link::popup::{ChannelMessageSource, ScreenGeometry};
    use serde_json::json;

    const API_ORIGIN: &str = "https://api.test";
    const PAGE_ORIGIN: &str = "https://app.test";

    struct Harness {
        backend: Arc<MockLinkBackend>,
        host: Arc<MockPopupHost>,
        source: Arc<ChannelMessageSource>,
        orchestrator: Arc<LinkingOrchestrator>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MockLinkBackend::new(API_ORIGIN));
        let host = Arc::new(MockPopupHost::new());
        let source = Arc::new(ChannelMessageSource::new());
        let config = LinkingConfig {
            page_origin: PAGE_ORIGIN.to_string(),
            ..LinkingConfig::default()
        };
        let orchestrator = Arc::new(LinkingOrchestrator::new(
            backend.clone(),
            host.clone(),
            source.clone(),
            config,
        ));
        Harness {
            backend,
            host,
            source,
            orchestrator,
        }
    }

    fn spawn_link(
        orchestrator: &Arc<LinkingOrchestrator>,
        provider: &'static str,
    ) -> tokio::task::JoinHandle<Result<LinkOutcome>> {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_link(provider).await })
    }

    #[tokio::test]
    async fn test_already_linked_opens_no_popup() {
        let h = harness();
        h.backend.add_link("twitter", "issuer");
        h.orchestrator.refresh_links().await.unwrap();

        let outcome = h.orchestrator.start_link("Twitter").await.unwrap();
        assert!(matches!(outcome, LinkOutcome::AlreadyLinked { .. }));
        assert_eq!(h.host.open_count(), 0);
        assert_eq!(h.source.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_url_carries_token_origin_and_state() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "discord");
        sleep(Duration::from_millis(10)).await;

        let opened = h.host.last().unwrap();
        let query: Vec<(String, String)> = opened.url.query_pairs().into_owned().collect();
        assert!(query.contains(&("origin".to_string(), PAGE_ORIGIN.to_string())));
        assert!(query.iter().any(|(key, _)| key == "token"));
        assert!(Uuid::parse_str(&h.host.last_state().unwrap()).is_ok());
        assert_eq!((opened.features.width, opened.features.height), (600, 700));
        assert!(h.orchestrator.is_loading("discord"));

        opened.popup.user_close();
        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_success_is_optimistic_then_refetched() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;

        let state = h.host.last_state().unwrap();
        h.source.post(WindowMessage::json(
            API_ORIGIN,
            json!({"success": true, "username": "issuer", "state": state}),
        ));

        let LinkOutcome::Linked(link) = task.await.unwrap().unwrap() else {
            panic!("expected linked outcome");
        };
        assert!(link.optimistic);
        assert_eq!(link.username.as_deref(), Some("issuer"));
        assert!(h.orchestrator.links()[0].optimistic);
        assert!(!h.orchestrator.is_loading("twitter"));
        assert_eq!(h.source.removal_count(), 1);
        assert_eq!(h.host.last().unwrap().popup.close_calls(), 1);

        h.backend.add_link("twitter", "issuer_real");
        sleep(Duration::from_secs(2)).await;
        let links = h.orchestrator.links();
        assert_eq!(links.len(), 1);
        assert!(!links[0].optimistic);
        assert_eq!(links[0].username.as_deref(), Some("issuer_real"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_message_surfaces_backend_error() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;

        let state = h.host.last_state().unwrap();
        h.source.post(WindowMessage::text(
            PAGE_ORIGIN,
            format!(r#"{{"success":false,"error":"Account already linked","state":"{state}"}}"#),
        ));

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::LinkFailed { ref message, .. } if message == "Account already linked"
        ));
        assert!(h.orchestrator.links().is_empty());
        assert!(!h.orchestrator.is_loading("twitter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_popup_reconciles_as_linked() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;

        let popup = h.host.last().unwrap().popup;
        popup.navigate_cross_origin();
        h.backend.add_link("twitter", "issuer");
        popup.user_close();

        let LinkOutcome::Linked(link) = task.await.unwrap().unwrap() else {
            panic!("expected linked outcome");
        };
        assert!(!link.optimistic);
        assert_eq!(h.backend.fetch_count(), 1);
        assert_eq!(h.source.removal_count(), 1);
        assert_eq!(popup.close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_popup_reconciles_as_cancelled() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.host.last().unwrap().popup.user_close();

        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
        assert_eq!(h.source.removal_count(), 1);
        assert_eq!(h.source.listener_count(), 0);
        assert!(!h.orchestrator.is_loading("twitter"));
        assert!(h.orchestrator.links().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_poll_detects_silent_link() {
        let h = harness();
        let started = Instant::now();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.host.last().unwrap().popup.navigate_cross_origin();
        h.backend.add_link("twitter", "issuer");

        assert!(matches!(
            task.await.unwrap().unwrap(),
            LinkOutcome::Linked(_)
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(h.host.last().unwrap().popup.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_callback_url_signals_success() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.host
            .last()
            .unwrap()
            .popup
            .navigate("https://app.test/oauth/callback?success=true");

        assert!(matches!(
            task.await.unwrap().unwrap(),
            LinkOutcome::Linked(SocialLink { optimistic: true, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_finalizes_once() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.host.last().unwrap().popup.navigate_cross_origin();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                operation: "link",
                duration_secs: 300
            }
        ));
        assert_eq!(h.source.removal_count(), 1);
        assert_eq!(h.host.last().unwrap().popup.close_calls(), 1);
        assert!(h.backend.fetch_count() >= 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_attempt_supersedes_older() {
        let h = harness();
        let first = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        let second = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;

        assert_eq!(first.await.unwrap().unwrap(), LinkOutcome::Superseded);
        assert!(h.orchestrator.is_loading("twitter"));
        assert_eq!(h.source.listener_count(), 1);

        let state = h.host.last_state().unwrap();
        h.source.post(WindowMessage::json(
            API_ORIGIN,
            json!({"linked": true, "state": state}),
        ));
        assert!(matches!(second.await.unwrap().unwrap(), LinkOutcome::Linked(_)));
        assert!(!h.orchestrator.is_loading("twitter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncorrelated_or_stale_messages_are_ignored() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;

        h.source.post(WindowMessage::json(
            API_ORIGIN,
            json!({"success": true, "state": "stale-attempt"}),
        ));
        h.source.post(WindowMessage::json(API_ORIGIN, json!({"success": true})));
        h.source.post(WindowMessage::text(API_ORIGIN, "success"));
        sleep(Duration::from_millis(10)).await;
        assert!(h.orchestrator.is_loading("twitter"));

        h.host.last().unwrap().popup.user_close();
        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_popup_with_unreachable_backend_is_cancelled() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.backend.fail_fetches("connection reset");
        h.host.last().unwrap().popup.user_close();

        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
        assert!(!h.orchestrator.is_loading("twitter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_attempt() {
        let h = harness();
        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        h.orchestrator.shutdown();

        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
        assert_eq!(h.source.listener_count(), 0);
        assert_eq!(h.host.last().unwrap().popup.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_links_work_normally_after_shutdown() {
        let h = harness();
        h.orchestrator.shutdown();

        let task = spawn_link(&h.orchestrator, "twitter");
        sleep(Duration::from_millis(10)).await;
        let state = h.host.last_state().unwrap();
        h.source.post(WindowMessage::json(
            API_ORIGIN,
            json!({"success": true, "username": "issuer", "state": state}),
        ));
        assert!(matches!(task.await.unwrap().unwrap(), LinkOutcome::Linked(_)));

        h.backend.add_link("twitter", "issuer_real");
        sleep(Duration::from_secs(5)).await;
        assert!(!h.orchestrator.links()[0].optimistic);
        assert!(h.backend.fetch_count() >= 1);

        let first = spawn_link(&h.orchestrator, "discord");
        sleep(Duration::from_millis(10)).await;
        let second = spawn_link(&h.orchestrator, "discord");
        sleep(Duration::from_millis(10)).await;
        assert_eq!(first.await.unwrap().unwrap(), LinkOutcome::Superseded);

        h.orchestrator.shutdown();
        assert_eq!(second.await.unwrap().unwrap(), LinkOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_is_centered_on_screen() {
        let backend = Arc::new(MockLinkBackend::new(API_ORIGIN));
        let host = Arc::new(MockPopupHost::new().with_screen(ScreenGeometry {
            left: 100,
            top: 0,
            width: 1000,
            height: 800,
        }));
        let orchestrator = Arc::new(LinkingOrchestrator::new(
            backend,
            host.clone(),
            Arc::new(ChannelMessageSource::new()),
            LinkingConfig::default(),
        ));
        let task = spawn_link(&orchestrator, "github");
        sleep(Duration::from_millis(10)).await;

        let opened = host.last().unwrap();
        assert_eq!(opened.name, "link_github");
        assert_eq!((opened.features.left, opened.features.top), (300, 50));
        opened.popup.user_close();
        assert_eq!(task.await.unwrap().unwrap(), LinkOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_refresh_links_replaces_list() {
        let h = harness();
        h.backend.add_link("twitter", "issuer");
        h.orchestrator.refresh_links().await.unwrap();
        assert!(h.orchestrator.is_linked("twitter"));

        h.backend.set_links(Vec::new());
        assert!(h.orchestrator.refresh_links().await.unwrap().is_empty());
        assert!(!h.orchestrator.is_linked("twitter"));
    }

    #[tokio::test]
    async fn test_blocked_popup() {
        let h = harness();
        h.host.block_popups();

        let err = h.orchestrator.start_link("twitter").await.unwrap_err();
        assert!(matches!(err, SessionError::PopupBlocked(_)));
        assert!(!h.orchestrator.is_loading("twitter"));
        assert_eq!(h.source.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unlink_requires_confirmation() {
        let h = harness();
        h.backend.add_link("twitter", "issuer");
        h.orchestrator.refresh_links().await.unwrap();

        let declined = h.orchestrator.unlink("twitter", &|_: &str| false).await.unwrap();
        assert_eq!(declined, UnlinkOutcome::Declined);
        assert_eq!(h.backend.unlink_count(), 0);

        let unlinked = h.orchestrator.unlink("twitter", &|_: &str| true).await.unwrap();
        assert_eq!(unlinked, UnlinkOutcome::Unlinked);
        assert!(h.orchestrator.links().is_empty());
    }

    #[tokio::test]
    async fn test_unlink_failure_keeps_link() {
        let h = harness();
        h.backend.add_link("twitter", "issuer");
        h.orchestrator.refresh_links().await.unwrap();
        h.backend.set_unlink_response(UnlinkResponse {
            success: Some(false),
            message: None,
            error: Some("Cannot unlink primary identity".to_string()),
        });

        let err = h
            .orchestrator
            .unlink("twitter", &|_: &str| true)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Cannot unlink primary identity");
        assert_eq!(h.orchestrator.links().len(), 1);
    }
}
