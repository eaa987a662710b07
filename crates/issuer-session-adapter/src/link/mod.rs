/*
[INPUT]:  Popup host, window messages, issuer link endpoints
[OUTPUT]: Linked third-party identities
[POS]:    Linking layer - popup OAuth linking
[UPDATE]: When adding detection channels or host integrations
*/

pub mod attempt;
pub mod message;
pub mod mock;
pub mod orchestrator;
pub mod popup;

pub use attempt::{AttemptRegistry, FinalizeReason, LinkAttempt, LinkPhase};
pub use message::{LinkSuccess, MessageData, MessageFilter, OAuthSignal, WindowMessage};
pub use mock::{MockLinkBackend, MockPopup, MockPopupHost, OpenedPopup};
pub use orchestrator::{
    Confirmation, LinkBackend, LinkOutcome, LinkingConfig, LinkingOrchestrator, UnlinkOutcome,
};
pub use popup::{
    ChannelMessageSource, CrossOriginError, ListenerId, MessageSource, PopupFeatures, PopupHost,
    PopupWindow, ScreenGeometry,
};
