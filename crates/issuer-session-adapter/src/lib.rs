/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public issuer session adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod http;
pub mod link;
pub mod session;
pub mod tx;
pub mod types;
pub mod wallet;

// Re-export commonly used types from auth
pub use auth::{AuthPhase, ChallengeAuthenticator, LoginOutcome, NonceChallenge, NormalizedSignature};

// Re-export commonly used types from http
pub use http::{ApiClient, ClientConfig, RefreshConfig, Result, SessionError};

// Re-export commonly used types from session
pub use session::{FileStorage, MemoryStorage, Session, SessionStore, TokenStorage};

// Re-export commonly used types from wallet
pub use wallet::{
    KeypairWallet, MockWallet, ProviderWallet, WalletAccount, WalletCapability, WalletCoordinator,
    WalletError,
};

// Re-export commonly used types from tx
pub use tx::{EntryFunctionPayload, GatewayConfig, PayloadError, TransactionGateway};

// Re-export commonly used types from link
pub use link::{LinkOutcome, LinkingConfig, LinkingOrchestrator, UnlinkOutcome};

// Re-export all types
pub use types::*;
