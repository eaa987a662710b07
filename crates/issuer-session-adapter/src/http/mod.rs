/*
[INPUT]:  HTTP client configuration, SessionStore and backend endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication with the issuer backend
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod auth;
pub mod client;
pub mod error;
pub mod issuer;
pub mod refresh;

pub use error::{Result, SessionError};
pub use refresh::{DEFAULT_REFRESH_INTERVAL, RefreshConfig};

pub use client::{ApiClient, ClientConfig};
