/*
[INPUT]:  Error sources (HTTP, backend API, wallet, payload validation, popups, storage)
[OUTPUT]: Structured error taxonomy with retry hints and user-facing messages
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

use crate::tx::PayloadError;

/// Main error type for the issuer session adapter
#[derive(Error, Debug)]
pub enum SessionError {
    /// HTTP request failed at the transport level
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Network failure that is not a reqwest error (e.g. unexpected status with no body)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned an error response; message is carried verbatim
    #[error("{message}")]
    Api { status: u16, message: String },

    /// No access token available for an authenticated call
    #[error("Not authenticated")]
    Unauthorized,

    /// Refresh token was rejected; the session has been cleared
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// Transaction payload failed validation before any wallet call
    #[error("Invalid transaction payload: {0}")]
    Validation(#[from] PayloadError),

    /// Nonce challenge or signature could not be used
    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    /// Wallet or account is missing
    #[error("Wallet not connected: {0}")]
    Connection(String),

    /// User rejected the request or the wallet failed to sign
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Operation did not complete in time
    #[error("{operation} timed out after {duration_secs}s")]
    Timeout {
        operation: &'static str,
        duration_secs: u64,
    },

    /// Wallet adapter kept failing with a known internal-error signature
    #[error("Wallet adapter error: {0}")]
    AdapterInternal(String),

    /// Account cannot cover the transaction
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Any other transaction failure
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Popup window could not be opened
    #[error("Popup blocked: {0}")]
    PopupBlocked(String),

    /// Third-party account linking reported a failure
    #[error("Linking {provider} failed: {message}")]
    LinkFailed { provider: String, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Durable storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Check if the error is worth retrying from a polling loop
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Http(_)
                | SessionError::Network(_)
                | SessionError::Timeout { .. }
                | SessionError::AdapterInternal(_)
        ) || matches!(self, SessionError::Api { status, .. } if *status >= 500)
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SessionError::Unauthorized | SessionError::SessionExpired
        ) || matches!(self, SessionError::Api { status: 401, .. })
    }

    /// Human-readable text for a toast-style notification
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Http(_) | SessionError::Network(_) => {
                "Network error, please check your connection and try again".to_string()
            }
            SessionError::Api { message, .. } => message.clone(),
            SessionError::Signing(_) => "Request was rejected in the wallet".to_string(),
            SessionError::Timeout { .. } => {
                "The request took too long, please try again".to_string()
            }
            SessionError::InsufficientFunds(_) => {
                "Insufficient balance to complete this transaction".to_string()
            }
            SessionError::PopupBlocked(_) => {
                "Popup was blocked, please allow popups for this site".to_string()
            }
            SessionError::LinkFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        SessionError::Api {
            status: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_err = SessionError::Timeout {
            operation: "transaction",
            duration_secs: 30,
        };
        assert!(timeout_err.is_retryable());
        assert!(SessionError::api_error(StatusCode::BAD_GATEWAY, "upstream").is_retryable());

        assert!(!SessionError::SessionExpired.is_retryable());
        assert!(!SessionError::Signing("User rejected".into()).is_retryable());
    }

    #[test]
    fn test_error_is_auth_error() {
        assert!(SessionError::SessionExpired.is_auth_error());
        assert!(SessionError::api_error(StatusCode::UNAUTHORIZED, "jwt expired").is_auth_error());
        assert!(!SessionError::PopupBlocked("window.open".into()).is_auth_error());
    }

    #[test]
    fn test_api_error_keeps_backend_message() {
        let err = SessionError::api_error(StatusCode::BAD_REQUEST, "Nonce expired");
        assert_eq!(err.to_string(), "Nonce expired");
        assert_eq!(err.user_message(), "Nonce expired");
        match err {
            SessionError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Nonce expired");
            }
            _ => panic!("Expected Api error variant"),
        }
    }
}
