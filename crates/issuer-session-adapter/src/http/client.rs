/*
[INPUT]:  HTTP configuration (base URL, timeouts) and the SessionStore
[OUTPUT]: Configured reqwest client ready for backend calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::http::{Result, SessionError};
use crate::session::SessionStore;

/// Default backend base URL
const DEFAULT_BASE_URL: &str = "http://localhost:3001/api/";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Main HTTP client for the issuer backend
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    base_url: Url,
    session: SessionStore,
    // single-flight guard shared by periodic and 401-triggered refreshes
    pub(crate) refresh_lock: Mutex<()>,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(session: SessionStore) -> Result<Self> {
        Self::with_config(ClientConfig::default(), session)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, session: SessionStore) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: normalize_base_url(&config.base_url)?,
            session,
            refresh_lock: Mutex::new(()),
        })
    }

    /// The session this client reads tokens from
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Origin of the backend (scheme://host[:port])
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    /// Build full URL for an endpoint relative to the base path
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }

    /// Build request builder for an unauthenticated endpoint
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client.request(method, url)
    }

    /// Send a request and decode a JSON body, mapping non-2xx to `Api` errors
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }

        serde_json::from_str(&body).map_err(|err| {
            SessionError::InvalidResponse(format!("unexpected response body ({err}): {body}"))
        })
    }

    /// Send an authenticated request.
    ///
    /// The access token is read from the session for every attempt. A 401
    /// triggers one refresh and one retry.
    pub(crate) async fn send_authed_json<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = self.usable_access_token().await?;

        let first = self
            .send_json(self.authed_builder(method.clone(), url.clone(), body, &token))
            .await;

        match first {
            Err(SessionError::Api { status: 401, .. }) => {
                debug!(url = %url, "access token rejected, refreshing");
                let token = self.refresh_after(Some(token)).await?;
                self.send_json(self.authed_builder(method, url, body, &token))
                    .await
            }
            other => other,
        }
    }

    /// Access token for a request, refreshing first when only the refresh token is left
    pub(crate) async fn usable_access_token(&self) -> Result<String> {
        match self.session.access_token() {
            Some(token) => Ok(token),
            None if self.session.refresh_token().is_some() => self.refresh_after(None).await,
            None => Err(SessionError::Unauthorized),
        }
    }

    fn authed_builder<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        token: &str,
    ) -> RequestBuilder {
        let builder = self.request(method, url).bearer_auth(token);
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Extract the backend's own error message; it is shown to users verbatim
pub(crate) fn error_from_body(status: StatusCode, body: &str) -> SessionError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| extract_message(&value))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    SessionError::api_error(status, message)
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
    for key in ["message", "error", "detail"] {
        match value.get(key) {
            Some(serde_json::Value::String(text)) if !text.is_empty() => {
                return Some(text.clone());
            }
            Some(serde_json::Value::Array(items)) => {
                let parts: Vec<&str> = items.iter().filter_map(|item| item.as_str()).collect();
                if !parts.is_empty() {
                    return Some(parts.join(", "));
                }
            }
            Some(nested @ serde_json::Value::Object(_)) => {
                if let Some(text) = extract_message(nested) {
                    return Some(text);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStorage;
    use std::sync::Arc;

    fn client(base_url: &str) -> ApiClient {
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        let config = ClientConfig {
            base_url: base_url.to_string(),
            ..ClientConfig::default()
        };
        ApiClient::with_config(config, session).unwrap()
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let client = client("https://backend.example.com/api");
        let url = client.endpoint_url("/auth/nonce").unwrap();
        assert_eq!(url.as_str(), "https://backend.example.com/api/auth/nonce");
        assert_eq!(client.origin(), "https://backend.example.com");
    }

    #[test]
    fn test_error_from_body_prefers_backend_message() {
        let err = error_from_body(StatusCode::BAD_REQUEST, r#"{"message": "Invalid signature"}"#);
        assert_eq!(err.to_string(), "Invalid signature");

        let err = error_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"message": ["nonce must be a string", "address is required"]}"#,
        );
        assert_eq!(err.to_string(), "nonce must be a string, address is required");

        let err = error_from_body(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.to_string(), "Internal Server Error");
    }
}
