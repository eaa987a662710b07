/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for issuer-session-adapter tests

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use issuer_session_adapter::{
    ApiClient, ChallengeAuthenticator, ClientConfig, MemoryStorage, SessionStore, WalletCoordinator,
};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client against the mock server with in-memory token storage
pub fn mock_client(server: &MockServer) -> Arc<ApiClient> {
    mock_client_with_session(server, SessionStore::new(Arc::new(MemoryStorage::new())))
}

pub fn mock_client_with_session(server: &MockServer, session: SessionStore) -> Arc<ApiClient> {
    let config = ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    };
    Arc::new(ApiClient::with_config(config, session).expect("client init"))
}

#[allow(dead_code)]
pub fn coordinator_for(client: &Arc<ApiClient>) -> WalletCoordinator {
    let authenticator = Arc::new(ChallengeAuthenticator::new(client.clone()));
    WalletCoordinator::new(client.session().clone(), authenticator)
}

/// Unsigned JWT whose `exp` lies `expires_in_secs` from now
#[allow(dead_code)]
pub fn mock_jwt_token(expires_in_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + expires_in_secs;
    let claims = URL_SAFE_NO_PAD.encode(json!({"sub": "issuer", "exp": exp}).to_string());
    format!("{header}.{claims}.signature")
}

/// Transfer payload accepted by the gateway
#[allow(dead_code)]
pub fn transfer_payload() -> Value {
    json!({
        "type": "entry_function_payload",
        "function": "0x1::bonding_curve::buy",
        "typeArguments": [],
        "arguments": ["0xissuer", "1000"],
    })
}

/// Fresh path under the temp directory
#[allow(dead_code)]
pub fn temp_path(file: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("issuer-session-it-{}", uuid::Uuid::new_v4()));
    path.push(file);
    path
}
