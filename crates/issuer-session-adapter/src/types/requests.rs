/*
[INPUT]:  Session and signature data assembled by the auth layer
[OUTPUT]: Serializable request bodies for auth endpoints
[POS]:    Data layer - request type definitions
[UPDATE]: When request parameters change
*/

use serde::Serialize;

use crate::auth::NormalizedSignature;

/// POST /auth/wallet-login body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLoginRequest {
    pub address: String,
    pub public_key: String,
    pub signature: NormalizedSignature,
    pub message: String,
    pub nonce: String,
    pub full_message: String,
}

/// POST /auth/refresh-token body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}
