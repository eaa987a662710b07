/*
[INPUT]:  Wallet address, signed challenge, refresh token
[OUTPUT]: Nonce challenges and token pairs
[POS]:    HTTP layer - auth endpoints (no bearer token)
[UPDATE]: When auth endpoints or payloads change
*/

use reqwest::Method;

use crate::http::{ApiClient, Result};
use crate::types::{
    LoginResponse, NonceResponse, RefreshResponse, RefreshTokenRequest, WalletLoginRequest,
};

impl ApiClient {
    /// Fetch a login challenge for a wallet
    ///
    /// GET /auth/nonce?wallet_address={address}
    pub async fn request_nonce(&self, wallet_address: &str) -> Result<NonceResponse> {
        let mut url = self.endpoint_url("auth/nonce")?;
        url.query_pairs_mut()
            .append_pair("wallet_address", wallet_address);
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Exchange a signed challenge for a token pair
    ///
    /// POST /auth/wallet-login
    pub async fn wallet_login(&self, body: &WalletLoginRequest) -> Result<LoginResponse> {
        let url = self.endpoint_url("auth/wallet-login")?;
        self.send_json(self.request(Method::POST, url).json(body))
            .await
    }

    /// Rotate the token pair
    ///
    /// POST /auth/refresh-token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let url = self.endpoint_url("auth/refresh-token")?;
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }
}
