/*
[INPUT]:  Bearer token (read from the SessionStore at call time), provider names
[OUTPUT]: Issuer profile, linked identities, score history, popup link URLs
[POS]:    HTTP layer - issuer endpoints (require auth)
[UPDATE]: When adding new issuer endpoints or changing response shapes
*/

use reqwest::{Method, Url};

use crate::http::{ApiClient, Result, SessionError};
use crate::types::{IssuerProfile, ListEnvelope, ScorePoint, SocialLink, UnlinkResponse, WalletLink};

impl ApiClient {
    /// GET /issuer/me
    pub async fn me(&self) -> Result<IssuerProfile> {
        let url = self.endpoint_url("issuer/me")?;
        self.send_authed_json::<_, ()>(Method::GET, url, None).await
    }

    /// GET /issuer/me/social-links
    pub async fn social_links(&self) -> Result<Vec<SocialLink>> {
        let url = self.endpoint_url("issuer/me/social-links")?;
        let links: ListEnvelope<SocialLink> =
            self.send_authed_json::<_, ()>(Method::GET, url, None).await?;
        Ok(links.into_vec())
    }

    /// GET /issuer/me/wallet-links
    pub async fn wallet_links(&self) -> Result<Vec<WalletLink>> {
        let url = self.endpoint_url("issuer/me/wallet-links")?;
        let links: ListEnvelope<WalletLink> =
            self.send_authed_json::<_, ()>(Method::GET, url, None).await?;
        Ok(links.into_vec())
    }

    /// GET /issuer/me/score-history
    pub async fn score_history(&self) -> Result<Vec<ScorePoint>> {
        let url = self.endpoint_url("issuer/me/score-history")?;
        let points: ListEnvelope<ScorePoint> =
            self.send_authed_json::<_, ()>(Method::GET, url, None).await?;
        Ok(points.into_vec())
    }

    /// Popup target for linking a provider
    ///
    /// GET /issuer/me/link/{provider}?token={access}&origin={origin}&state={state}
    ///
    /// The popup cannot send headers, so the access token rides in the query.
    /// An expired access token is refreshed first.
    pub async fn link_url(&self, provider: &str, origin: &str, state: &str) -> Result<Url> {
        let mut url = self.provider_url("issuer/me/link", provider)?;
        let token = self.usable_access_token().await?;
        url.query_pairs_mut()
            .append_pair("token", &token)
            .append_pair("origin", origin)
            .append_pair("state", state);
        Ok(url)
    }

    /// POST /issuer/me/unlink/{provider}
    pub async fn unlink_provider(&self, provider: &str) -> Result<UnlinkResponse> {
        let url = self.provider_url("issuer/me/unlink", provider)?;
        self.send_authed_json(Method::POST, url, Some(&serde_json::json!({})))
            .await
    }

    /// `{endpoint}/{provider}` with the provider as one encoded path segment
    fn provider_url(&self, endpoint: &str, provider: &str) -> Result<Url> {
        if provider.is_empty() || provider == "." || provider == ".." {
            return Err(SessionError::LinkFailed {
                provider: provider.to_string(),
                message: "invalid provider name".to_string(),
            });
        }
        let mut url = self.endpoint_url(endpoint)?;
        let url_str = url.to_string();
        url.path_segments_mut()
            .map_err(|_| SessionError::Config(format!("base URL cannot hold a path: {url_str}")))?
            .push(provider);
        Ok(url)
    }
}
