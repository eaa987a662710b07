/*
[INPUT]:  Backend JSON responses
[OUTPUT]: Typed response structs
[POS]:    Data layer - response type definitions
[UPDATE]: When API response format changes
*/

use serde::Deserialize;

use crate::types::UserProfile;

/// GET /auth/nonce response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub message: String,
}

/// POST /auth/wallet-login response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// POST /auth/refresh-token response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// POST /issuer/me/unlink/:provider response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnlinkResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl UnlinkResponse {
    /// Recognized success shapes: `{success: true}` or a message without an error
    pub fn is_success(&self) -> bool {
        match self.success {
            Some(success) => success && self.error.is_none(),
            None => self.error.is_none() && self.message.is_some(),
        }
    }
}

/// List endpoints answer either with a bare array or `{data: [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) | ListEnvelope::Wrapped { data: items } => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlink_success_shapes() {
        let ok: UnlinkResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(ok.is_success());

        let msg: UnlinkResponse =
            serde_json::from_str(r#"{"message": "twitter unlinked"}"#).unwrap();
        assert!(msg.is_success());

        let err: UnlinkResponse =
            serde_json::from_str(r#"{"success": false, "error": "not linked"}"#).unwrap();
        assert!(!err.is_success());
    }

    #[test]
    fn test_list_envelope_accepts_both_shapes() {
        let bare: ListEnvelope<u32> = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(bare.into_vec(), vec![1, 2]);

        let wrapped: ListEnvelope<u32> = serde_json::from_str(r#"{"data": [3]}"#).unwrap();
        assert_eq!(wrapped.into_vec(), vec![3]);
    }
}
