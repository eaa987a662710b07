/*
[INPUT]:  Backend JSON payloads for users, links and score history
[OUTPUT]: Typed domain models shared by session, wallet and linking layers
[POS]:    Data layer - core domain models
[UPDATE]: When backend models change or new fields are consumed
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated user profile returned by wallet login
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub primary_wallet: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Issuer profile (GET /issuer/me)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerProfile {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub score: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A third-party identity linked to the issuer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLink {
    pub provider: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub social_id: Option<String>,
    #[serde(default)]
    pub linked_at: Option<String>,
    /// Synthesized locally before the backend confirmed the link
    #[serde(skip)]
    pub optimistic: bool,
}

impl SocialLink {
    /// Check whether this record belongs to the given provider (case-insensitive)
    pub fn is_provider(&self, provider: &str) -> bool {
        self.provider.eq_ignore_ascii_case(provider)
    }
}

/// An additional wallet linked to the issuer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLink {
    pub address: String,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub linked_at: Option<String>,
}

/// One entry of the issuer score history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePoint {
    pub score: Decimal,
    pub recorded_at: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_profile_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "id": 7,
            "primaryWallet": "0xabc",
            "role": "issuer"
        });
        let user: UserProfile = serde_json::from_value(raw).unwrap();
        assert_eq!(user.primary_wallet.as_deref(), Some("0xabc"));
        assert_eq!(user.id, Some(serde_json::json!(7)));
        assert_eq!(user.extra.get("role"), Some(&serde_json::json!("issuer")));
    }

    #[test]
    fn test_score_point_decimal() {
        let raw = r#"{"score": 12.5, "recordedAt": "2024-01-01T00:00:00Z"}"#;
        let point: ScorePoint = serde_json::from_str(raw).unwrap();
        assert_eq!(point.score, "12.5".parse::<Decimal>().unwrap());
        assert!(point.reason.is_none());
    }

    #[test]
    fn test_social_link_provider_match() {
        let link = SocialLink {
            provider: "Twitter".to_string(),
            username: None,
            social_id: None,
            linked_at: None,
            optimistic: false,
        };
        assert!(link.is_provider("twitter"));
        assert!(!link.is_provider("discord"));
    }
}
