/*
[INPUT]:  Cross-window messages (origin + string or JSON data)
[OUTPUT]: OAuthSignal for messages that belong to the current link attempt
[POS]:    Linking layer - message filtering and classification
[UPDATE]: When the popup callback page changes its message format
*/

use serde_json::{Map, Value};

/// Payload of a `message` event
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Json(Value),
    Text(String),
}

/// A message posted to the page by another window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub data: MessageData,
}

impl WindowMessage {
    pub fn json(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data: MessageData::Json(data),
        }
    }

    pub fn text(origin: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            data: MessageData::Text(data.into()),
        }
    }
}

/// Details carried by a success message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSuccess {
    pub social_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Outcome reported by the popup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthSignal {
    Success(LinkSuccess),
    /// Backend-provided error text, if any
    Failure(Option<String>),
}

/// Fields that make a JSON payload OAuth-relevant
const RECOGNIZED_FIELDS: &[&str] = &[
    "success",
    "status",
    "connected",
    "linked",
    "error",
    "socialId",
    "userId",
    "email",
];

/// Markers of messages posted by browser extensions and dev tooling
const EXTENSION_SIGNATURES: &[&str] = &[
    "react-devtools",
    "metamask-",
    "contentscript",
    "inpage",
    "webpackhotupdate",
    "vite:",
    "__zone_symbol",
    "ethereum#initialized",
];

const SUCCESS_LITERALS: &[&str] = &["success", "linked", "connected", "oauth_success", "oauth-success"];
const FAILURE_LITERALS: &[&str] = &["error", "failed", "failure", "oauth_error", "oauth-error", "cancelled"];

const SUCCESS_STATUSES: &[&str] = &["success", "ok", "linked", "connected"];
const FAILURE_STATUSES: &[&str] = &["error", "failed", "failure", "denied"];

/// Decides which window messages are results of a link attempt
#[derive(Debug, Clone)]
pub struct MessageFilter {
    allowed_origins: Vec<String>,
    dev_mode: bool,
    allow_uncorrelated: bool,
}

impl MessageFilter {
    pub fn new(allowed_origins: Vec<String>, dev_mode: bool, allow_uncorrelated: bool) -> Self {
        let mut normalized: Vec<String> = allowed_origins
            .iter()
            .map(|origin| normalize_origin(origin))
            .filter(|origin| !origin.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            allowed_origins: normalized,
            dev_mode,
            allow_uncorrelated,
        }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Development mode accepts every origin
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.dev_mode
            || self
                .allowed_origins
                .iter()
                .any(|allowed| *allowed == normalize_origin(origin))
    }

    /// Classify a message for the attempt identified by `correlation_id`.
    ///
    /// `None` means the message is ignored without side effects.
    pub fn classify(&self, message: &WindowMessage, correlation_id: &str) -> Option<OAuthSignal> {
        if is_extension_noise(&message.data) {
            return None;
        }
        if !self.origin_allowed(&message.origin) {
            return None;
        }

        let payload = match &message.data {
            MessageData::Json(value) => value.clone(),
            MessageData::Text(text) => match serde_json::from_str::<Value>(text) {
                Ok(value @ Value::Object(_)) => value,
                _ => return self.classify_literal(text),
            },
        };

        match payload {
            Value::Object(map) => self.classify_object(&map, correlation_id),
            Value::String(text) => self.classify_literal(&text),
            _ => None,
        }
    }

    fn classify_literal(&self, text: &str) -> Option<OAuthSignal> {
        // literals cannot carry a correlation id
        if !self.allow_uncorrelated {
            return None;
        }
        let lowered = text.trim().to_ascii_lowercase();
        if SUCCESS_LITERALS.contains(&lowered.as_str()) {
            Some(OAuthSignal::Success(LinkSuccess::default()))
        } else if FAILURE_LITERALS.contains(&lowered.as_str()) {
            Some(OAuthSignal::Failure(None))
        } else {
            None
        }
    }

    fn classify_object(&self, map: &Map<String, Value>, correlation_id: &str) -> Option<OAuthSignal> {
        let correlation = ["state", "correlationId"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str));
        match correlation {
            Some(state) if state != correlation_id => return None,
            Some(_) => {}
            None if !self.allow_uncorrelated => return None,
            None => {}
        }

        if !RECOGNIZED_FIELDS.iter().any(|field| map.contains_key(*field)) {
            return None;
        }

        if is_failure(map) {
            return Some(OAuthSignal::Failure(error_message(map)));
        }
        if is_success(map) {
            return Some(OAuthSignal::Success(LinkSuccess {
                social_id: string_field(map, "socialId"),
                username: string_field(map, "username"),
                email: string_field(map, "email"),
            }));
        }
        None
    }
}

fn is_failure(map: &Map<String, Value>) -> bool {
    let has_error = map.get("error").is_some_and(|error| match error {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    });
    has_error
        || map.get("success") == Some(&Value::Bool(false))
        || status_in(map, FAILURE_STATUSES)
}

fn is_success(map: &Map<String, Value>) -> bool {
    ["success", "connected", "linked"]
        .iter()
        .any(|key| map.get(*key) == Some(&Value::Bool(true)))
        || status_in(map, SUCCESS_STATUSES)
        || ["socialId", "userId", "email"]
            .iter()
            .any(|key| map.get(*key).is_some_and(|value| !value.is_null()))
}

fn status_in(map: &Map<String, Value>, statuses: &[&str]) -> bool {
    map.get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| statuses.contains(&status.to_ascii_lowercase().as_str()))
}

fn error_message(map: &Map<String, Value>) -> Option<String> {
    match map.get("error") {
        Some(Value::String(text)) if !text.is_empty() => return Some(text.clone()),
        Some(Value::Object(inner)) => {
            if let Some(text) = inner.get("message").and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
        _ => {}
    }
    string_field(map, "message")
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn is_extension_noise(data: &MessageData) -> bool {
    let text = match data {
        MessageData::Text(text) => text.to_ascii_lowercase(),
        MessageData::Json(value) => value.to_string().to_ascii_lowercase(),
    };
    EXTENSION_SIGNATURES
        .iter()
        .any(|signature| text.contains(signature))
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const ORIGIN: &str = "https://app.example.com";
    const STATE: &str = "attempt-1";

    fn filter() -> MessageFilter {
        MessageFilter::new(vec![format!("{ORIGIN}/")], false, true)
    }

    #[test]
    fn test_allowed_origins_are_unique() {
        let filter = MessageFilter::new(
            vec![
                "https://api.example.com".to_string(),
                ORIGIN.to_string(),
                "https://API.example.com/".to_string(),
                format!("{ORIGIN}/"),
            ],
            false,
            false,
        );
        assert_eq!(
            filter.allowed_origins(),
            &["https://api.example.com".to_string(), ORIGIN.to_string()]
        );
    }

    #[rstest]
    #[case(json!({"success": true, "socialId": "42", "state": STATE}), true)]
    #[case(json!({"status": "linked"}), true)]
    #[case(json!({"email": "a@b.c"}), true)]
    #[case(json!({"success": false, "error": "denied"}), false)]
    #[case(json!({"error": {"message": "token expired"}}), false)]
    #[case(json!({"status": "FAILED"}), false)]
    fn test_json_payloads(#[case] data: Value, #[case] success: bool) {
        let signal = filter()
            .classify(&WindowMessage::json(ORIGIN, data), STATE)
            .unwrap();
        assert_eq!(matches!(signal, OAuthSignal::Success(_)), success);
    }

    #[test]
    fn test_success_details_are_extracted() {
        let signal = filter().classify(
            &WindowMessage::json(ORIGIN, json!({"linked": true, "socialId": 7, "username": "issuer"})),
            STATE,
        );
        assert_eq!(
            signal,
            Some(OAuthSignal::Success(LinkSuccess {
                social_id: Some("7".to_string()),
                username: Some("issuer".to_string()),
                email: None,
            }))
        );
    }

    #[test]
    fn test_failure_message_is_surfaced() {
        let signal = filter().classify(
            &WindowMessage::text(ORIGIN, r#"{"error":"Account already linked to another issuer"}"#),
            STATE,
        );
        assert_eq!(
            signal,
            Some(OAuthSignal::Failure(Some(
                "Account already linked to another issuer".to_string()
            )))
        );
    }

    #[rstest]
    #[case(WindowMessage::json("https://evil.example", json!({"success": true})))]
    #[case(WindowMessage::json(ORIGIN, json!({"source": "react-devtools-bridge", "success": true})))]
    #[case(WindowMessage::json(ORIGIN, json!({"target": "metamask-inpage", "data": {}})))]
    #[case(WindowMessage::json(ORIGIN, json!({"hello": "world"})))]
    #[case(WindowMessage::json(ORIGIN, json!({"success": true, "state": "other-attempt"})))]
    #[case(WindowMessage::json(ORIGIN, json!({"status": "pending"})))]
    #[case(WindowMessage::text(ORIGIN, "ready"))]
    #[case(WindowMessage::json(ORIGIN, json!(42)))]
    fn test_ignored_messages(#[case] message: WindowMessage) {
        assert_eq!(filter().classify(&message, STATE), None);
    }

    #[rstest]
    #[case("success", true)]
    #[case(" Connected ", true)]
    #[case("oauth_error", false)]
    fn test_literal_keywords(#[case] text: &str, #[case] success: bool) {
        let signal = filter()
            .classify(&WindowMessage::text(ORIGIN, text), STATE)
            .unwrap();
        assert_eq!(matches!(signal, OAuthSignal::Success(_)), success);
    }

    #[test]
    fn test_dev_mode_bypasses_origin_check() {
        let dev = MessageFilter::new(vec![], true, true);
        assert!(dev
            .classify(&WindowMessage::json("http://localhost:5173", json!({"success": true})), STATE)
            .is_some());
    }

    #[test]
    fn test_strict_correlation_requires_state() {
        let strict = MessageFilter::new(vec![ORIGIN.to_string()], false, false);
        assert_eq!(
            strict.classify(&WindowMessage::json(ORIGIN, json!({"success": true})), STATE),
            None
        );
        assert_eq!(strict.classify(&WindowMessage::text(ORIGIN, "success"), STATE), None);
        assert!(strict
            .classify(
                &WindowMessage::json(ORIGIN, json!({"success": true, "correlationId": STATE})),
                STATE
            )
            .is_some());
    }
}
