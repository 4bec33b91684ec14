use crate::intent::Intent;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// One prior turn supplied by the chat widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en", alias = "english", alias = "English")]
    English,
    #[serde(rename = "kri", alias = "krio", alias = "Krio")]
    Krio,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Krio => "kri",
        }
    }
}

/// Section of the portal the chat widget was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceContext {
    #[default]
    General,
    Business,
    Jobs,
    Health,
    Career,
    Government,
    Truth,
    /// Anything the widget sent that this service does not know about.
    #[serde(other)]
    Unrecognized,
}

impl ServiceContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceContext::General => "general",
            ServiceContext::Business => "business",
            ServiceContext::Jobs => "jobs",
            ServiceContext::Health => "health",
            ServiceContext::Career => "career",
            ServiceContext::Government => "government",
            ServiceContext::Truth => "truth",
            ServiceContext::Unrecognized => "unrecognized",
        }
    }

    /// Human name of the portal section, used in fallback copy.
    pub fn label(&self) -> &'static str {
        match self {
            ServiceContext::General | ServiceContext::Unrecognized => "Services",
            ServiceContext::Business => "Business Directory",
            ServiceContext::Jobs => "Jobs Board",
            ServiceContext::Health => "Health Finder",
            ServiceContext::Career => "Career Tools",
            ServiceContext::Government => "Government Services",
            ServiceContext::Truth => "Truth Engine",
        }
    }
}

impl fmt::Display for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound chat turn.
///
/// Every field is lenient: a missing, null or mistyped value takes its
/// default instead of failing the request. A missing `message` therefore
/// deserializes as empty and is rejected by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(default, deserialize_with = "lenient")]
    pub language_preference: Language,
    #[serde(default, deserialize_with = "lenient")]
    pub service_context: ServiceContext,
    #[serde(default, deserialize_with = "lenient_id")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Reads a request out of an already parsed JSON body. Anything that is
    /// not an object yields an empty request.
    pub fn from_json(value: Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: ServiceContext) -> Self {
        self.service_context = context;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Opaque ids arrive as strings, but numbers are kept too.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub suggestions: Vec<String>,
    pub intent: Intent,
    pub context: ServiceContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub context_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Length of a session title before it is cut.
pub const TITLE_LIMIT: usize = 50;

impl ChatSession {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        context: ServiceContext,
        first_message: &str,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            context_type: context.as_str().to_string(),
            title: session_title(first_message),
            created_at: Utc::now(),
        }
    }
}

/// First [`TITLE_LIMIT`] characters of the opening message, with an ellipsis
/// when anything was cut.
pub fn session_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(TITLE_LIMIT).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub language: Language,
    pub intent: Option<Intent>,
    pub context_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(
        session_id: impl Into<String>,
        content: impl Into<String>,
        language: Language,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: MessageRole::User,
            content: content.into(),
            language,
            intent: None,
            context_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        session_id: impl Into<String>,
        content: impl Into<String>,
        language: Language,
        intent: Intent,
        context_data: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            language,
            intent: Some(intent),
            context_data: Some(context_data),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_kept_when_short() {
        assert_eq!(session_title("Find me a clinic"), "Find me a clinic");
    }

    #[test]
    fn title_is_cut_at_fifty_chars() {
        let long = "a".repeat(60);
        let title = session_title(&long);
        assert_eq!(title, format!("{}…", "a".repeat(50)));
    }

    #[test]
    fn title_of_exactly_fifty_chars_has_no_ellipsis() {
        let exact = "b".repeat(50);
        assert_eq!(session_title(&exact), exact);
    }

    #[test]
    fn title_counts_characters_not_bytes() {
        let krio = "é".repeat(55);
        let title = session_title(&krio);
        assert_eq!(title.chars().count(), 51);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: ChatRequest = serde_json::from_str(
            r#"{
                "message": "hello",
                "conversationHistory": [{"role": "user", "content": "hi"}],
                "languagePreference": "kri",
                "serviceContext": "jobs",
                "sessionId": "s-1"
            }"#,
        )
        .unwrap();
        assert_eq!(req.message, "hello");
        assert_eq!(req.conversation_history.len(), 1);
        assert_eq!(req.language_preference, Language::Krio);
        assert_eq!(req.service_context, ServiceContext::Jobs);
        assert_eq!(req.session_id.as_deref(), Some("s-1"));
        assert!(req.conversation_id.is_none());
    }

    #[test]
    fn unknown_service_context_is_accepted() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message": "hi", "serviceContext": "unknown-context"}"#,
        )
        .unwrap();
        assert_eq!(req.service_context, ServiceContext::Unrecognized);
    }

    #[test]
    fn missing_message_is_empty() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_empty());
        assert_eq!(req.service_context, ServiceContext::General);
        assert_eq!(req.language_preference, Language::English);
    }

    #[test]
    fn off_shape_advisory_fields_take_defaults() {
        let req = ChatRequest::from_json(serde_json::json!({
            "message": "hello",
            "languagePreference": "fr",
            "serviceContext": null,
            "conversationHistory": [{"role": "user"}],
            "sessionId": 42,
            "conversationId": {"nested": true},
        }));
        assert_eq!(req.message, "hello");
        assert_eq!(req.language_preference, Language::English);
        assert_eq!(req.service_context, ServiceContext::General);
        assert_eq!(req.conversation_history.len(), 1);
        assert_eq!(req.conversation_history[0].content, "");
        assert_eq!(req.session_id.as_deref(), Some("42"));
        assert!(req.conversation_id.is_none());
    }

    #[test]
    fn null_language_and_mistyped_history_are_tolerated() {
        let req = ChatRequest::from_json(serde_json::json!({
            "message": "hi",
            "languagePreference": null,
            "conversationHistory": "not a list",
        }));
        assert_eq!(req.language_preference, Language::English);
        assert!(req.conversation_history.is_empty());
    }

    #[test]
    fn non_object_body_is_an_empty_request() {
        assert!(ChatRequest::from_json(serde_json::json!(["hello"])).message.is_empty());
        assert!(ChatRequest::from_json(serde_json::json!("hello")).message.is_empty());
        assert!(ChatRequest::from_json(serde_json::json!({"message": 7})).message.is_empty());
    }
}
