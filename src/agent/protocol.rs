use crate::chat::{ChatRequest, Language, ServiceContext};
use crate::intent::Intent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies this portal to the assistant service.
pub const PLATFORM_TAG: &str = "salone-portal";

/// Used when a successful reply carries no usable text.
pub const NO_REPLY_TEXT: &str =
    "I'm having trouble responding right now. Please try again in a moment.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub message: String,
    pub conversation_id: String,
    pub metadata: AssistantMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMetadata {
    pub service_context: ServiceContext,
    pub language: Language,
    pub context_data: String,
    pub intent: Intent,
    pub platform: String,
}

impl AssistantRequest {
    pub fn new(request: &ChatRequest, intent: Intent, context_data: &str) -> Self {
        Self {
            message: request.message.clone(),
            conversation_id: conversation_id(request),
            metadata: AssistantMetadata {
                service_context: request.service_context,
                language: request.language_preference,
                context_data: context_data.to_string(),
                intent,
                platform: PLATFORM_TAG.to_string(),
            },
        }
    }
}

/// Body of a successful assistant call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AssistantReply {
    /// `response`, then `message`, then a stock apology. Blank fields are
    /// skipped.
    pub fn into_text(self) -> String {
        self.response
            .filter(|s| !s.trim().is_empty())
            .or(self.message.filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| NO_REPLY_TEXT.to_string())
    }
}

/// The caller's conversation id, else its session id, else a fresh
/// `conv_<unix millis>_<random>` id.
pub fn conversation_id(request: &ChatRequest) -> String {
    request
        .conversation_id
        .as_deref()
        .or(request.session_id.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_conversation_id)
}

fn generate_conversation_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("conv_{}_{}", millis, &suffix[..8])
}
