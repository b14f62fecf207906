//! Core data types exchanged with the frontend, the model backend, and the
//! document store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single chat turn. Fields other than `role` and `content` (`images`,
/// `tool_calls`, ...) are carried through to the backend as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Sampling parameters as the frontend sends them (camelCase).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Inbound chat request. A missing model means "use the configured default".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: Option<ChatOptions>,
}

/// Options forwarded to the backend. Unset fields are omitted so the backend
/// applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl BackendOptions {
    /// Keep only the parameters the caller provided; `None` if that is nothing.
    pub fn from_request(options: &ChatOptions) -> Option<Self> {
        let normalized = Self {
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };
        if normalized == Self::default() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BackendOptions>,
}

/// Response of `GET /api/tags`.
#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Option<Vec<ModelTag>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelTag {
    #[serde(default)]
    pub name: Option<String>,
}

/// A required collection and the index it carries.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub index: IndexSpec,
}

#[derive(Debug, Clone, Copy)]
pub enum IndexSpec {
    Descending(&'static str),
    Unique(&'static str),
}

pub const REQUIRED_COLLECTIONS: [CollectionSchema; 3] = [
    CollectionSchema {
        name: "conversations",
        index: IndexSpec::Descending("timestamp"),
    },
    CollectionSchema {
        name: "agents",
        index: IndexSpec::Unique("id"),
    },
    CollectionSchema {
        name: "settings",
        index: IndexSpec::Unique("id"),
    },
];

pub const SETTINGS_ID: &str = "app-settings";

/// The singleton preferences record in the `settings` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    pub id: String,
    pub theme: String,
    pub language: String,
    pub default_model: String,
    pub save_conversations: bool,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            theme: "system".to_string(),
            language: "en".to_string(),
            default_model: "llama3.2:latest".to_string(),
            save_conversations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_accepts_camel_case_options() {
        let req: ChatRequest = serde_json::from_value(serde_json::json!({
            "model": "llama3.2:latest",
            "messages": [{"role": "user", "content": "hi"}],
            "options": {"temperature": 0.5, "topP": 0.8, "maxTokens": 64}
        }))
        .unwrap();

        let options = req.options.unwrap();
        assert_eq!(options.top_p, Some(0.8));
        assert_eq!(options.max_tokens, Some(64));
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_chat_message_keeps_extra_fields() {
        let req: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": "look", "images": ["aGk="]}]
        }))
        .unwrap();

        let message = &req.messages[0];
        assert_eq!(message.extra["images"], serde_json::json!(["aGk="]));
        assert_eq!(
            serde_json::to_value(message).unwrap(),
            serde_json::json!({"role": "user", "content": "look", "images": ["aGk="]})
        );
    }

    #[test]
    fn test_chat_request_null_options_are_unset() {
        let req: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [],
            "options": {"temperature": null, "topP": 0.9}
        }))
        .unwrap();
        assert_eq!(req.model, None);
        let options = req.options.unwrap();
        assert_eq!(options.temperature, None);
        assert_eq!(options.top_p, Some(0.9));
    }

    #[test]
    fn test_backend_options_only_keep_provided_keys() {
        let options = ChatOptions {
            temperature: Some(0.5),
            ..Default::default()
        };
        let normalized = BackendOptions::from_request(&options).unwrap();
        assert_eq!(
            serde_json::to_value(&normalized).unwrap(),
            serde_json::json!({"temperature": 0.5})
        );
    }

    #[test]
    fn test_backend_options_empty_is_none() {
        assert_eq!(BackendOptions::from_request(&ChatOptions::default()), None);
    }

    #[test]
    fn test_settings_document_serializes_camel_case() {
        let value = serde_json::to_value(SettingsDocument::default()).unwrap();
        assert_eq!(value["id"], "app-settings");
        assert_eq!(value["defaultModel"], "llama3.2:latest");
        assert_eq!(value["saveConversations"], true);
    }
}
