//! ShareGrid backend protocol
//!
//! Wire types for the chat call every contributed node exposes. The backend is
//! an opaque HTTP/JSON service; only the fields the coordinator reads or writes
//! are modelled here.

use serde::{Deserialize, Serialize};

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Body of `POST {endpoint}/api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatRequest {
    /// Build a non-streaming chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
        }
    }
}

/// Message part of a chat response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Body returned by the chat call
///
/// Backends answer either with a structured `message` or with a flat
/// `response` string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub response: Option<String>,
}

impl ChatResponse {
    /// Extract the generated text
    ///
    /// Prefers a non-empty `message.content`, then `response`, then the empty string.
    pub fn into_text(self) -> String {
        let content = self
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty());

        content.or(self.response).unwrap_or_default()
    }
}

/// One entry of the backend's installed-model listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

/// Body of `GET {endpoint}/api/tags`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

impl TagsResponse {
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_not_streaming() {
        let request = ChatRequest::new("llama3.1:8b", vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], serde_json::json!(false));
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_response_prefers_message_content() {
        let body = r#"{"message": {"role": "assistant", "content": "structured"}, "response": "flat"}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.into_text(), "structured");
    }

    #[test]
    fn test_response_falls_back_to_flat_field() {
        let response: ChatResponse = serde_json::from_str(r#"{"response": "flat"}"#).unwrap();
        assert_eq!(response.into_text(), "flat");

        let empty_content: ChatResponse =
            serde_json::from_str(r#"{"message": {"content": ""}, "response": "flat"}"#).unwrap();
        assert_eq!(empty_content.into_text(), "flat");
    }

    #[test]
    fn test_response_without_text_is_empty() {
        let response: ChatResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(response.into_text(), "");
    }

    #[test]
    fn test_tags_model_names() {
        let body = r#"{"models": [{"name": "mistral"}, {"name": "llama3.1:8b", "size": 1}]}"#;
        let tags: TagsResponse = serde_json::from_str(body).unwrap();

        assert_eq!(tags.model_names(), vec!["mistral", "llama3.1:8b"]);
    }
}
