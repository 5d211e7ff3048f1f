//! Chat history as received over HTTP, and its translation into the
//! strictly alternating user/assistant turns a language model expects.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A message in the wire shape used by chat UIs.
///
/// `content` may be absent when the text lives in `parts`, e.g.
/// `{"role":"user","parts":[{"type":"text","text":"hi"}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<serde_json::Value>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// `content` if present, otherwise the `text` of the first part whose
    /// `type` is `"text"`.
    pub fn text(&self) -> Option<&str> {
        if let Some(content) = &self.content {
            return Some(content.as_str());
        }
        self.parts
            .as_ref()?
            .iter()
            .find(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    User,
    Assistant,
}

impl ModelRole {
    fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
}

impl ModelMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Assistant,
            content: content.into(),
        }
    }
}

/// Translate chat history into model turns.
///
/// Order is preserved. Messages with an unknown role or no text are
/// dropped, and adjacent turns of the same role are merged with a blank
/// line so roles strictly alternate. Fails when no user turn survives.
pub fn to_model_messages(messages: &[ChatMessage]) -> Result<Vec<ModelMessage>> {
    let mut out: Vec<ModelMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let Some(role) = ModelRole::parse(&message.role) else {
            continue;
        };
        let Some(text) = message.text().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        match out.last_mut() {
            Some(prev) if prev.role == role => {
                prev.content.push_str("\n\n");
                prev.content.push_str(text);
            }
            _ => out.push(ModelMessage {
                role,
                content: text.to_string(),
            }),
        }
    }

    if !out.iter().any(|m| m.role == ModelRole::User) {
        return Err(RagError::invalid_request(
            "conversation must contain at least one user message with text",
        ));
    }
    Ok(out)
}

/// Index of the last user turn.
pub fn last_user_index(messages: &[ModelMessage]) -> Option<usize> {
    messages.iter().rposition(|m| m.role == ModelRole::User)
}
