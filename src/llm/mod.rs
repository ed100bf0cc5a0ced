//! Language-model client boundary
//!
//! The engine only sees [`ModelClient`]: given a system role, a conversation
//! and the operation menu, a client answers with free text or with a list of
//! requested invocations. [`openai::OpenAiClient`] talks to a chat-completions
//! endpoint; [`offline::OfflineClient`] is the deterministic stand-in used
//! when no credential is configured.

pub mod offline;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use offline::OfflineClient;
pub use openai::{OpenAiClient, OpenAiConfig};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Role of a chat message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in the conversation sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Operation advertised to the client (function-calling format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments
    pub parameters: Value,
}

/// An operation invocation requested by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub name: String,
    /// Arguments exactly as received; parsed by the engine per invocation
    pub arguments: String,
}

impl Invocation {
    /// Invocation with a fresh call id and raw argument text
    pub fn raw(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Invocation with JSON arguments
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self::raw(name, arguments.to_string())
    }
}

/// One reasoning request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    /// Conversation, system message first
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Content of the last user message
    pub fn objective(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Answer to a reasoning request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub invocations: Vec<Invocation>,
    /// Consumption reported for this round
    pub usage: u64,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn invocations(invocations: Vec<Invocation>) -> Self {
        Self {
            invocations,
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: u64) -> Self {
        self.usage = usage;
        self
    }
}

/// A language-model capability
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError>;
}

/// Rough token estimate (four characters per token)
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
