//! Completion backend abstraction.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::message::ChatMessage;
use crate::tools::ToolSchema;

/// One request to the language model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    /// Tools advertised to the model.  Empty means plain completion.
    pub tools: Vec<ToolSchema>,
}

/// A tool invocation requested by the model.
///
/// `arguments` is kept as the raw JSON text the model produced so that a
/// decode failure is attributed to the agent, not the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// The model's answer: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_0".to_owned(),
                name: name.into(),
                arguments: arguments.into(),
            }],
        }
    }
}

/// Anything that can turn a [`CompletionRequest`] into a [`Completion`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendError>;
}
