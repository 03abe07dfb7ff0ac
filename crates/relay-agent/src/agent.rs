//! The agent wrapper: system prompt + stored messages + one completion call.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::error::AgentError;
use crate::message::ChatMessage;
use crate::tools::ToolRegistry;

/// Builds a fresh [`Agent`] per conversation turn.
///
/// Holds everything that is fixed for the process lifetime (backend, model
/// settings, rendered system prompt, tool registry) so the relay never keeps
/// conversation state between events.
#[derive(Clone)]
pub struct AgentFactory {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl std::fmt::Debug for AgentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentFactory")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl AgentFactory {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            tools,
            model: model.into(),
            temperature,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(&self) -> Agent {
        let agent = Agent::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.tools),
            self.model.clone(),
            self.temperature,
        );
        match &self.system_prompt {
            Some(prompt) => agent.with_system_prompt(prompt.clone()),
            None => agent,
        }
    }
}

pub struct Agent {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

impl Agent {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            tools,
            model: model.into(),
            temperature,
            messages: Vec::new(),
        }
    }

    /// Prepend `prompt` as the first message.  Empty prompts are ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.is_empty() {
            self.messages.insert(0, ChatMessage::system(prompt));
        }
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn request(&self, new_messages: &[ChatMessage]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + new_messages.len());
        messages.extend_from_slice(&self.messages);
        messages.extend_from_slice(new_messages);
        CompletionRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages,
            tools: Vec::new(),
        }
    }

    /// Stored + `new_messages` → one completion → text.
    pub async fn complete(&self, new_messages: &[ChatMessage]) -> Result<String, AgentError> {
        let completion = self.backend.complete(self.request(new_messages)).await?;
        completion.content.ok_or(AgentError::EmptyCompletion)
    }

    /// Like [`Agent::complete`], but advertises the registered tool `tool`.
    ///
    /// When the model answers with a tool call, the call's arguments are
    /// decoded and handed to the tool's handler, whose return value becomes
    /// the reply.  Otherwise the model's own text is returned.
    pub async fn complete_with_tool(
        &self,
        new_messages: &[ChatMessage],
        tool: &str,
    ) -> Result<String, AgentError> {
        let schema = self
            .tools
            .schema(tool)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTool(tool.to_owned()))?;

        let mut request = self.request(new_messages);
        request.tools.push(schema);

        let completion = self.backend.complete(request).await?;

        let Some(call) = completion.tool_calls.into_iter().next() else {
            debug!("model answered with text");
            return completion.content.ok_or(AgentError::EmptyCompletion);
        };

        let handler = self
            .tools
            .handler(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        let arguments = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(AgentError::ToolArgumentsShape(call.name)),
            Err(source) => {
                return Err(AgentError::ToolArguments {
                    name: call.name,
                    source,
                })
            }
        };

        info!(tool = %call.name, "dispatching tool call");
        Ok(handler.call(arguments).await?)
    }
}
