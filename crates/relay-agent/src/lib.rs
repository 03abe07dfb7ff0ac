//! Agent wrapper for the chat relay.
//!
//! An [`Agent`] owns a system prompt and a stored message list and turns a
//! list of conversation turns into one completion.  Completions come from a
//! [`CompletionBackend`]; the default one speaks the OpenAI-compatible
//! chat-completions protocol over `reqwest`.
//!
//! Tool calls are resolved through an explicit [`ToolRegistry`] mapping a
//! function name to its advertised schema and local handler.

pub mod agent;
pub mod backend;
pub mod error;
pub mod message;
pub mod openai;
pub mod prompt;
pub mod tools;

pub use agent::{Agent, AgentFactory};
pub use backend::{Completion, CompletionBackend, CompletionRequest, ToolCall};
pub use error::{AgentError, BackendError, ToolError};
pub use message::{ChatMessage, Role};
pub use openai::OpenAiBackend;
pub use tools::{ToolArguments, ToolHandler, ToolRegistry, ToolSchema};
