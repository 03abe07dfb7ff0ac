use thiserror::Error;

/// Errors raised by a [`crate::CompletionBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while loading or invoking a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("I/O error reading tool schemas: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool schema file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema file has no entry for the requested function name.
    #[error("no schema declared for tool '{0}'")]
    UnknownSchema(String),

    /// The handler itself failed.
    #[error("tool '{name}' failed: {message}")]
    Execution { name: String, message: String },
}

/// Errors surfaced by [`crate::Agent`].
#[derive(Debug, Error)]
pub enum AgentError {
    /// Any backend failure, wrapped with context.
    #[error("error calling completion backend: {0}")]
    Backend(#[from] BackendError),

    /// The model requested a tool that is not in the registry.
    #[error("model requested unknown tool '{0}'")]
    UnknownTool(String),

    /// The model's tool-call arguments were not valid JSON.
    #[error("tool '{name}' arguments are not valid JSON: {source}")]
    ToolArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The arguments parsed, but not as a JSON object of named arguments.
    #[error("tool '{0}' arguments must be a JSON object")]
    ToolArgumentsShape(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The backend returned neither text nor a tool call.
    #[error("completion contained no text")]
    EmptyCompletion,
}
