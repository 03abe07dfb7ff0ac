//! Tool registry.
//!
//! Maps a function name to the JSON schema advertised to the model and the
//! local handler that runs when the model calls it.  Schemas live in a JSON
//! file keyed by function name:
//!
//! ```json
//! { "add_contact_info": { "name": "add_contact_info", "description": "...", "parameters": { ... } } }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Named arguments decoded from a tool call.
pub type ToolArguments = Map<String, Value>;

/// Declared schema of one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Defaults to the key the entry is stored under.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters object.
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolSchema {
    /// Load the schema declared for `name` from a schema file.
    pub fn load(path: &Path, name: &str) -> Result<Self, ToolError> {
        let raw = std::fs::read_to_string(path)?;
        let mut all: HashMap<String, Value> = serde_json::from_str(&raw)?;
        let entry = all
            .remove(name)
            .ok_or_else(|| ToolError::UnknownSchema(name.to_owned()))?;
        let mut schema: ToolSchema = serde_json::from_value(entry)?;
        if schema.name.is_empty() {
            schema.name = name.to_owned();
        }
        Ok(schema)
    }
}

/// Local side of a tool: receives decoded arguments, returns reply text.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError>;
}

struct RegisteredTool {
    schema: ToolSchema,
    handler: Arc<dyn ToolHandler>,
}

/// Capability name → {schema, handler}.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its schema name, replacing any previous entry.
    pub fn register(&mut self, schema: ToolSchema, handler: Arc<dyn ToolHandler>) {
        self.tools
            .insert(schema.name.clone(), RegisteredTool { schema, handler });
    }

    /// Load `name`'s schema from `path` and register it with `handler`.
    pub fn register_from_file(
        &mut self,
        path: &Path,
        name: &str,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        let schema = ToolSchema::load(path, name)?;
        self.register(schema, handler);
        Ok(())
    }

    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.get(name).map(|t| &t.schema)
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|t| Arc::clone(&t.handler))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
