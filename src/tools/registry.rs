//! Tool registry for managing and executing tools.
//!
//! The registry provides:
//! - Tool registration (listing keeps registration order)
//! - Tool lookup by name
//! - Conversion to MCP tool definitions

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::spec::{ToolContext, ToolError, ToolResult, ToolSpec};

// === Types ===

/// Tool definition as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    #[must_use]
    pub fn of(tool: &dyn ToolSpec) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        }
    }
}

/// Registry that holds all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolSpec>>,
    order: Vec<String>,
    context: ToolContext,
}

impl ToolRegistry {
    /// Create a new empty registry with the given context.
    #[must_use]
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            context,
        }
    }

    /// Register a tool in the registry.
    pub fn register(&mut self, tool: Arc<dyn ToolSpec>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!("Overwriting existing tool: {}", name);
        } else {
            self.order.push(name);
        }
    }

    /// Register multiple tools at once.
    pub fn register_all(&mut self, tools: Vec<Arc<dyn ToolSpec>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolSpec>> {
        self.tools.get(name).cloned()
    }

    /// Get all registered tool names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Execute a tool by name, returning the full `ToolResult`.
    pub async fn execute_full(&self, name: &str, input: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::not_available(format!("tool '{name}' is not registered")))?;

        tracing::debug!(
            tool = name,
            background = tool.runs_in_background(),
            "executing tool"
        );
        tool.execute(input, &self.context).await
    }

    /// Tool definitions for `tools/list`.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition::of(tool.as_ref()))
            .collect()
    }
}

/// Builder for constructing a `ToolRegistry`.
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn ToolSpec>>,
}

impl ToolRegistryBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a custom tool.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn ToolSpec>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Include the media tools (`generate_image`, `edit_image`,
    /// `generate_speech`, `transcribe_audio`, `generate_video`).
    #[must_use]
    pub fn with_media_tools(self) -> Self {
        use super::media::{
            EditImageTool, GenerateImageTool, GenerateSpeechTool, GenerateVideoTool,
            TranscribeAudioTool,
        };
        self.with_tool(Arc::new(GenerateImageTool))
            .with_tool(Arc::new(EditImageTool))
            .with_tool(Arc::new(GenerateSpeechTool))
            .with_tool(Arc::new(TranscribeAudioTool))
            .with_tool(Arc::new(GenerateVideoTool))
    }

    /// Definitions of the tools added so far; needs no credentials.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition::of(tool.as_ref()))
            .collect()
    }

    /// Build the registry with the given context.
    #[must_use]
    pub fn build(self, context: ToolContext) -> ToolRegistry {
        let mut registry = ToolRegistry::new(context);
        registry.register_all(self.tools);
        registry
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// === Unit Tests ===
