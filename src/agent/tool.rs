//! Tool contract and registry.
//!
//! A tool exposes a name, a description, an optional usage schema for the
//! prompt, an argument normalizer, and a run operation. The registry is a
//! table from name to tool; dispatch is a lookup, never reflection.

use serde_json::{Map, Value};

use crate::error::ToolError;

/// Identity of a tool as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description for the tool catalog.
    pub description: String,
}

/// A capability callable from the agent loop.
pub trait Tool: Send + Sync {
    /// The tool's identity.
    fn spec(&self) -> &ToolSpec;

    /// Usage schema appended to the prompt catalog. Empty by default.
    fn prompt_usage(&self) -> String {
        String::new()
    }

    /// Normalizes raw arguments into an argument map.
    ///
    /// Absent arguments become an empty map; anything that is not a JSON
    /// object is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] for non-object arguments.
    fn normalize_arguments(
        &self,
        arguments: Option<&Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        match arguments {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ToolError::InvalidArguments),
        }
    }

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] on failure; the agent loop demotes it to a
    /// text observation.
    fn run(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Name-to-tool dispatch table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::EmptyName`] or [`ToolError::Duplicate`].
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.spec().name.trim().to_string();
        if name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        if self.tools.iter().any(|t| t.spec().name == name) {
            return Err(ToolError::Duplicate { name });
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Looks a tool up by name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Unknown`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolError::Unknown {
                name: name.to_string(),
            })
    }

    /// The registered tool specs, in registration order.
    #[must_use]
    pub fn specs(&self) -> Vec<&ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Renders the tool catalog for the system prompt.
    #[must_use]
    pub fn format_tools_for_prompt(&self) -> String {
        let mut blocks = Vec::new();
        for tool in &self.tools {
            let spec = tool.spec();
            let usage = tool.prompt_usage();
            let usage = usage.trim();
            if usage.is_empty() {
                blocks.push(format!("Name: {}\nDescription: {}", spec.name, spec.description));
            } else {
                blocks.push(format!(
                    "Name: {}\nDescription: {}\nUsage:\n{usage}",
                    spec.name, spec.description
                ));
            }
        }
        blocks.join("\n\n")
    }

    /// Normalizes arguments and runs the named tool.
    ///
    /// # Errors
    ///
    /// Returns lookup, normalization, or execution errors.
    pub fn execute(&self, name: &str, arguments: Option<&Value>) -> Result<Value, ToolError> {
        let tool = self.get(name)?;
        let arguments = tool.normalize_arguments(arguments)?;
        tool.run(&arguments)
    }
}
