use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as the model sees it: name, description and parameter schema.
///
/// Executors never cross this boundary; see [`crate::tools::ToolDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and parameter schema
    pub fn new<N>(name: N, parameters: Value) -> Self
    where
        N: Into<String>,
    {
        Tool {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How the model may use the tools it is offered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Tool {
        #[serde(rename = "toolName")]
        tool_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_choice_serialization() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_value(ToolChoice::Auto)?, json!({"type": "auto"}));
        assert_eq!(
            serde_json::to_value(ToolChoice::Tool {
                tool_name: "weather".to_string()
            })?,
            json!({"type": "tool", "toolName": "weather"})
        );
        Ok(())
    }
}
