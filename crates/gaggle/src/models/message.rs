use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{ContentPart, ProviderMetadata, ToolCallPart, ToolResultPart};
use super::data::DataContent;
use super::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A message to or from a model
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            content: Vec::new(),
            provider_metadata: None,
        }
    }

    /// Create a system message carrying instructions
    pub fn system<S: Into<String>>(text: S) -> Self {
        Message::new(Role::System).with_text(text)
    }

    /// Create a new user message
    pub fn user() -> Self {
        Message::new(Role::User)
    }

    /// Create a new assistant message
    pub fn assistant() -> Self {
        Message::new(Role::Assistant)
    }

    /// Create a new tool message, which carries tool results back to the model
    pub fn tool() -> Self {
        Message::new(Role::Tool)
    }

    /// Add any content part to the message
    pub fn with_content(mut self, content: ContentPart) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentPart::text(text))
    }

    /// Add image content to the message
    pub fn with_image<D: Into<DataContent>>(self, image: D, mime_type: Option<String>) -> Self {
        self.with_content(ContentPart::image(image, mime_type))
    }

    /// Add a tool call to the message
    pub fn with_tool_call<I: Into<String>, N: Into<String>>(
        self,
        id: I,
        tool_name: N,
        args: Value,
    ) -> Self {
        self.with_content(ContentPart::tool_call(id, tool_name, args))
    }

    /// Add a tool result to the message
    pub fn with_tool_result<I: Into<String>, N: Into<String>>(
        self,
        id: I,
        tool_name: N,
        result: Value,
    ) -> Self {
        self.with_content(ContentPart::tool_result(id, tool_name, result))
    }

    /// Concatenation of every text part
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.content.iter().filter_map(ContentPart::as_tool_call)
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultPart> {
        self.content.iter().filter_map(ContentPart::as_tool_result)
    }
}
