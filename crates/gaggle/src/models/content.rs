use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::data::DataContent;

/// Opaque provider-specific data keyed by provider id.
///
/// The engine forwards these maps untouched; only adapters read them.
pub type ProviderMetadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPart {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePart {
    pub image: DataContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    pub data: DataContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningPart {
    pub text: String,
    /// Verifies that the reasoning originated from the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

/// Reasoning the provider returned in opaque form. Never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedReasoningPart {
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
/// One typed unit of message content
pub enum ContentPart {
    Text(TextPart),
    Image(ImagePart),
    File(FilePart),
    Reasoning(ReasoningPart),
    RedactedReasoning(RedactedReasoningPart),
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text(TextPart {
            text: text.into(),
            provider_metadata: None,
        })
    }

    pub fn image<D: Into<DataContent>>(image: D, mime_type: Option<String>) -> Self {
        ContentPart::Image(ImagePart {
            image: image.into(),
            mime_type,
            provider_metadata: None,
        })
    }

    pub fn file<D: Into<DataContent>, M: Into<String>>(data: D, mime_type: M) -> Self {
        ContentPart::File(FilePart {
            data: data.into(),
            filename: None,
            mime_type: mime_type.into(),
            provider_metadata: None,
        })
    }

    pub fn reasoning<S: Into<String>>(text: S, signature: Option<String>) -> Self {
        ContentPart::Reasoning(ReasoningPart {
            text: text.into(),
            signature,
            provider_metadata: None,
        })
    }

    pub fn redacted_reasoning<S: Into<String>>(data: S) -> Self {
        ContentPart::RedactedReasoning(RedactedReasoningPart {
            data: data.into(),
            provider_metadata: None,
        })
    }

    pub fn tool_call<I: Into<String>, N: Into<String>>(id: I, tool_name: N, args: Value) -> Self {
        ContentPart::ToolCall(ToolCallPart {
            tool_call_id: id.into(),
            tool_name: tool_name.into(),
            args,
            provider_metadata: None,
        })
    }

    pub fn tool_result<I: Into<String>, N: Into<String>>(
        id: I,
        tool_name: N,
        result: Value,
    ) -> Self {
        ContentPart::ToolResult(ToolResultPart {
            tool_call_id: id.into(),
            tool_name: tool_name.into(),
            result,
            is_error: false,
            provider_metadata: None,
        })
    }

    /// Get the text if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        if let ContentPart::ToolCall(ref tool_call) = self {
            Some(tool_call)
        } else {
            None
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultPart> {
        if let ContentPart::ToolResult(ref tool_result) = self {
            Some(tool_result)
        } else {
            None
        }
    }

    pub fn provider_metadata(&self) -> Option<&ProviderMetadata> {
        match self {
            ContentPart::Text(part) => part.provider_metadata.as_ref(),
            ContentPart::Image(part) => part.provider_metadata.as_ref(),
            ContentPart::File(part) => part.provider_metadata.as_ref(),
            ContentPart::Reasoning(part) => part.provider_metadata.as_ref(),
            ContentPart::RedactedReasoning(part) => part.provider_metadata.as_ref(),
            ContentPart::ToolCall(part) => part.provider_metadata.as_ref(),
            ContentPart::ToolResult(part) => part.provider_metadata.as_ref(),
        }
    }

    /// Attach provider-specific data under `provider`
    pub fn with_provider_metadata<S: Into<String>>(mut self, provider: S, value: Value) -> Self {
        let slot = match &mut self {
            ContentPart::Text(part) => &mut part.provider_metadata,
            ContentPart::Image(part) => &mut part.provider_metadata,
            ContentPart::File(part) => &mut part.provider_metadata,
            ContentPart::Reasoning(part) => &mut part.provider_metadata,
            ContentPart::RedactedReasoning(part) => &mut part.provider_metadata,
            ContentPart::ToolCall(part) => &mut part.provider_metadata,
            ContentPart::ToolResult(part) => &mut part.provider_metadata,
        };
        slot.get_or_insert_with(Map::new)
            .insert(provider.into(), value);
        self
    }
}

impl From<ToolCallPart> for ContentPart {
    fn from(part: ToolCallPart) -> Self {
        ContentPart::ToolCall(part)
    }
}

impl From<ToolResultPart> for ContentPart {
    fn from(part: ToolResultPart) -> Self {
        ContentPart::ToolResult(part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parts_are_tagged_by_type() -> anyhow::Result<()> {
        let part = ContentPart::tool_call("c1", "currentTime", json!({}));
        let value = serde_json::to_value(&part)?;
        assert_eq!(
            value,
            json!({"type": "tool-call", "toolCallId": "c1", "toolName": "currentTime", "args": {}})
        );

        let value = serde_json::to_value(ContentPart::redacted_reasoning("opaque=="))?;
        assert_eq!(value, json!({"type": "redacted-reasoning", "data": "opaque=="}));
        Ok(())
    }

    #[test]
    fn test_is_error_only_serialized_when_set() -> anyhow::Result<()> {
        let ok = ContentPart::tool_result("c1", "t", json!(1));
        assert!(serde_json::to_value(&ok)?.get("isError").is_none());

        let parsed: ContentPart = serde_json::from_value(json!({
            "type": "tool-result", "toolCallId": "c1", "toolName": "t",
            "result": "boom", "isError": true
        }))?;
        assert!(parsed.as_tool_result().map(|r| r.is_error).unwrap_or(false));
        Ok(())
    }

    #[test]
    fn test_provider_metadata_passthrough() -> anyhow::Result<()> {
        let part = ContentPart::text("hi")
            .with_provider_metadata("anthropic", json!({"cacheControl": {"type": "ephemeral"}}))
            .with_provider_metadata("openai", json!({"z": 1, "a": [1.5, "x"]}));
        let text = serde_json::to_string(&part)?;
        let back: ContentPart = serde_json::from_str(&text)?;
        assert_eq!(back, part);
        assert_eq!(serde_json::to_string(&back)?, text);

        let keys: Vec<_> = back.provider_metadata().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["anthropic", "openai"]);
        Ok(())
    }
}
