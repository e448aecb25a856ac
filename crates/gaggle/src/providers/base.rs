use std::ops::{Add, AddAssign};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;

use crate::errors::GenerateResult;
use crate::models::content::ProviderMetadata;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolChoice};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        *self = *self + other;
    }
}

/// Why a model stopped producing output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    #[default]
    Unknown,
}

/// Sampling settings shared by every provider. Unset fields use provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// The normalized request handed to a model: history, tool schemas and options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOptions {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub settings: CallSettings,
    #[serde(default, skip_serializing_if = "ProviderMetadata::is_empty")]
    pub provider_options: ProviderMetadata,
}

/// A tool call as reported by a model. `args` is the raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: String,
}

impl ModelToolCall {
    pub fn new<I: Into<String>, N: Into<String>, A: Into<String>>(id: I, name: N, args: A) -> Self {
        Self {
            tool_call_id: id.into(),
            tool_name: name.into(),
            args: args.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReasoningOutput {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Redacted {
        data: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: Option<String>,
    pub model_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallWarning {
    UnsupportedSetting {
        setting: String,
        details: Option<String>,
    },
    UnsupportedTool {
        tool_name: String,
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

/// The result of a single non-streaming model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub text: Option<String>,
    #[serde(default)]
    pub reasoning: Vec<ReasoningOutput>,
    #[serde(default)]
    pub tool_calls: Vec<ModelToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: Option<ProviderMetadata>,
    #[serde(default)]
    pub response: ResponseMetadata,
    #[serde(default)]
    pub warnings: Vec<CallWarning>,
}

impl ModelResponse {
    /// A text-only response that finished with `stop`
    pub fn text<S: Into<String>>(text: S) -> Self {
        ModelResponse {
            text: Some(text.into()),
            finish_reason: FinishReason::Stop,
            ..Default::default()
        }
    }

    /// A response that asks for the given tool calls
    pub fn tool_calls(calls: Vec<ModelToolCall>) -> Self {
        ModelResponse {
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Replay this response as the event sequence a streaming call would emit.
    pub fn into_events(self) -> Vec<ModelEvent> {
        let mut events = vec![ModelEvent::ResponseMetadata(self.response)];
        for reasoning in self.reasoning {
            match reasoning {
                ReasoningOutput::Text { text, signature } => {
                    events.push(ModelEvent::ReasoningDelta(text));
                    if let Some(signature) = signature {
                        events.push(ModelEvent::ReasoningSignature(signature));
                    }
                }
                ReasoningOutput::Redacted { data } => {
                    events.push(ModelEvent::RedactedReasoning(data));
                }
            }
        }
        if let Some(text) = self.text {
            if !text.is_empty() {
                events.push(ModelEvent::TextDelta(text));
            }
        }
        events.extend(self.tool_calls.into_iter().map(ModelEvent::ToolCall));
        events.push(ModelEvent::Finish {
            finish_reason: self.finish_reason,
            usage: self.usage,
            provider_metadata: self.provider_metadata,
        });
        events
    }
}

/// A granular event of a streaming model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    ResponseMetadata(ResponseMetadata),
    TextDelta(String),
    ReasoningDelta(String),
    ReasoningSignature(String),
    RedactedReasoning(String),
    /// A fragment of a tool call's argument text, for progress display only.
    ToolCallDelta {
        tool_call_id: String,
        tool_name: String,
        args_text_delta: String,
    },
    /// A complete tool call. Authoritative over any deltas.
    ToolCall(ModelToolCall),
    /// Terminal event of a successful call.
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
        provider_metadata: Option<ProviderMetadata>,
    },
    /// An error chunk reported in-band by the provider.
    Error(String),
}

pub type ModelEventStream = BoxStream<'static, GenerateResult<ModelEvent>>;

/// The capability every provider adapter implements.
///
/// Adapters never retry; the engine owns retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider id, e.g. `openai`
    fn provider(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Whether the model fetches `url` itself. When false the engine downloads
    /// the content and inlines it before calling the model.
    fn supports_url(&self, _url: &Url) -> bool {
        true
    }

    /// Generate a complete response
    async fn generate(&self, options: &CallOptions) -> GenerateResult<ModelResponse>;

    /// Generate a response as a lazy sequence of events, ending in exactly one
    /// [`ModelEvent::Finish`] unless the call fails.
    async fn stream(&self, options: &CallOptions) -> GenerateResult<ModelEventStream>;
}
