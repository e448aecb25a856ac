use crate::errors::GenerateError;
use crate::generate::StepType;
use crate::models::content::{ProviderMetadata, ToolCallPart, ToolResultPart};
use crate::providers::base::{FinishReason, ResponseMetadata, Usage};

/// One event of a streaming run, in the order it happened.
///
/// Deltas of a step come in the order the provider emitted them; steps follow
/// each other.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    TextDelta(String),
    ReasoningDelta(String),
    ReasoningSignature(String),
    RedactedReasoning(String),
    /// Partial tool call arguments, for progress display. The `ToolCall` that
    /// follows is authoritative.
    ToolCallDelta {
        tool_call_id: String,
        tool_name: String,
        args_text_delta: String,
    },
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
    StepFinish {
        step_type: StepType,
        finish_reason: FinishReason,
        usage: Usage,
        response: ResponseMetadata,
        provider_metadata: Option<ProviderMetadata>,
        /// Whether another step follows
        is_continued: bool,
    },
    /// Last part of a successful run. `usage` covers every step.
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
        provider_metadata: Option<ProviderMetadata>,
    },
    /// Either an in-band provider error, after which the run goes on, or the
    /// failure that ended the run, in which case it is the last part.
    Error(GenerateError),
}

impl StreamPart {
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            StreamPart::TextDelta(delta) => Some(delta),
            _ => None,
        }
    }
}
