use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::models::content::{ContentPart, ProviderMetadata, ToolCallPart, ToolResultPart};
use crate::models::message::Message;
use crate::providers::base::{CallWarning, FinishReason, ResponseMetadata, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StepType {
    /// The first call of a run
    Initial,
    /// A call made to answer tool results of the previous step
    ToolResult,
}

/// One model call within a run, together with the tool work it triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_type: StepType,
    /// The history as sent to the model
    pub request_messages: Vec<Message>,
    /// What the model produced: reasoning, text, then tool calls
    pub content: Vec<ContentPart>,
    pub text: String,
    pub tool_calls: Vec<ToolCallPart>,
    pub tool_results: Vec<ToolResultPart>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    #[serde(default)]
    pub warnings: Vec<CallWarning>,
    pub response: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
    /// The assistant message and, if tools ran, the tool message of this step
    pub response_messages: Vec<Message>,
}

impl Step {
    /// Concatenated reasoning text, if the model reasoned
    pub fn reasoning_text(&self) -> Option<String> {
        let reasoning: Vec<&str> = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Reasoning(reasoning) => Some(reasoning.text.as_str()),
                _ => None,
            })
            .collect();
        if reasoning.is_empty() {
            None
        } else {
            Some(reasoning.concat())
        }
    }

    /// Tool calls of this step that have no result
    pub fn pending_tool_calls(&self) -> Vec<ToolCallPart> {
        self.tool_calls
            .iter()
            .filter(|call| {
                !self
                    .tool_results
                    .iter()
                    .any(|result| result.tool_call_id == call.tool_call_id)
            })
            .cloned()
            .collect()
    }
}

/// The aggregate of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextResult {
    /// Text of every step, concatenated
    pub text: String,
    pub tool_calls: Vec<ToolCallPart>,
    pub tool_results: Vec<ToolResultPart>,
    /// Sum over all steps
    pub usage: Usage,
    /// From the last step
    pub finish_reason: FinishReason,
    pub warnings: Vec<CallWarning>,
    pub response: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<ProviderMetadata>,
    pub steps: Vec<Step>,
    /// Messages generated during the run
    pub response_messages: Vec<Message>,
    /// The full history: input messages followed by the response messages
    pub messages: Vec<Message>,
}

impl GenerateTextResult {
    pub(crate) fn from_steps(steps: Vec<Step>, messages: Vec<Message>) -> Self {
        let last = steps.last();
        Self {
            text: steps.iter().map(|step| step.text.as_str()).collect(),
            tool_calls: steps
                .iter()
                .flat_map(|step| step.tool_calls.iter().cloned())
                .collect(),
            tool_results: steps
                .iter()
                .flat_map(|step| step.tool_results.iter().cloned())
                .collect(),
            usage: steps
                .iter()
                .fold(Usage::default(), |total, step| total + step.usage),
            finish_reason: last.map(|step| step.finish_reason).unwrap_or_default(),
            warnings: steps
                .iter()
                .flat_map(|step| step.warnings.iter().cloned())
                .collect(),
            response: last.map(|step| step.response.clone()).unwrap_or_default(),
            provider_metadata: last.and_then(|step| step.provider_metadata.clone()),
            response_messages: steps
                .iter()
                .flat_map(|step| step.response_messages.iter().cloned())
                .collect(),
            messages,
            steps,
        }
    }

    /// Tool calls of the last step left for the caller to answer
    pub fn pending_tool_calls(&self) -> Vec<ToolCallPart> {
        self.steps
            .last()
            .map(Step::pending_tool_calls)
            .unwrap_or_default()
    }

    pub fn reasoning_text(&self) -> Option<String> {
        self.steps.last().and_then(Step::reasoning_text)
    }
}
