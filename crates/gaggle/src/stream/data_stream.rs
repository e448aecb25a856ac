use serde_json::{json, Value};

use super::parts::StreamPart;
use crate::providers::base::Usage;

fn encode(code: &str, value: Value) -> String {
    format!("{}:{}\n", code, value)
}

fn usage_json(usage: &Usage) -> Value {
    json!({
        "promptTokens": usage.input_tokens,
        "completionTokens": usage.output_tokens
    })
}

/// Render a stream part as one line of the data stream protocol: a type code,
/// a colon and a JSON payload.
pub fn encode_part(part: &StreamPart) -> String {
    match part {
        StreamPart::TextDelta(text) => encode("0", json!(text)),
        StreamPart::ReasoningDelta(text) => encode("g", json!(text)),
        StreamPart::RedactedReasoning(data) => encode("i", json!({ "data": data })),
        StreamPart::ReasoningSignature(signature) => {
            encode("j", json!({ "signature": signature }))
        }
        StreamPart::ToolCallDelta {
            tool_call_id,
            args_text_delta,
            ..
        } => encode(
            "c",
            json!({ "toolCallId": tool_call_id, "argsTextDelta": args_text_delta }),
        ),
        StreamPart::ToolCall(call) => encode(
            "9",
            json!({
                "toolCallId": call.tool_call_id,
                "toolName": call.tool_name,
                "args": call.args
            }),
        ),
        StreamPart::ToolResult(result) => encode(
            "a",
            json!({ "toolCallId": result.tool_call_id, "result": result.result }),
        ),
        StreamPart::StepFinish {
            finish_reason,
            usage,
            is_continued,
            ..
        } => encode(
            "e",
            json!({
                "finishReason": finish_reason,
                "usage": usage_json(usage),
                "isContinued": is_continued
            }),
        ),
        StreamPart::Finish {
            finish_reason,
            usage,
            ..
        } => encode(
            "d",
            json!({ "finishReason": finish_reason, "usage": usage_json(usage) }),
        ),
        StreamPart::Error(error) => encode("3", json!(error.to_string())),
    }
}
