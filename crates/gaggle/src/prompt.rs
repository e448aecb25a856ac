use std::collections::HashSet;

use crate::errors::{GenerateError, GenerateResult};
use crate::models::content::ContentPart;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::ToolChoice;
use crate::providers::base::CallSettings;
use crate::tools::ToolSet;

/// What the caller asks the model about: a single user text or a full history.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

/// Turn the caller's system text and prompt into the history sent to the model.
///
/// Rejects an empty history, system messages carrying anything but text, and
/// tool results that answer no earlier tool call.
pub fn standardize_prompt(
    system: Option<&str>,
    prompt: Option<Prompt>,
) -> GenerateResult<Vec<Message>> {
    let prompt = prompt.ok_or_else(|| {
        GenerateError::invalid_argument("prompt", "either prompt or messages must be defined")
    })?;

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(Message::system(system));
    }

    match prompt {
        Prompt::Text(text) => messages.push(Message::user().with_text(text)),
        Prompt::Messages(history) => {
            if history.is_empty() {
                return Err(GenerateError::invalid_argument(
                    "messages",
                    "messages must not be empty",
                ));
            }
            messages.extend(history);
        }
    }

    for message in &messages {
        if message.role == Role::System
            && message
                .content
                .iter()
                .any(|part| !matches!(part, ContentPart::Text(_)))
        {
            return Err(GenerateError::invalid_argument(
                "messages",
                "system messages may only contain text",
            ));
        }
    }

    check_tool_results_are_answered(&messages)?;
    Ok(messages)
}

/// Every tool result must answer a tool call made earlier in the history.
pub fn check_tool_results_are_answered(messages: &[Message]) -> GenerateResult<()> {
    let mut calls = HashSet::new();
    for message in messages {
        for call in message.tool_calls() {
            calls.insert(call.tool_call_id.as_str());
        }
        for result in message.tool_results() {
            if !calls.contains(result.tool_call_id.as_str()) {
                return Err(GenerateError::invalid_argument(
                    "messages",
                    format!(
                        "tool result {} for {} has no matching tool call",
                        result.tool_call_id, result.tool_name
                    ),
                ));
            }
        }
    }
    Ok(())
}

pub fn validate_call_settings(settings: &CallSettings) -> GenerateResult<()> {
    if settings.max_tokens == Some(0) {
        return Err(GenerateError::invalid_argument(
            "max_tokens",
            "must be at least 1",
        ));
    }
    for (name, value) in [
        ("temperature", settings.temperature),
        ("top_p", settings.top_p),
        ("presence_penalty", settings.presence_penalty),
        ("frequency_penalty", settings.frequency_penalty),
    ] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(GenerateError::invalid_argument(name, "must be a finite number"));
        }
    }
    Ok(())
}

/// A forced tool choice must name a tool the run offers.
pub fn validate_tool_choice(choice: Option<&ToolChoice>, tools: &ToolSet) -> GenerateResult<()> {
    if let Some(ToolChoice::Tool { tool_name }) = choice {
        if tools.get(tool_name).is_none() {
            return Err(GenerateError::invalid_argument(
                "tool_choice",
                format!("tool {tool_name} is not among the available tools"),
            ));
        }
    }
    Ok(())
}
