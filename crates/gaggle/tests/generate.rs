use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gaggle::middleware::{wrap_model, ExtractReasoning};
use gaggle::models::content::{ContentPart, ToolResultPart};
use gaggle::models::message::Message;
use gaggle::models::role::Role;
use gaggle::providers::base::{
    FinishReason, LanguageModel, ModelResponse, ModelToolCall, ReasoningOutput, Usage,
};
use gaggle::providers::mock::{MockLanguageModel, MockTurn};
use gaggle::providers::registry::ProviderRegistry;
use gaggle::retry::RetryPolicy;
use gaggle::tools::{ToolDefinition, ToolError};
use gaggle::{generate_text, ErrorKind, GenerateError, GenerateRequest, Stage, StepType};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn clock_tool() -> ToolDefinition {
    ToolDefinition::new("currentTime", json!({"type": "object", "properties": {}}))
        .with_description("The current time")
        .with_executor_fn(|_args, _ctx| async { Ok(json!({"currentTime": "10:00"})) })
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition::new(
        "weather",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
    .with_executor_fn(|args: Value, _ctx| async move {
        match args["city"].as_str() {
            Some(city) => Ok(json!({"city": city, "temperature": 21})),
            None => Err(ToolError::InvalidParameters("city".to_string())),
        }
    })
}

fn call(id: &str, name: &str, args: &str) -> ModelResponse {
    ModelResponse::tool_calls(vec![ModelToolCall::new(id, name, args)]).with_usage(Usage::new(10, 2))
}

fn request(mock: &MockLanguageModel) -> GenerateRequest {
    GenerateRequest::new(Arc::new(mock.clone())).retry(RetryPolicy::none())
}

#[tokio::test]
async fn test_single_step_without_tools() -> Result<()> {
    let mock = MockLanguageModel::new(vec![
        ModelResponse::text("Hello there.").with_usage(Usage::new(7, 3))
    ]);

    let result = generate_text(request(&mock).system("Be nice.").prompt("Hi")).await?;

    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].step_type, StepType::Initial);
    assert_eq!(result.usage, result.steps[0].usage);
    assert_eq!(result.usage, Usage::new(7, 3));
    assert_eq!(result.text, "Hello there.");
    assert_eq!(result.finish_reason, FinishReason::Stop);

    let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(result.response_messages.len(), 1);

    let sent = mock.calls();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].messages.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_current_time_scenario() -> Result<()> {
    let mock = MockLanguageModel::new(vec![
        call("c1", "currentTime", "{}"),
        ModelResponse::text("It is 10:00.").with_usage(Usage::new(20, 5)),
    ]);

    let result = generate_text(
        request(&mock)
            .prompt("What time is it?")
            .tool(clock_tool())
            .max_steps(5),
    )
    .await?;

    assert_eq!(result.text, "It is 10:00.");
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].step_type, StepType::ToolResult);
    assert_eq!(
        result.tool_results,
        vec![ToolResultPart {
            tool_call_id: "c1".to_string(),
            tool_name: "currentTime".to_string(),
            result: json!({"currentTime": "10:00"}),
            is_error: false,
            provider_metadata: None,
        }]
    );
    assert_eq!(result.usage, Usage::new(30, 7));

    // The second call sees the assistant tool call and the tool result.
    let second = &mock.calls()[1].messages;
    assert_eq!(second.len(), 3);
    assert_eq!(second[1].role, Role::Assistant);
    assert_eq!(second[2].role, Role::Tool);
    Ok(())
}

#[tokio::test]
async fn test_n_tool_rounds_take_n_plus_one_steps() -> Result<()> {
    let mock = MockLanguageModel::new(vec![
        call("c1", "weather", r#"{"city": "Lisbon"}"#),
        call("c2", "weather", r#"{"city": "Oslo"}"#),
        call("c3", "currentTime", ""),
        ModelResponse::text("Done."),
    ]);

    let result = generate_text(
        request(&mock)
            .prompt("Weather report")
            .tool(weather_tool())
            .tool(clock_tool())
            .max_steps(10),
    )
    .await?;

    assert_eq!(result.steps.len(), 4);
    assert_ne!(result.finish_reason, FinishReason::ToolCalls);
    for tool_call in &result.tool_calls {
        let matching = result
            .tool_results
            .iter()
            .filter(|r| r.tool_call_id == tool_call.tool_call_id)
            .count();
        assert_eq!(matching, 1, "{} should have one result", tool_call.tool_call_id);
    }
    assert!(result.pending_tool_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_step_limit_leaves_calls_pending() -> Result<()> {
    let mock = MockLanguageModel::new(vec![
        call("c1", "currentTime", "{}"),
        call("c2", "currentTime", "{}"),
        ModelResponse::text("never requested"),
    ]);

    let result = generate_text(
        request(&mock)
            .prompt("What time is it?")
            .tool(clock_tool())
            .max_steps(2),
    )
    .await?;

    assert_eq!(mock.calls().len(), 2);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.finish_reason, FinishReason::Length);
    assert_eq!(result.tool_calls.len(), 2);
    assert_eq!(result.tool_results.len(), 1);

    let pending = result.pending_tool_calls();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tool_call_id, "c2");
    assert!(result.steps[1].tool_results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_default_single_step_does_not_run_tools() -> Result<()> {
    let executions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&executions);
    let tool = ToolDefinition::new("currentTime", json!({"type": "object"})).with_executor_fn(
        move |_args, _ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!("10:00")) }
        },
    );
    let mock = MockLanguageModel::new(vec![call("c1", "currentTime", "{}")]);

    let result = generate_text(request(&mock).prompt("time?").tool(tool)).await?;

    assert_eq!(executions.load(Ordering::SeqCst), 0);
    assert_eq!(result.finish_reason, FinishReason::Length);
    assert_eq!(result.pending_tool_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_invalid_arguments_let_the_model_retry() -> Result<()> {
    let mock = MockLanguageModel::new(vec![
        call("c1", "weather", r#"{"city": 3}"#),
        call("c2", "weather", r#"{"city": "Lisbon"}"#),
        ModelResponse::text("21 degrees in Lisbon."),
    ]);

    let result = generate_text(
        request(&mock)
            .prompt("Weather in Lisbon?")
            .tool(weather_tool())
            .max_steps(5),
    )
    .await?;

    assert_eq!(result.steps.len(), 3);
    let first = &result.steps[0].tool_results[0];
    assert!(first.is_error);
    assert_eq!(first.tool_call_id, "c1");
    assert!(!result.steps[1].tool_results[0].is_error);
    assert_eq!(result.text, "21 degrees in Lisbon.");
    Ok(())
}

#[tokio::test]
async fn test_executor_errors_are_fed_back() -> Result<()> {
    let failing = ToolDefinition::new("flaky", json!({"type": "object"}))
        .with_executor_fn(|_args, _ctx| async {
            Err::<Value, _>(anyhow::anyhow!("backend unavailable").into())
        });
    let mock = MockLanguageModel::new(vec![
        call("c1", "flaky", "{}"),
        ModelResponse::text("Sorry, that failed."),
    ]);

    let result = generate_text(request(&mock).prompt("go").tool(failing).max_steps(3)).await?;

    assert_eq!(result.steps.len(), 2);
    assert!(result.tool_results[0].is_error);
    assert_eq!(
        result.tool_results[0].result,
        json!("Tool execution failed: backend unavailable")
    );
    Ok(())
}

#[tokio::test]
async fn test_tools_without_executor_return_control() -> Result<()> {
    let confirm = ToolDefinition::new(
        "confirm",
        json!({"type": "object", "properties": {"question": {"type": "string"}}}),
    );
    let mock = MockLanguageModel::new(vec![
        call("c1", "confirm", r#"{"question": "Delete it?"}"#),
        ModelResponse::text("Deleted."),
    ]);

    let first = generate_text(
        request(&mock)
            .prompt("Delete the file")
            .tool(confirm.clone())
            .max_steps(5),
    )
    .await?;

    assert_eq!(first.steps.len(), 1);
    assert_eq!(first.finish_reason, FinishReason::ToolCalls);
    assert_eq!(first.pending_tool_calls()[0].tool_call_id, "c1");
    assert!(first.tool_results.is_empty());
    assert_eq!(mock.calls().len(), 1);

    // The caller answers out of band and starts a new run.
    let mut history = first.messages.clone();
    history.push(Message::tool().with_tool_result("c1", "confirm", json!({"confirmed": true})));
    let second = generate_text(
        request(&mock)
            .messages(history)
            .tool(confirm)
            .max_steps(5),
    )
    .await?;

    assert_eq!(second.steps.len(), 1);
    assert_eq!(second.text, "Deleted.");
    assert_eq!(mock.calls()[1].messages.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_mixed_calls_run_executors_then_stop() -> Result<()> {
    let confirm = ToolDefinition::new("confirm", json!({"type": "object"}));
    let mock = MockLanguageModel::new(vec![ModelResponse::tool_calls(vec![
        ModelToolCall::new("c1", "weather", r#"{"city": "Oslo"}"#),
        ModelToolCall::new("c2", "confirm", "{}"),
    ])]);

    let result = generate_text(
        request(&mock)
            .prompt("go")
            .tool(weather_tool())
            .tool(confirm)
            .max_steps(5),
    )
    .await?;

    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.tool_results.len(), 1);
    assert_eq!(result.tool_results[0].tool_call_id, "c1");
    let pending = result.pending_tool_calls();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tool_call_id, "c2");
    Ok(())
}

#[tokio::test]
async fn test_unknown_tool_fails_the_run() -> Result<()> {
    let mock = MockLanguageModel::new(vec![call("c1", "stocks", "{}")]);

    let failure = generate_text(
        request(&mock)
            .prompt("go")
            .tool(clock_tool())
            .max_steps(3),
    )
    .await
    .unwrap_err();

    assert_eq!(failure.stage, Stage::Validation);
    assert_eq!(failure.kind(), ErrorKind::NoSuchTool);
    assert!(failure.steps.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failure_keeps_completed_steps() -> Result<()> {
    let mock = MockLanguageModel::with_turns(vec![
        MockTurn::Respond(call("c1", "currentTime", "{}")),
        MockTurn::Fail(GenerateError::ApiCall {
            message: "unauthorized".to_string(),
            status_code: Some(401),
            retryable: false,
        }),
    ]);

    let failure = generate_text(
        request(&mock)
            .prompt("time?")
            .tool(clock_tool())
            .max_steps(3),
    )
    .await
    .unwrap_err();

    assert_eq!(failure.stage, Stage::ModelCall);
    assert_eq!(failure.kind(), ErrorKind::ApiCall);
    assert_eq!(failure.steps.len(), 1);
    assert_eq!(failure.steps[0].tool_results.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let rate_limited = GenerateError::ApiCall {
        message: "slow down".to_string(),
        status_code: Some(429),
        retryable: true,
    };
    let mock = MockLanguageModel::with_turns(vec![
        MockTurn::Fail(rate_limited.clone()),
        MockTurn::Fail(rate_limited),
        MockTurn::Respond(ModelResponse::text("finally")),
    ]);

    let result = generate_text(
        GenerateRequest::new(Arc::new(mock.clone()))
            .prompt("hi")
            .retry(RetryPolicy::new(2, Duration::from_millis(1))),
    )
    .await?;

    assert_eq!(result.text, "finally");
    assert_eq!(mock.calls().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_call() -> Result<()> {
    let mock = MockLanguageModel::new(vec![ModelResponse::text("unused")]);

    let failure = generate_text(request(&mock)).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Validation);
    assert_eq!(failure.kind(), ErrorKind::InvalidArgument);

    let failure = generate_text(request(&mock).prompt("hi").max_steps(0))
        .await
        .unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::InvalidArgument);

    assert!(mock.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_run_makes_no_calls() -> Result<()> {
    let mock = MockLanguageModel::new(vec![ModelResponse::text("unused")]);
    let token = CancellationToken::new();
    token.cancel();

    let failure = generate_text(request(&mock).prompt("hi").cancellation(token))
        .await
        .unwrap_err();

    assert_eq!(failure.error, GenerateError::Cancelled);
    assert!(mock.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_history_round_trips_through_json() -> Result<()> {
    let response = ModelResponse {
        text: Some("Done thinking.".to_string()),
        reasoning: vec![
            ReasoningOutput::Text {
                text: "Let me see.".to_string(),
                signature: Some("sig-1".to_string()),
            },
            ReasoningOutput::Redacted {
                data: "b3BhcXVlIGJsb2I=".to_string(),
            },
        ],
        finish_reason: FinishReason::Stop,
        ..Default::default()
    };
    let mock = MockLanguageModel::new(vec![response]);
    let history = vec![Message::user().with_content(
        ContentPart::text("Think hard")
            .with_provider_metadata("anthropic", json!({"cacheControl": {"type": "ephemeral"}})),
    )];

    let result = generate_text(request(&mock).messages(history)).await?;

    let json = serde_json::to_string(&result.messages)?;
    let parsed: Vec<Message> = serde_json::from_str(&json)?;
    assert_eq!(parsed, result.messages);
    assert_eq!(serde_json::to_string(&parsed)?, json);

    let assistant = &parsed[1];
    assert!(matches!(
        &assistant.content[1],
        ContentPart::RedactedReasoning(part) if part.data == "b3BhcXVlIGJsb2I="
    ));
    Ok(())
}

#[tokio::test]
async fn test_callbacks_see_every_step() -> Result<()> {
    let steps_seen = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (steps_counter, finish_counter) = (Arc::clone(&steps_seen), Arc::clone(&finished));
    let mock = MockLanguageModel::new(vec![
        call("c1", "currentTime", "{}"),
        ModelResponse::text("It is 10:00."),
    ]);

    generate_text(
        request(&mock)
            .prompt("time?")
            .tool(clock_tool())
            .max_steps(3)
            .on_step_finish(move |_step| {
                steps_counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_finish(move |result| {
                assert_eq!(result.steps.len(), 2);
                finish_counter.fetch_add(1, Ordering::SeqCst);
            }),
    )
    .await?;

    assert_eq!(steps_seen.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_response_metadata_is_filled() -> Result<()> {
    let mock = MockLanguageModel::new(vec![ModelResponse::text("hi")]).with_ids("acme", "acme-1");
    let result = generate_text(request(&mock).prompt("hi")).await?;

    let response = &result.steps[0].response;
    assert!(response.id.as_deref().is_some_and(|id| id.starts_with("msg-")));
    assert_eq!(response.model_id.as_deref(), Some("acme-1"));
    assert!(response.timestamp.is_some());
    Ok(())
}

#[tokio::test]
async fn test_middleware_wrapped_model_in_a_run() -> Result<()> {
    let mock = MockLanguageModel::new(vec![ModelResponse::text(
        "<think>The user wants a greeting.</think>Hello!",
    )]);
    let model = wrap_model(Arc::new(mock), vec![Arc::new(ExtractReasoning::new("think"))]);

    let result = generate_text(GenerateRequest::new(model).prompt("hi")).await?;

    assert_eq!(result.text, "Hello!");
    assert_eq!(
        result.reasoning_text().as_deref(),
        Some("The user wants a greeting.")
    );
    Ok(())
}

#[tokio::test]
async fn test_models_resolved_through_registry() -> Result<()> {
    let mut registry = ProviderRegistry::default();
    registry.register(
        "mock",
        |model_id: &str| -> gaggle::GenerateResult<Arc<dyn LanguageModel>> {
            Ok(Arc::new(
                MockLanguageModel::new(vec![ModelResponse::text("from the registry")])
                    .with_ids("mock", model_id),
            ))
        },
    );

    let model = registry.language_model("mock:small")?;
    assert_eq!(model.model_id(), "small");
    let result = generate_text(GenerateRequest::new(model).prompt("hi")).await?;
    assert_eq!(result.text, "from the registry");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_history() -> Result<()> {
    let history = vec![Message::user().with_text("hi")];
    let first = MockLanguageModel::new(vec![ModelResponse::text("one")]);
    let second = MockLanguageModel::new(vec![ModelResponse::text("two")]);

    let (a, b) = tokio::join!(
        generate_text(request(&first).messages(history.clone())),
        generate_text(request(&second).messages(history.clone())),
    );
    let (a, b) = (a?, b?);

    assert_eq!(history.len(), 1);
    assert_eq!(a.messages.len(), 2);
    assert_eq!(b.messages.len(), 2);
    assert_eq!(a.messages[1].text(), "one");
    assert_eq!(b.messages[1].text(), "two");
    Ok(())
}
