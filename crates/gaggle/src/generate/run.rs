use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use super::request::{FinishCallback, GenerateRequest, StepCallback};
use super::result::{GenerateTextResult, Step, StepType};
use crate::download::{inline_unsupported_urls, Downloader, HttpDownloader};
use crate::errors::{GenerateError, GenerateResult, RunFailure, Stage};
use crate::models::content::{ContentPart, ProviderMetadata};
use crate::models::message::Message;
use crate::prompt::{standardize_prompt, validate_call_settings, validate_tool_choice};
use crate::providers::base::{
    CallOptions, CallWarning, FinishReason, LanguageModel, ModelEventStream, ModelResponse,
    ReasoningOutput, ResponseMetadata, Usage,
};
use crate::retry::RetryPolicy;
use crate::tools::{ParsedToolCall, ToolOutcome, ToolSet};

/// What one model call produced, with tool calls already resolved.
#[derive(Debug, Default)]
pub(crate) struct StepOutput {
    pub text: String,
    pub reasoning: Vec<ReasoningOutput>,
    pub tool_calls: Vec<ParsedToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: Option<ProviderMetadata>,
    pub response: ResponseMetadata,
    pub warnings: Vec<CallWarning>,
}

impl StepOutput {
    pub fn from_response(response: ModelResponse, tools: &ToolSet) -> GenerateResult<Self> {
        let tool_calls = response
            .tool_calls
            .iter()
            .map(|call| tools.parse_call(call))
            .collect::<GenerateResult<Vec<_>>>()?;
        Ok(Self {
            text: response.text.unwrap_or_default(),
            reasoning: response.reasoning,
            tool_calls,
            finish_reason: response.finish_reason,
            usage: response.usage,
            provider_metadata: response.provider_metadata,
            response: response.response,
            warnings: response.warnings,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepDecision {
    Continue,
    Done,
}

/// State of one run: the history it owns and the steps completed so far.
///
/// Shared by the generating and the streaming front ends, which differ only in
/// how a step's model output is obtained.
pub(crate) struct Run {
    pub run_id: Uuid,
    pub model: Arc<dyn LanguageModel>,
    pub tools: ToolSet,
    pub cancellation: CancellationToken,
    options: CallOptions,
    max_steps: u32,
    retry: RetryPolicy,
    downloader: Arc<dyn Downloader>,
    on_step_finish: Option<StepCallback>,
    on_finish: Option<FinishCallback>,
    history: Vec<Message>,
    steps: Vec<Step>,
}

impl Run {
    pub fn new(request: GenerateRequest) -> GenerateResult<Self> {
        if request.max_steps == 0 {
            return Err(GenerateError::invalid_argument(
                "max_steps",
                "must be at least 1",
            ));
        }
        validate_call_settings(&request.call_settings)?;
        validate_tool_choice(request.tool_choice.as_ref(), &request.tools)?;
        let history = standardize_prompt(request.system.as_deref(), request.prompt)?;

        let downloader: Arc<dyn Downloader> = match request.downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpDownloader::new()?),
        };

        Ok(Self {
            run_id: Uuid::new_v4(),
            options: CallOptions {
                messages: Vec::new(),
                tools: request.tools.tools(),
                tool_choice: request.tool_choice,
                settings: request.call_settings,
                provider_options: request.provider_options,
            },
            model: request.model,
            tools: request.tools,
            cancellation: request.cancellation,
            max_steps: request.max_steps,
            retry: request.retry,
            downloader,
            on_step_finish: request.on_step_finish,
            on_finish: request.on_finish,
            history,
            steps: Vec::new(),
        })
    }

    pub fn step_number(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Move the run to `Failed`, keeping the steps completed so far.
    pub fn fail(&self, stage: Stage, error: GenerateError) -> RunFailure {
        if error == GenerateError::Cancelled {
            debug!(run_id = %self.run_id, %stage, "run cancelled");
        } else {
            error!(run_id = %self.run_id, %stage, error = %error, "run failed");
        }
        RunFailure::new(stage, error, self.steps.clone())
    }

    /// The request for the next model call, with unsupported URLs inlined.
    pub async fn next_call_options(&self) -> Result<CallOptions, RunFailure> {
        if self.cancellation.is_cancelled() {
            return Err(self.fail(Stage::ModelCall, GenerateError::Cancelled));
        }
        let messages = tokio::select! {
            _ = self.cancellation.cancelled() => {
                return Err(self.fail(Stage::ModelCall, GenerateError::Cancelled));
            }
            messages = inline_unsupported_urls(
                self.history.clone(),
                self.model.as_ref(),
                self.downloader.as_ref(),
                &self.retry,
            ) => messages.map_err(|e| self.fail(Stage::ModelCall, e))?,
        };
        Ok(CallOptions {
            messages,
            ..self.options.clone()
        })
    }

    pub async fn call_generate(&self, options: &CallOptions) -> Result<ModelResponse, RunFailure> {
        debug!(run_id = %self.run_id, step = self.step_number(), "calling model");
        tokio::select! {
            _ = self.cancellation.cancelled() => {
                Err(self.fail(Stage::ModelCall, GenerateError::Cancelled))
            }
            response = self.retry.run(|| self.model.generate(options)) => {
                response.map_err(|e| self.fail(Stage::ModelCall, e))
            }
        }
    }

    /// Open the model's event stream. Only opening is retried; errors while
    /// pulling events are not.
    pub async fn open_stream(&self, options: &CallOptions) -> Result<ModelEventStream, RunFailure> {
        debug!(run_id = %self.run_id, step = self.step_number(), "streaming from model");
        tokio::select! {
            _ = self.cancellation.cancelled() => {
                Err(self.fail(Stage::ModelCall, GenerateError::Cancelled))
            }
            events = self.retry.run(|| self.model.stream(options)) => {
                events.map_err(|e| self.fail(Stage::ModelCall, e))
            }
        }
    }

    /// Run the step's tools if the loop may go on, record the step and decide
    /// whether another model call follows.
    pub async fn finish_step(
        &mut self,
        request_messages: Vec<Message>,
        output: StepOutput,
    ) -> Result<StepDecision, RunFailure> {
        let step_number = self.step_number();
        let step_type = if self.steps.is_empty() {
            StepType::Initial
        } else {
            StepType::ToolResult
        };
        let tool_calls: Vec<_> = output
            .tool_calls
            .iter()
            .map(|parsed| parsed.call.clone())
            .collect();

        let mut finish_reason = output.finish_reason;
        let mut tool_results = Vec::new();
        let mut decision = StepDecision::Done;

        if !tool_calls.is_empty() {
            if step_number >= self.max_steps as usize {
                // Out of steps: the calls stay visible and unanswered.
                debug!(
                    run_id = %self.run_id,
                    step = step_number,
                    pending = tool_calls.len(),
                    "step limit reached with tool calls pending"
                );
                finish_reason = FinishReason::Length;
            } else {
                let snapshot = Arc::new(request_messages.clone());
                let outcomes = tokio::select! {
                    _ = self.cancellation.cancelled() => {
                        return Err(self.fail(Stage::ToolExecution, GenerateError::Cancelled));
                    }
                    outcomes = self.tools.invoke_all(output.tool_calls, snapshot, &self.cancellation) => outcomes,
                };

                let mut pending = 0;
                for outcome in outcomes {
                    match outcome {
                        ToolOutcome::Completed(result) => tool_results.push(result),
                        ToolOutcome::Pending(_) => pending += 1,
                    }
                }
                if pending == 0 {
                    decision = StepDecision::Continue;
                } else {
                    debug!(
                        run_id = %self.run_id,
                        step = step_number,
                        pending,
                        "tool calls left for the caller"
                    );
                }
            }
        }

        let mut content = Vec::new();
        for reasoning in output.reasoning {
            content.push(match reasoning {
                ReasoningOutput::Text { text, signature } => ContentPart::reasoning(text, signature),
                ReasoningOutput::Redacted { data } => ContentPart::redacted_reasoning(data),
            });
        }
        if !output.text.is_empty() {
            content.push(ContentPart::text(output.text.clone()));
        }
        content.extend(tool_calls.iter().cloned().map(ContentPart::from));

        let mut assistant = Message::assistant();
        assistant.content = content.clone();
        let mut response_messages = vec![assistant];
        if !tool_results.is_empty() {
            let mut tool = Message::tool();
            tool.content = tool_results.iter().cloned().map(ContentPart::from).collect();
            response_messages.push(tool);
        }
        self.history.extend(response_messages.iter().cloned());

        let response = ResponseMetadata {
            id: output
                .response
                .id
                .or_else(|| Some(format!("msg-{}", nanoid::nanoid!(24)))),
            model_id: output
                .response
                .model_id
                .or_else(|| Some(self.model.model_id().to_string())),
            timestamp: output.response.timestamp.or_else(|| Some(Utc::now())),
        };

        let step = Step {
            step_type,
            request_messages,
            content,
            text: output.text,
            tool_calls,
            tool_results,
            finish_reason,
            usage: output.usage,
            warnings: output.warnings,
            response,
            provider_metadata: output.provider_metadata,
            response_messages,
        };
        debug!(
            run_id = %self.run_id,
            step = step_number,
            finish_reason = %step.finish_reason,
            input_tokens = step.usage.input_tokens,
            output_tokens = step.usage.output_tokens,
            "step finished"
        );
        if let Some(callback) = &self.on_step_finish {
            callback(&step);
        }
        self.steps.push(step);

        Ok(decision)
    }

    /// Seal the run into its aggregate result.
    pub fn finish(self) -> GenerateTextResult {
        let Run {
            steps,
            history,
            on_finish,
            run_id,
            ..
        } = self;
        let result = GenerateTextResult::from_steps(steps, history);
        debug!(
            %run_id,
            steps = result.steps.len(),
            finish_reason = %result.finish_reason,
            total_tokens = result.usage.total_tokens,
            "run finished"
        );
        if let Some(callback) = on_finish {
            callback(&result);
        }
        result
    }
}
