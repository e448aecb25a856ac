//! Streaming runs.
//!
//! [`stream_text`] runs the same step loop as [`crate::generate_text`] but
//! exposes it as one pull-based sequence of [`StreamPart`]s spanning every
//! step. Nothing happens until the sequence is polled: the next provider event
//! is only requested when the consumer asks for the next part, and tools run
//! only after their step's events have all been received.
//!
//! Aggregates such as [`StreamTextResult::usage`] resolve once the sequence
//! has ended. They fail with the run's failure, including cancellation, and
//! never hang: if no consumer has taken the sequence, awaiting an aggregate
//! drains it, and [`StreamTextResult::cancel`] settles them even while a
//! consumer holds the sequence without polling it. A run that is cancelled or
//! abandoned still reports the steps it finished.
use std::sync::{Arc, Mutex, MutexGuard};

use async_stream::stream;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{GenerateError, GenerateResult, RunFailure, Stage};
use crate::generate::run::{Run, StepDecision, StepOutput};
use crate::generate::{GenerateRequest, GenerateTextResult, Step};
use crate::models::content::{ProviderMetadata, ToolCallPart, ToolResultPart};
use crate::models::message::Message;
use crate::providers::base::{FinishReason, ModelEvent, ReasoningOutput, Usage};

pub mod data_stream;
pub mod parts;

pub use parts::StreamPart;

type Outcome = Result<Arc<GenerateTextResult>, RunFailure>;

/// Handle to a streaming run.
pub struct StreamTextResult {
    parts: Mutex<Option<BoxStream<'static, StreamPart>>>,
    outcome: Shared<BoxFuture<'static, Outcome>>,
    cancellation: CancellationToken,
}

/// Start a streaming run.
///
/// Request validation happens here; everything else happens as the returned
/// stream is consumed.
pub fn stream_text(request: GenerateRequest) -> Result<StreamTextResult, RunFailure> {
    let run = Run::new(request).map_err(|e| RunFailure::new(Stage::Validation, e, Vec::new()))?;
    let cancellation = run.cancellation.clone();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = oneshot::channel::<Result<GenerateTextResult, RunFailure>>();

    let token = cancellation.clone();
    let mirror = Arc::clone(&completed);
    let outcome = async move {
        // A settled run wins over a cancellation that raced it.
        tokio::select! {
            biased;
            settled = rx => match settled {
                Ok(outcome) => outcome.map(Arc::new),
                // The stream was dropped before it ended.
                Err(_) => Err(aborted(&mirror)),
            },
            _ = token.cancelled() => Err(aborted(&mirror)),
        }
    }
    .boxed()
    .shared();

    Ok(StreamTextResult {
        parts: Mutex::new(Some(drive(run, tx, completed))),
        outcome,
        cancellation,
    })
}

fn lock_steps(steps: &Mutex<Vec<Step>>) -> MutexGuard<'_, Vec<Step>> {
    steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The failure of a run that was cancelled or abandoned mid-stream, keeping
/// the steps it finished.
fn aborted(completed: &Mutex<Vec<Step>>) -> RunFailure {
    RunFailure::new(
        Stage::StreamConsumption,
        GenerateError::Cancelled,
        lock_steps(completed).clone(),
    )
}

fn push_reasoning(reasoning: &mut Vec<ReasoningOutput>, delta: &str) {
    match reasoning.last_mut() {
        Some(ReasoningOutput::Text {
            text,
            signature: None,
        }) => text.push_str(delta),
        _ => reasoning.push(ReasoningOutput::Text {
            text: delta.to_string(),
            signature: None,
        }),
    }
}

fn step_finish_part(step: &Step, decision: StepDecision) -> StreamPart {
    StreamPart::StepFinish {
        step_type: step.step_type,
        finish_reason: step.finish_reason,
        usage: step.usage,
        response: step.response.clone(),
        provider_metadata: step.provider_metadata.clone(),
        is_continued: decision == StepDecision::Continue,
    }
}

/// The step loop as a lazy sequence of parts. Settles `tx` when it ends; if
/// the sequence is dropped first, `tx` is dropped with it. Every finished step
/// is copied into `completed`.
fn drive(
    mut run: Run,
    tx: oneshot::Sender<Result<GenerateTextResult, RunFailure>>,
    completed: Arc<Mutex<Vec<Step>>>,
) -> BoxStream<'static, StreamPart> {
    stream! {
        let outcome: Result<(), RunFailure> = loop {
            let options = match run.next_call_options().await {
                Ok(options) => options,
                Err(failure) => break Err(failure),
            };
            let mut events = match run.open_stream(&options).await {
                Ok(events) => events,
                Err(failure) => break Err(failure),
            };

            let mut output = StepOutput::default();
            let mut failure = None;
            loop {
                let event = tokio::select! {
                    _ = run.cancellation.cancelled() => {
                        failure = Some(run.fail(Stage::StreamConsumption, GenerateError::Cancelled));
                        break;
                    }
                    event = events.next() => event,
                };
                let event = match event {
                    None => break,
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        failure = Some(run.fail(Stage::StreamConsumption, err));
                        break;
                    }
                };

                match event {
                    ModelEvent::ResponseMetadata(metadata) => output.response = metadata,
                    ModelEvent::TextDelta(delta) => {
                        if !delta.is_empty() {
                            output.text.push_str(&delta);
                            yield StreamPart::TextDelta(delta);
                        }
                    }
                    ModelEvent::ReasoningDelta(delta) => {
                        push_reasoning(&mut output.reasoning, &delta);
                        yield StreamPart::ReasoningDelta(delta);
                    }
                    ModelEvent::ReasoningSignature(sig) => {
                        if let Some(ReasoningOutput::Text { signature, .. }) = output.reasoning.last_mut() {
                            *signature = Some(sig.clone());
                        }
                        yield StreamPart::ReasoningSignature(sig);
                    }
                    ModelEvent::RedactedReasoning(data) => {
                        output.reasoning.push(ReasoningOutput::Redacted { data: data.clone() });
                        yield StreamPart::RedactedReasoning(data);
                    }
                    ModelEvent::ToolCallDelta { tool_call_id, tool_name, args_text_delta } => {
                        yield StreamPart::ToolCallDelta { tool_call_id, tool_name, args_text_delta };
                    }
                    ModelEvent::ToolCall(call) => match run.tools.parse_call(&call) {
                        Ok(parsed) => {
                            let part = parsed.call.clone();
                            output.tool_calls.push(parsed);
                            yield StreamPart::ToolCall(part);
                        }
                        Err(err) => {
                            failure = Some(run.fail(Stage::Validation, err));
                            break;
                        }
                    },
                    ModelEvent::Finish { finish_reason, usage, provider_metadata } => {
                        output.finish_reason = finish_reason;
                        output.usage = usage;
                        output.provider_metadata = provider_metadata;
                    }
                    ModelEvent::Error(message) => {
                        debug!(run_id = %run.run_id, %message, "provider reported an error in-band");
                        yield StreamPart::Error(GenerateError::ApiCall {
                            message,
                            status_code: None,
                            retryable: false,
                        });
                    }
                }
            }
            drop(events);
            if let Some(failure) = failure {
                break Err(failure);
            }

            let decision = match run.finish_step(options.messages, output).await {
                Ok(decision) => decision,
                Err(failure) => break Err(failure),
            };
            if let Some(step) = run.last_step() {
                lock_steps(&completed).push(step.clone());
                let results = step.tool_results.clone();
                let finish = step_finish_part(step, decision);
                for result in results {
                    yield StreamPart::ToolResult(result);
                }
                yield finish;
            }
            if decision == StepDecision::Done {
                break Ok(());
            }
        };

        match outcome {
            Ok(()) => {
                let result = run.finish();
                yield StreamPart::Finish {
                    finish_reason: result.finish_reason,
                    usage: result.usage,
                    provider_metadata: result.provider_metadata.clone(),
                };
                let _ = tx.send(Ok(result));
            }
            Err(failure) => {
                let error = failure.error.clone();
                let _ = tx.send(Err(failure));
                yield StreamPart::Error(error);
            }
        }
    }
    .boxed()
}

impl StreamTextResult {
    fn take_parts(&self) -> GenerateResult<BoxStream<'static, StreamPart>> {
        self.parts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| {
                GenerateError::invalid_argument("stream", "the stream has already been taken")
            })
    }

    /// Every part of the run. Can be taken once.
    pub fn full_stream(&self) -> GenerateResult<BoxStream<'static, StreamPart>> {
        self.take_parts()
    }

    /// Only the text deltas of the run. Shares the single pass of
    /// [`Self::full_stream`].
    pub fn text_stream(&self) -> GenerateResult<BoxStream<'static, String>> {
        Ok(self
            .take_parts()?
            .filter_map(|part| async move {
                match part {
                    StreamPart::TextDelta(delta) => Some(delta),
                    _ => None,
                }
            })
            .boxed())
    }

    /// The run encoded in the data stream line protocol.
    pub fn data_stream(&self) -> GenerateResult<BoxStream<'static, String>> {
        Ok(self
            .take_parts()?
            .map(|part| data_stream::encode_part(&part))
            .boxed())
    }

    /// Abort the run. No further model calls or tool executions start, the
    /// stream ends and pending aggregates fail with a cancellation error.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// The aggregate result once the run has ended.
    pub async fn result(&self) -> Outcome {
        if let Ok(mut parts) = self.take_parts() {
            while parts.next().await.is_some() {}
        }
        self.outcome.clone().await
    }

    pub async fn text(&self) -> Result<String, RunFailure> {
        Ok(self.result().await?.text.clone())
    }

    pub async fn usage(&self) -> Result<Usage, RunFailure> {
        Ok(self.result().await?.usage)
    }

    pub async fn finish_reason(&self) -> Result<FinishReason, RunFailure> {
        Ok(self.result().await?.finish_reason)
    }

    pub async fn provider_metadata(&self) -> Result<Option<ProviderMetadata>, RunFailure> {
        Ok(self.result().await?.provider_metadata.clone())
    }

    pub async fn tool_calls(&self) -> Result<Vec<ToolCallPart>, RunFailure> {
        Ok(self.result().await?.tool_calls.clone())
    }

    pub async fn tool_results(&self) -> Result<Vec<ToolResultPart>, RunFailure> {
        Ok(self.result().await?.tool_results.clone())
    }

    pub async fn steps(&self) -> Result<Vec<Step>, RunFailure> {
        Ok(self.result().await?.steps.clone())
    }

    /// The full history: input followed by generated messages
    pub async fn messages(&self) -> Result<Vec<Message>, RunFailure> {
        Ok(self.result().await?.messages.clone())
    }

    pub async fn response_messages(&self) -> Result<Vec<Message>, RunFailure> {
        Ok(self.result().await?.response_messages.clone())
    }
}
