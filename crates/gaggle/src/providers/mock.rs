use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use url::Url;

use crate::errors::{GenerateError, GenerateResult};
use crate::providers::base::{
    CallOptions, LanguageModel, ModelEvent, ModelEventStream, ModelResponse, ReasoningOutput,
};

/// One scripted reply of a [`MockLanguageModel`].
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Served as-is by `generate`, replayed as events by `stream`.
    Respond(ModelResponse),
    /// Served as-is by `stream`, folded into a response by `generate`.
    Events(Vec<GenerateResult<ModelEvent>>),
    /// Streams the events, then never yields again.
    EventsThenHang(Vec<ModelEvent>),
    /// The call itself fails.
    Fail(GenerateError),
}

/// A model that returns pre-configured replies, for testing
#[derive(Clone)]
pub struct MockLanguageModel {
    provider: String,
    model_id: String,
    turns: Arc<Mutex<VecDeque<MockTurn>>>,
    calls: Arc<Mutex<Vec<CallOptions>>>,
    supports_urls: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLanguageModel {
    /// Create a new mock model with a sequence of responses
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_turns(responses.into_iter().map(MockTurn::Respond).collect())
    }

    pub fn with_turns(turns: Vec<MockTurn>) -> Self {
        Self {
            provider: "mock".to_string(),
            model_id: "mock-model".to_string(),
            turns: Arc::new(Mutex::new(turns.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
            supports_urls: true,
        }
    }

    pub fn with_ids<P: Into<String>, M: Into<String>>(mut self, provider: P, model_id: M) -> Self {
        self.provider = provider.into();
        self.model_id = model_id.into();
        self
    }

    /// Report every URL as unsupported, so the engine downloads referenced content
    pub fn without_url_support(mut self) -> Self {
        self.supports_urls = false;
        self
    }

    /// Every request this model has received, in order
    pub fn calls(&self) -> Vec<CallOptions> {
        lock(&self.calls).clone()
    }

    fn next_turn(&self, options: &CallOptions) -> Option<MockTurn> {
        lock(&self.calls).push(options.clone());
        lock(&self.turns).pop_front()
    }
}

fn fold_events(events: Vec<GenerateResult<ModelEvent>>) -> GenerateResult<ModelResponse> {
    let mut response = ModelResponse::default();
    let mut output = String::new();
    for event in events {
        match event? {
            ModelEvent::ResponseMetadata(metadata) => response.response = metadata,
            ModelEvent::TextDelta(delta) => output.push_str(&delta),
            ModelEvent::ReasoningDelta(delta) => match response.reasoning.last_mut() {
                Some(ReasoningOutput::Text { text, signature: None }) => text.push_str(&delta),
                _ => response.reasoning.push(ReasoningOutput::Text {
                    text: delta,
                    signature: None,
                }),
            },
            ModelEvent::ReasoningSignature(sig) => {
                if let Some(ReasoningOutput::Text { signature, .. }) = response.reasoning.last_mut()
                {
                    *signature = Some(sig);
                }
            }
            ModelEvent::RedactedReasoning(data) => {
                response.reasoning.push(ReasoningOutput::Redacted { data })
            }
            ModelEvent::ToolCallDelta { .. } => {}
            ModelEvent::ToolCall(call) => response.tool_calls.push(call),
            ModelEvent::Finish {
                finish_reason,
                usage,
                provider_metadata,
            } => {
                response.finish_reason = finish_reason;
                response.usage = usage;
                response.provider_metadata = provider_metadata;
            }
            ModelEvent::Error(message) => {
                return Err(GenerateError::ApiCall {
                    message,
                    status_code: None,
                    retryable: false,
                })
            }
        }
    }
    response.text = Some(output);
    Ok(response)
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn supports_url(&self, _url: &Url) -> bool {
        self.supports_urls
    }

    async fn generate(&self, options: &CallOptions) -> GenerateResult<ModelResponse> {
        match self.next_turn(options) {
            // Return an empty response once the script runs out
            None => Ok(ModelResponse::text("")),
            Some(MockTurn::Respond(response)) => Ok(response),
            Some(MockTurn::Events(events)) => fold_events(events),
            Some(MockTurn::EventsThenHang(_)) => futures::future::pending().await,
            Some(MockTurn::Fail(err)) => Err(err),
        }
    }

    async fn stream(&self, options: &CallOptions) -> GenerateResult<ModelEventStream> {
        match self.next_turn(options) {
            None => Ok(stream::iter(ModelResponse::text("").into_events().into_iter().map(Ok)).boxed()),
            Some(MockTurn::Respond(response)) => {
                Ok(stream::iter(response.into_events().into_iter().map(Ok)).boxed())
            }
            Some(MockTurn::Events(events)) => Ok(stream::iter(events).boxed()),
            Some(MockTurn::EventsThenHang(events)) => Ok(stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(MockTurn::Fail(err)) => Err(err),
        }
    }
}
