use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::Middleware;
use crate::errors::GenerateResult;
use crate::providers::base::{CallOptions, LanguageModel, ModelEventStream};

/// Serves streaming calls from the model's non-streaming entry point.
///
/// Useful for models that cannot stream: the complete response is replayed as
/// the events a streaming call would have produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulateStreaming;

#[async_trait]
impl Middleware for SimulateStreaming {
    async fn wrap_stream(
        &self,
        model: &dyn LanguageModel,
        options: &CallOptions,
    ) -> GenerateResult<ModelEventStream> {
        let response = model.generate(options).await?;
        Ok(stream::iter(response.into_events().into_iter().map(Ok)).boxed())
    }
}
