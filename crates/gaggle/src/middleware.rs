//! Decorators around a [`LanguageModel`].
//!
//! A [`Middleware`] can rewrite the request before it reaches the model and
//! rewrite the response or event stream on the way back. [`wrap_model`] folds a
//! list of middlewares around a model so that the first one in the list is the
//! outermost layer: its `transform_params` sees the request first and its
//! wrappers see the output last.
use std::sync::Arc;

use async_trait::async_trait;
use strum_macros::Display;
use url::Url;

use crate::errors::GenerateResult;
use crate::providers::base::{CallOptions, LanguageModel, ModelEventStream, ModelResponse};

pub mod default_settings;
pub mod extract_reasoning;
pub mod simulate_streaming;

pub use default_settings::DefaultSettings;
pub use extract_reasoning::ExtractReasoning;
pub use simulate_streaming::SimulateStreaming;

/// Which model entry point a request is headed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CallType {
    Generate,
    Stream,
}

/// Every hook defaults to a passthrough.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn transform_params(
        &self,
        options: CallOptions,
        _call_type: CallType,
    ) -> GenerateResult<CallOptions> {
        Ok(options)
    }

    /// Called with the next model in the chain and the transformed options.
    async fn wrap_generate(
        &self,
        model: &dyn LanguageModel,
        options: &CallOptions,
    ) -> GenerateResult<ModelResponse> {
        model.generate(options).await
    }

    async fn wrap_stream(
        &self,
        model: &dyn LanguageModel,
        options: &CallOptions,
    ) -> GenerateResult<ModelEventStream> {
        model.stream(options).await
    }
}

/// A model seen through one middleware layer.
pub struct MiddlewareModel {
    inner: Arc<dyn LanguageModel>,
    middleware: Arc<dyn Middleware>,
}

impl MiddlewareModel {
    pub fn new(inner: Arc<dyn LanguageModel>, middleware: Arc<dyn Middleware>) -> Self {
        Self { inner, middleware }
    }
}

#[async_trait]
impl LanguageModel for MiddlewareModel {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn supports_url(&self, url: &Url) -> bool {
        self.inner.supports_url(url)
    }

    async fn generate(&self, options: &CallOptions) -> GenerateResult<ModelResponse> {
        let options = self
            .middleware
            .transform_params(options.clone(), CallType::Generate)
            .await?;
        self.middleware
            .wrap_generate(self.inner.as_ref(), &options)
            .await
    }

    async fn stream(&self, options: &CallOptions) -> GenerateResult<ModelEventStream> {
        let options = self
            .middleware
            .transform_params(options.clone(), CallType::Stream)
            .await?;
        self.middleware.wrap_stream(self.inner.as_ref(), &options).await
    }
}

/// Wrap `model` in `middlewares`, first element outermost.
pub fn wrap_model(
    model: Arc<dyn LanguageModel>,
    middlewares: Vec<Arc<dyn Middleware>>,
) -> Arc<dyn LanguageModel> {
    middlewares
        .into_iter()
        .rev()
        .fold(model, |inner, middleware| {
            Arc::new(MiddlewareModel::new(inner, middleware))
        })
}
