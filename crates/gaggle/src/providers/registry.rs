use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::base::LanguageModel;
use crate::errors::{GenerateError, GenerateResult};

/// Produces model instances for one provider.
pub trait ProviderFactory: Send + Sync {
    fn language_model(&self, model_id: &str) -> GenerateResult<Arc<dyn LanguageModel>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&str) -> GenerateResult<Arc<dyn LanguageModel>> + Send + Sync,
{
    fn language_model(&self, model_id: &str) -> GenerateResult<Arc<dyn LanguageModel>> {
        self(model_id)
    }
}

/// Resolves `"provider:model"` ids to model instances at runtime.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `id`, replacing any previous one
    pub fn register<S, F>(&mut self, id: S, factory: F) -> &mut Self
    where
        S: Into<String>,
        F: ProviderFactory + 'static,
    {
        self.providers.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Look up a model by its `"provider:model"` id
    pub fn language_model(&self, id: &str) -> GenerateResult<Arc<dyn LanguageModel>> {
        let (provider_id, model_id) = id.split_once(':').ok_or_else(|| {
            GenerateError::invalid_argument(
                "id",
                format!("Invalid model id: {id}. Expected the form \"providerId:modelId\""),
            )
        })?;

        let factory =
            self.providers
                .get(provider_id)
                .ok_or_else(|| GenerateError::NoSuchProvider {
                    provider_id: provider_id.to_string(),
                    available_providers: self.provider_ids(),
                })?;

        debug!(provider = provider_id, model = model_id, "resolved language model");
        factory.language_model(model_id)
    }
}
