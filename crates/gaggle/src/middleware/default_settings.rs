use async_trait::async_trait;
use serde_json::Value;

use super::{CallType, Middleware};
use crate::errors::GenerateResult;
use crate::models::content::ProviderMetadata;
use crate::providers::base::{CallOptions, CallSettings};

/// Fills in call settings and provider options the request left unset.
///
/// Explicit values on the request always win.
#[derive(Debug, Clone, Default)]
pub struct DefaultSettings {
    pub settings: CallSettings,
    pub provider_options: ProviderMetadata,
}

impl DefaultSettings {
    pub fn new(settings: CallSettings) -> Self {
        Self {
            settings,
            provider_options: ProviderMetadata::new(),
        }
    }

    pub fn with_provider_options<S: Into<String>>(mut self, provider: S, options: Value) -> Self {
        self.provider_options.insert(provider.into(), options);
        self
    }
}

fn merge_settings(explicit: CallSettings, defaults: &CallSettings) -> CallSettings {
    CallSettings {
        max_tokens: explicit.max_tokens.or(defaults.max_tokens),
        temperature: explicit.temperature.or(defaults.temperature),
        top_p: explicit.top_p.or(defaults.top_p),
        top_k: explicit.top_k.or(defaults.top_k),
        presence_penalty: explicit.presence_penalty.or(defaults.presence_penalty),
        frequency_penalty: explicit.frequency_penalty.or(defaults.frequency_penalty),
        stop_sequences: explicit
            .stop_sequences
            .or_else(|| defaults.stop_sequences.clone()),
        seed: explicit.seed.or(defaults.seed),
    }
}

/// Deep merge of JSON objects; non-object values in `overlay` replace `base`.
fn merge_value(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

#[async_trait]
impl Middleware for DefaultSettings {
    async fn transform_params(
        &self,
        mut options: CallOptions,
        _call_type: CallType,
    ) -> GenerateResult<CallOptions> {
        options.settings = merge_settings(options.settings, &self.settings);

        if !self.provider_options.is_empty() {
            let defaults = Value::Object(self.provider_options.clone());
            let explicit = Value::Object(std::mem::take(&mut options.provider_options));
            if let Value::Object(merged) = merge_value(defaults, explicit) {
                options.provider_options = merged;
            }
        }
        Ok(options)
    }
}
