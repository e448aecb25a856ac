use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::result::{GenerateTextResult, Step};
use crate::download::Downloader;
use crate::models::content::ProviderMetadata;
use crate::models::message::Message;
use crate::models::tool::ToolChoice;
use crate::prompt::Prompt;
use crate::providers::base::{CallSettings, LanguageModel};
use crate::retry::RetryPolicy;
use crate::settings::GenerateSettings;
use crate::tools::{ToolDefinition, ToolSet};

pub type StepCallback = Arc<dyn Fn(&Step) + Send + Sync>;
pub type FinishCallback = Arc<dyn Fn(&GenerateTextResult) + Send + Sync>;

/// Everything one run needs. Built with chained setters:
///
/// ```ignore
/// let request = GenerateRequest::new(model)
///     .system("Answer briefly.")
///     .prompt("What time is it?")
///     .tool(clock)
///     .max_steps(3);
/// ```
#[derive(Clone)]
pub struct GenerateRequest {
    pub model: Arc<dyn LanguageModel>,
    pub system: Option<String>,
    pub prompt: Option<Prompt>,
    pub tools: ToolSet,
    pub tool_choice: Option<ToolChoice>,
    pub call_settings: CallSettings,
    pub provider_options: ProviderMetadata,
    /// Upper bound on model calls in this run, at least 1
    pub max_steps: u32,
    pub retry: RetryPolicy,
    /// Fetches URL content the model cannot fetch itself. Plain HTTP when unset.
    pub downloader: Option<Arc<dyn Downloader>>,
    pub on_step_finish: Option<StepCallback>,
    pub on_finish: Option<FinishCallback>,
    pub cancellation: CancellationToken,
}

impl GenerateRequest {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        let settings = GenerateSettings::default();
        Self {
            model,
            system: None,
            prompt: None,
            tools: ToolSet::new(),
            tool_choice: None,
            call_settings: CallSettings::default(),
            provider_options: ProviderMetadata::new(),
            max_steps: settings.max_steps,
            retry: settings.retry_policy(),
            downloader: None,
            on_step_finish: None,
            on_finish: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn prompt<P: Into<Prompt>>(mut self, prompt: P) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Use `messages` as the conversation so far. Replaces any prompt.
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.prompt = Some(Prompt::Messages(messages));
        self
    }

    pub fn tool(mut self, definition: ToolDefinition) -> Self {
        self.tools.register(definition);
        self
    }

    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn call_settings(mut self, settings: CallSettings) -> Self {
        self.call_settings = settings;
        self
    }

    pub fn provider_option<S: Into<String>>(mut self, provider: S, options: Value) -> Self {
        self.provider_options.insert(provider.into(), options);
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Take the step limit and retry policy from loaded settings
    pub fn settings(mut self, settings: &GenerateSettings) -> Self {
        self.max_steps = settings.max_steps;
        self.retry = settings.retry_policy();
        self
    }

    pub fn downloader<D: Downloader + 'static>(mut self, downloader: D) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    pub fn on_step_finish<F: Fn(&Step) + Send + Sync + 'static>(mut self, callback: F) -> Self {
        self.on_step_finish = Some(Arc::new(callback));
        self
    }

    pub fn on_finish<F: Fn(&GenerateTextResult) + Send + Sync + 'static>(
        mut self,
        callback: F,
    ) -> Self {
        self.on_finish = Some(Arc::new(callback));
        self
    }

    /// Abort the run when `token` is cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}
