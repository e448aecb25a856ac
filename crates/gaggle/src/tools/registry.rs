use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ToolResult;
use super::validate::{JsonSchemaValidator, SchemaValidator};
use crate::errors::{GenerateError, GenerateResult};
use crate::models::content::{ToolCallPart, ToolResultPart};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::ModelToolCall;

/// What an executor gets to see besides its arguments.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub tool_call_id: String,
    /// The conversation as sent to the model in the step that made the call.
    pub messages: Arc<Vec<Message>>,
    /// Cancelled when the run is aborted.
    pub cancellation: CancellationToken,
}

/// Executes a tool with validated arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value, context: ToolCallContext) -> ToolResult<Value>;
}

/// Adapts an async closure into a [`ToolExecutor`].
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value, ToolCallContext) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn execute(&self, args: Value, context: ToolCallContext) -> ToolResult<Value> {
        (self.0)(args, context).await
    }
}

/// A tool the model may call, optionally paired with the code that runs it.
///
/// Without an executor the engine stops when the model calls the tool and
/// leaves the call for the application to answer.
#[derive(Clone)]
pub struct ToolDefinition {
    pub tool: Tool,
    pub executor: Option<Arc<dyn ToolExecutor>>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("tool", &self.tool)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

impl ToolDefinition {
    pub fn new<N: Into<String>>(name: N, parameters: Value) -> Self {
        Self {
            tool: Tool::new(name, parameters),
            executor: None,
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.tool = self.tool.with_description(description);
        self
    }

    pub fn with_executor<E: ToolExecutor + 'static>(mut self, executor: E) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Shorthand for `with_executor(FnExecutor(f))`
    pub fn with_executor_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value, ToolCallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        self.with_executor(FnExecutor(f))
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

/// A tool call whose arguments were parsed and checked against the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub call: ToolCallPart,
    /// Set when the arguments did not parse or failed validation.
    pub invalid: Option<String>,
}

/// What came of invoking one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Completed(ToolResultPart),
    /// The tool has no executor; the application answers the call.
    Pending(ToolCallPart),
}

/// The tools available to one run, keyed by unique name.
#[derive(Clone)]
pub struct ToolSet {
    tools: BTreeMap<String, ToolDefinition>,
    validator: Arc<dyn SchemaValidator>,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            tools: BTreeMap::new(),
            validator: Arc::new(JsonSchemaValidator),
        }
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.values()).finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the schema validator used for argument checks
    pub fn with_validator<V: SchemaValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Add a tool. A tool with the same name is replaced.
    pub fn with_tool(mut self, definition: ToolDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn register(&mut self, definition: ToolDefinition) -> &mut Self {
        self.tools.insert(definition.name().to_string(), definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool schemas as sent to the model
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.values().map(|def| def.tool.clone()).collect()
    }

    /// Resolve a model's tool call against this set.
    ///
    /// An unknown tool is a hard error. Unparseable or invalid arguments are not:
    /// they come back flagged so the model can be told and try again.
    pub fn parse_call(&self, call: &ModelToolCall) -> GenerateResult<ParsedToolCall> {
        let definition =
            self.tools
                .get(&call.tool_name)
                .ok_or_else(|| GenerateError::NoSuchTool {
                    tool_name: call.tool_name.clone(),
                    available_tools: if self.tools.is_empty() {
                        None
                    } else {
                        Some(self.names())
                    },
                })?;

        let raw = call.args.trim();
        let parsed = if raw.is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(raw)
                .map_err(|e| GenerateError::json_parse(&call.args, &e).to_string())
        };

        let (args, invalid) = match parsed {
            Ok(args) => {
                let invalid = self
                    .validator
                    .validate(&definition.tool.parameters, &args)
                    .err()
                    .map(|violations| {
                        format!(
                            "Invalid arguments for tool {}: {}",
                            call.tool_name, violations
                        )
                    });
                (args, invalid)
            }
            Err(message) => (Value::String(call.args.clone()), Some(message)),
        };

        Ok(ParsedToolCall {
            call: ToolCallPart {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                args,
                provider_metadata: None,
            },
            invalid,
        })
    }

    /// Run one parsed call.
    ///
    /// Invalid arguments and executor failures become error results.
    pub async fn invoke(&self, parsed: ParsedToolCall, context: ToolCallContext) -> ToolOutcome {
        let ParsedToolCall { call, invalid } = parsed;

        if let Some(message) = invalid {
            debug!(tool = %call.tool_name, %message, "rejecting tool call arguments");
            return ToolOutcome::Completed(error_result(&call, message));
        }

        let executor = match self.tools.get(&call.tool_name).and_then(|d| d.executor.clone()) {
            Some(executor) => executor,
            None => return ToolOutcome::Pending(call),
        };

        debug!(tool = %call.tool_name, id = %call.tool_call_id, "executing tool");
        match executor.execute(call.args.clone(), context).await {
            Ok(result) => ToolOutcome::Completed(ToolResultPart {
                tool_call_id: call.tool_call_id,
                tool_name: call.tool_name,
                result,
                is_error: false,
                provider_metadata: None,
            }),
            Err(err) => {
                warn!(tool = %call.tool_name, error = %err, "tool execution failed");
                ToolOutcome::Completed(error_result(&call, err.to_string()))
            }
        }
    }

    /// Run every call concurrently. Outcomes keep the order of `calls`.
    pub async fn invoke_all(
        &self,
        calls: Vec<ParsedToolCall>,
        messages: Arc<Vec<Message>>,
        cancellation: &CancellationToken,
    ) -> Vec<ToolOutcome> {
        let futures = calls.into_iter().map(|parsed| {
            let context = ToolCallContext {
                tool_call_id: parsed.call.tool_call_id.clone(),
                messages: Arc::clone(&messages),
                cancellation: cancellation.clone(),
            };
            self.invoke(parsed, context)
        });
        join_all(futures).await
    }
}

fn error_result(call: &ToolCallPart, message: String) -> ToolResultPart {
    ToolResultPart {
        tool_call_id: call.tool_call_id.clone(),
        tool_name: call.tool_name.clone(),
        result: Value::String(message),
        is_error: true,
        provider_metadata: None,
    }
}
