//! Tool definitions, argument validation and execution.
pub mod error;
pub mod registry;
pub mod validate;

pub use error::{ToolError, ToolResult};
pub use registry::{
    FnExecutor, ParsedToolCall, ToolCallContext, ToolDefinition, ToolExecutor, ToolOutcome,
    ToolSet,
};
pub use validate::{JsonSchemaValidator, SchemaValidator};
