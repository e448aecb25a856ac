pub mod download;
pub mod errors;
pub mod generate;
pub mod middleware;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod settings;
pub mod stream;
pub mod tools;

pub use errors::{ErrorKind, GenerateError, GenerateResult, RunFailure, Stage};
pub use generate::{generate_text, GenerateRequest, GenerateTextResult, Step, StepType};
pub use stream::{stream_text, StreamPart, StreamTextResult};
