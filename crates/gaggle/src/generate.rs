//! The step loop: one logical request, as many model calls as the tools need.
use tracing::{info_span, Instrument};

use crate::errors::{RunFailure, Stage};

mod request;
mod result;
pub(crate) mod run;

pub use request::{FinishCallback, GenerateRequest, StepCallback};
pub use result::{GenerateTextResult, Step, StepType};

use run::{Run, StepDecision, StepOutput};

/// Generate text, calling tools and the model again until the model stops,
/// a tool is left for the caller, or the step limit is hit.
///
/// A failed run reports the stage it failed in and keeps the steps it
/// completed.
pub async fn generate_text(request: GenerateRequest) -> Result<GenerateTextResult, RunFailure> {
    let mut run = Run::new(request).map_err(|e| RunFailure::new(Stage::Validation, e, Vec::new()))?;
    let span = info_span!("generate", run_id = %run.run_id, model = %run.model.model_id());

    async move {
        loop {
            let options = run.next_call_options().await?;
            let response = run.call_generate(&options).await?;
            let output = StepOutput::from_response(response, &run.tools)
                .map_err(|e| run.fail(Stage::Validation, e))?;

            match run.finish_step(options.messages, output).await? {
                StepDecision::Continue => continue,
                StepDecision::Done => break,
            }
        }
        Ok::<_, RunFailure>(run.finish())
    }
    .instrument(span)
    .await
}
