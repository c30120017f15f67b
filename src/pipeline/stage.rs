//! The stage contract the executor runs.

use crate::errors::PipelineError;
use crate::pipeline::{PipelineContext, StageInput, StageOutput};

/// One concurrent processing step.
///
/// `run` must read `input` until it reports the queue closed, and must not return before
/// every job it will emit has been sent (wait on its [`WorkerGroup`](crate::pipeline::WorkerGroup)).
/// The executor closes the output queue once `run` returns.
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    fn run(
        &self,
        ctx: &PipelineContext,
        input: &mut StageInput,
        output: &StageOutput,
    ) -> Result<(), PipelineError>;
}

/// Stage built from a closure. Handy for glue steps and tests.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> PipelineStage for FnStage<F>
where
    F: Fn(&PipelineContext, &mut StageInput, &StageOutput) -> Result<(), PipelineError>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        ctx: &PipelineContext,
        input: &mut StageInput,
        output: &StageOutput,
    ) -> Result<(), PipelineError> {
        (self.f)(ctx, input, output)
    }
}

pub fn stage_fn<F>(name: &str, f: F) -> FnStage<F>
where
    F: Fn(&PipelineContext, &mut StageInput, &StageOutput) -> Result<(), PipelineError>
        + Send
        + Sync,
{
    FnStage {
        name: name.to_string(),
        f,
    }
}
