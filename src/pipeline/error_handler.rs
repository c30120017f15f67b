use crate::errors::PipelineError;
use crate::pipeline::PipelineContext;

/// Check pipeline result: if any stage recorded an error, return the first one.
/// Call after joining the feeder and every stage thread.
pub fn check_for_first_error(ctx: &PipelineContext) -> Result<(), PipelineError> {
    match ctx.first_error() {
        Some(err) => Err(err),
        // Cancelled from outside (e.g. Ctrl+C) after every stage already finished cleanly.
        None if ctx.is_cancelled() => Err(PipelineError::Cancelled),
        None => Ok(()),
    }
}

/// Join-time panic of a thread the executor owns.
pub(crate) fn stage_panicked(stage: &str) -> PipelineError {
    PipelineError::StagePanicked {
        stage: stage.to_string(),
    }
}
