//! Terminal stage: sort everything upstream produced and join it into one string.

use log::debug;
use rayon::prelude::*;

use crate::Job;
use crate::engine::progress::ProgressFn;
use crate::errors::PipelineError;
use crate::pipeline::{PipelineContext, PipelineStage, StageInput, StageOutput};
use crate::utils::config::DEFAULT_SEPARATOR;

const STAGE_NAME: &str = "aggregator";

/// Collects every upstream string, sorts ascending (byte-wise) and emits exactly one
/// `Job::Str` joined with the separator. Empty input emits `""`.
pub struct Aggregator {
    separator: String,
    on_received: Option<ProgressFn>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    pub fn with_separator(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            on_received: None,
        }
    }

    /// Call `on_received(1)` for every item taken off the input queue.
    pub fn with_progress(mut self, on_received: Option<ProgressFn>) -> Self {
        self.on_received = on_received;
        self
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStage for Aggregator {
    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn run(
        &self,
        _ctx: &PipelineContext,
        input: &mut StageInput,
        output: &StageOutput,
    ) -> Result<(), PipelineError> {
        let mut results = Vec::new();
        while let Some(job) = input.recv()? {
            results.push(job.expect_str(STAGE_NAME)?);
            if let Some(cb) = &self.on_received {
                cb(1);
            }
        }
        debug!("{}: combining {} results", STAGE_NAME, results.len());
        output.send(Job::Str(combine_results(results, &self.separator)))
    }
}

/// Sort `results` ascending and join them with `separator`.
pub fn combine_results(mut results: Vec<String>, separator: &str) -> String {
    results.par_sort_unstable();
    results.join(separator)
}
