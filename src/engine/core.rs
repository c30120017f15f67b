//! Core chain: dual checksum → sharded checksum → aggregator.

use crate::Job;
use crate::engine::aggregator::Aggregator;
use crate::engine::dual_checksum::DualChecksumStage;
use crate::engine::hashing::Digests;
use crate::engine::progress::ProgressFn;
use crate::engine::sharded_checksum::ShardedChecksumStage;
use crate::errors::PipelineError;
use crate::pipeline::PipelineStage;

/// The signing chain, ready for [`execute_pipeline`](crate::pipeline::execute_pipeline).
pub fn signature_stages(
    digests: &Digests,
    separator: &str,
    workers: usize,
    on_received: Option<ProgressFn>,
) -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(DualChecksumStage::new(digests).with_workers(workers)),
        Box::new(ShardedChecksumStage::new(&digests.crc).with_workers(workers)),
        Box::new(Aggregator::with_separator(separator).with_progress(on_received)),
    ]
}

/// The one string a chain ending in an [`Aggregator`] emits.
pub fn single_result(outputs: Vec<Job>) -> Result<String, PipelineError> {
    let count = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), count) {
        (None, _) => Err(PipelineError::EmptyResult),
        (Some(job), 1) => job.expect_str("result"),
        (Some(_), count) => Err(PipelineError::UnexpectedOutput { count }),
    }
}
