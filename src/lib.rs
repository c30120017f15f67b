//! Signer: staged hash-chain pipeline with concurrent checksum fan-out

pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use errors::PipelineError;
pub use types::*;

use engine::{Digests, signature_stages, single_result};
use log::debug;

/// Result alias used by the CLI layer
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: sign `inputs` with `digests` and return the combined signature.
///
/// Runs dual checksum → sharded checksum → aggregator: each input's dual checksum is
/// sharded, and the per-input results are sorted and joined with `_`.
/// Use [`pipeline::execute_pipeline`] directly to run a custom chain.
///
/// ```ignore
/// let signature = signer::sign(&[0, 1, 1, 2], &Digests::default(), &PipelineOpts::default())?;
/// ```
pub fn sign(
    inputs: &[i64],
    digests: &Digests,
    opts: &PipelineOpts,
) -> std::result::Result<String, PipelineError> {
    debug!("sign: {} inputs, opts {:?}", inputs.len(), opts);
    let stages = signature_stages(
        digests,
        utils::config::DEFAULT_SEPARATOR,
        opts.workers,
        None,
    );
    let inputs = inputs.iter().copied().map(Job::Int).collect();
    let outputs = pipeline::execute_pipeline(stages, inputs, opts)?;
    single_result(outputs)
}
