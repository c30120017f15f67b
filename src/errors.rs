use std::time::Duration;

use thiserror::Error;

/// Failure of a single pipeline run. The first one recorded wins; see [`crate::pipeline::PipelineContext::fail`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("stage '{stage}' expected {expected} payload, got {found}")]
    MalformedInput {
        stage: String,
        expected: &'static str,
        found: String,
    },
    #[error("pipeline run exceeded its timeout of {0:?}")]
    Timeout(Duration),
    #[error("pipeline run was cancelled")]
    Cancelled,
    #[error("input '{input}' produced {received} of {expected} shard hashes")]
    MissingShard {
        input: String,
        received: usize,
        expected: usize,
    },
    #[error("input '{input}' produced shard index {index} out of range or more than once")]
    InvalidShard { input: String, index: usize },
    #[error("stage '{stage}' could not start its workers: {reason}")]
    WorkerSpawn { stage: String, reason: String },
    #[error("a worker of stage '{stage}' exited without reporting its result")]
    WorkerPanicked { stage: String },
    #[error("stage '{stage}' panicked")]
    StagePanicked { stage: String },
    #[error("stage '{stage}' returned before its input queue was closed")]
    UndrainedInput { stage: String },
    #[error("output queue of stage '{stage}' was closed by its consumer")]
    QueueClosed { stage: String },
    #[error("pipeline produced no result")]
    EmptyResult,
    #[error("pipeline produced {count} results, expected exactly one")]
    UnexpectedOutput { count: usize },
}
