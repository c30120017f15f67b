//! Public and internal types for the signer API and pipeline.

use std::fmt;
use std::time::Duration;

use crate::errors::PipelineError;
use crate::utils::config::{DEFAULT_SEPARATOR, QueueCap, WorkerLimits};

/// One unit of work travelling through a pipeline queue.
///
/// The executor only routes jobs; each stage checks the variant it needs with
/// [`Job::expect_int`] / [`Job::expect_str`] and fails the run otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Int(i64),
    Str(String),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Int(_) => "int",
            Job::Str(_) => "string",
        }
    }

    /// Integer payload, or [`PipelineError::MalformedInput`] naming `stage`.
    pub fn expect_int(self, stage: &str) -> Result<i64, PipelineError> {
        match self {
            Job::Int(v) => Ok(v),
            other => Err(other.malformed(stage, "int")),
        }
    }

    /// String payload, or [`PipelineError::MalformedInput`] naming `stage`.
    pub fn expect_str(self, stage: &str) -> Result<String, PipelineError> {
        match self {
            Job::Str(s) => Ok(s),
            other => Err(other.malformed(stage, "string")),
        }
    }

    fn malformed(&self, stage: &str, expected: &'static str) -> PipelineError {
        PipelineError::MalformedInput {
            stage: stage.to_string(),
            expected,
            found: format!("{} ({})", self.kind(), self),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Int(v) => write!(f, "{v}"),
            Job::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Job {
    fn from(v: i64) -> Self {
        Job::Int(v)
    }
}

impl From<String> for Job {
    fn from(s: String) -> Self {
        Job::Str(s)
    }
}

impl From<&str> for Job {
    fn from(s: &str) -> Self {
        Job::Str(s.to_string())
    }
}

/// One shard's checksum, tagged with its position so the collector can restore order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardHash {
    pub index: usize,
    pub value: String,
}

/// Lib-only options for [`execute_pipeline`](crate::pipeline::execute_pipeline) and [`sign`](crate::sign).
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Abort the run with [`PipelineError::Timeout`] when it takes longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Capacity of every hand-off queue between stages.
    pub channel_cap: usize,
    /// Worker threads per checksum stage (and per stage digest pool) used by [`sign`](crate::sign).
    pub workers: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            timeout: None,
            channel_cap: QueueCap::DEFAULT,
            workers: WorkerLimits::current(),
        }
    }
}

impl From<&Opts> for PipelineOpts {
    fn from(o: &Opts) -> Self {
        PipelineOpts {
            timeout: o.timeout,
            channel_cap: o.channel_cap,
            workers: o
                .workers
                .map(WorkerLimits::clamp)
                .unwrap_or_else(WorkerLimits::current),
        }
    }
}

/// Full options (CLI). Use [`PipelineOpts`] for lib.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Values fed into the first stage.
    pub inputs: Vec<i64>,
    /// Per-run timeout. `None` disables it.
    pub timeout: Option<Duration>,
    /// Capacity of every hand-off queue.
    pub channel_cap: usize,
    /// Separator used by the aggregator when joining sorted results.
    pub separator: String,
    /// Worker threads per checksum stage. `None` sizes from the available threads.
    pub workers: Option<usize>,
    /// Debug logging and progress bar.
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            timeout: None,
            channel_cap: QueueCap::DEFAULT,
            separator: DEFAULT_SEPARATOR.to_string(),
            workers: None,
            verbose: false,
        }
    }
}
