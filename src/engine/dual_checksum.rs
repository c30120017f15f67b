//! Dual checksum stage: `crc(v)~crc(strong_hash(v))` per input.

use log::debug;
use std::sync::Arc;

use crate::Job;
use crate::engine::hashing::{DigestFn, DigestPool, Digests, StrongHashGate};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineContext, PipelineStage, StageInput, StageOutput, WorkerGroup};
use crate::utils::config::{DUAL_CHECKSUM_SEPARATOR, WorkerLimits};

const STAGE_NAME: &str = "dual_checksum";

/// For each integer input `v`, emits `"{crc(v)}~{crc(strong_hash(v))}"`.
///
/// Inputs are handed to a fixed pool of `workers` threads, and both checksums of one input
/// run concurrently (the plain checksum on a digest pool of the same size). While every
/// worker is busy the stage stops reading input. `strong_hash` is serialized through the
/// stage's [`StrongHashGate`]; share one gate between stages
/// with [`DualChecksumStage::with_gate`] to serialize across them too.
/// Outputs are emitted in completion order.
pub struct DualChecksumStage {
    crc: DigestFn,
    strong_hash: DigestFn,
    gate: Arc<StrongHashGate>,
    workers: usize,
}

impl DualChecksumStage {
    pub fn new(digests: &Digests) -> Self {
        Self::with_gate(digests, Arc::new(StrongHashGate::new()))
    }

    pub fn with_gate(digests: &Digests, gate: Arc<StrongHashGate>) -> Self {
        Self {
            crc: Arc::clone(&digests.crc),
            strong_hash: Arc::clone(&digests.strong_hash),
            gate,
            workers: WorkerLimits::current(),
        }
    }

    /// Size of the worker pool and of the digest pool. Default: [`WorkerLimits::current`].
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = WorkerLimits::clamp(workers);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn gate(&self) -> &Arc<StrongHashGate> {
        &self.gate
    }
}

impl PipelineStage for DualChecksumStage {
    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn run(
        &self,
        ctx: &PipelineContext,
        input: &mut StageInput,
        output: &StageOutput,
    ) -> Result<(), PipelineError> {
        let digest_pool = Arc::new(DigestPool::new(STAGE_NAME, self.workers)?);
        let mut workers = WorkerGroup::new(STAGE_NAME, self.workers)?;
        while let Some(job) = input.recv()? {
            let value = job.expect_int(STAGE_NAME)?.to_string();
            let checksums = DualChecksum {
                crc: Arc::clone(&self.crc),
                strong_hash: Arc::clone(&self.strong_hash),
                gate: Arc::clone(&self.gate),
                digest_pool: Arc::clone(&digest_pool),
            };
            let output = output.clone();
            workers.spawn(ctx, move |ctx| {
                let checksum = checksums.compute(ctx, value)?;
                output.send(Job::Str(checksum))
            })?;
        }
        debug!("{}: input drained, {} workers", STAGE_NAME, workers.started());
        workers.wait(ctx)
    }
}

/// What one worker needs to checksum one input.
struct DualChecksum {
    crc: DigestFn,
    strong_hash: DigestFn,
    gate: Arc<StrongHashGate>,
    digest_pool: Arc<DigestPool>,
}

impl DualChecksum {
    fn compute(&self, ctx: &PipelineContext, value: String) -> Result<String, PipelineError> {
        let plain_rx = self.digest_pool.spawn_digest(&self.crc, value.clone());
        let strong = {
            let _permit = self.gate.acquire(ctx)?;
            (self.strong_hash)(&value)
        };
        let strong_crc = (self.crc)(&strong);
        let plain = ctx
            .recv(&plain_rx)?
            .ok_or_else(|| PipelineError::WorkerPanicked {
                stage: STAGE_NAME.to_string(),
            })?;
        Ok(format!("{plain}{DUAL_CHECKSUM_SEPARATOR}{strong_crc}"))
    }
}
