//! Sharded checksum stage: K indexed sub-checksums per input, joined in shard order.

use crossbeam_channel::{Receiver, unbounded};
use log::debug;
use std::sync::Arc;

use crate::engine::hashing::{DigestFn, DigestPool};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineContext, PipelineStage, StageInput, StageOutput, WorkerGroup};
use crate::utils::config::{SHARD_COUNT, WorkerLimits};
use crate::{Job, ShardHash};

const STAGE_NAME: &str = "sharded_checksum";

/// For each string input `v`, computes `crc("{i}{v}")` for every shard `i` in `0..K`
/// concurrently and emits the K checksums concatenated in shard order.
///
/// Each input's collector runs on a fixed pool of `workers` threads and its shards on a
/// digest pool of the same size. Outputs interleave in completion order.
pub struct ShardedChecksumStage<const K: usize = SHARD_COUNT> {
    crc: DigestFn,
    workers: usize,
}

impl ShardedChecksumStage {
    pub fn new(crc: &DigestFn) -> Self {
        Self::with_shard_count(crc)
    }
}

impl<const K: usize> ShardedChecksumStage<K> {
    /// Build with a non-default shard count: `ShardedChecksumStage::<3>::with_shard_count(&crc)`.
    pub fn with_shard_count(crc: &DigestFn) -> Self {
        Self {
            crc: Arc::clone(crc),
            workers: WorkerLimits::current(),
        }
    }

    /// Size of the collector pool and of the digest pool. Default: [`WorkerLimits::current`].
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = WorkerLimits::clamp(workers);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub const fn shard_count(&self) -> usize {
        K
    }
}

impl<const K: usize> PipelineStage for ShardedChecksumStage<K> {
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
            let value = job.expect_str(STAGE_NAME)?;
            let crc = Arc::clone(&self.crc);
            let digest_pool = Arc::clone(&digest_pool);
            let output = output.clone();
            workers.spawn(ctx, move |ctx| {
                let shards_rx = spawn_shards(&digest_pool, &crc, &value, K);
                let joined = collect_shards(ctx, &value, K, &shards_rx)?;
                output.send(Job::Str(joined))
            })?;
        }
        debug!("{}: input drained, {} collectors", STAGE_NAME, workers.started());
        workers.wait(ctx)
    }
}

/// Queue every shard on the digest pool. The receiver closes once every shard task has
/// delivered or panicked.
fn spawn_shards(
    digest_pool: &DigestPool,
    crc: &DigestFn,
    value: &str,
    shard_count: usize,
) -> Receiver<ShardHash> {
    let (tx, rx) = unbounded();
    for index in 0..shard_count {
        let tx = tx.clone();
        digest_pool.spawn_with(crc, format!("{index}{value}"), move |value| {
            let _ = tx.send(ShardHash { index, value });
        });
    }
    rx
}

/// Gather every shard of `value` from `shards_rx`, then reassemble them in index order.
fn collect_shards(
    ctx: &PipelineContext,
    value: &str,
    shard_count: usize,
    shards_rx: &Receiver<ShardHash>,
) -> Result<String, PipelineError> {
    let mut shards = Vec::with_capacity(shard_count);
    while let Some(shard) = ctx.recv(shards_rx)? {
        shards.push(shard);
    }
    reassemble_shards(value, shard_count, shards)
}

/// Place each shard at its index and concatenate slots `0..shard_count`.
///
/// Arrival order does not matter. An index out of range or seen twice is
/// [`PipelineError::InvalidShard`]; fewer than `shard_count` shards is [`PipelineError::MissingShard`].
pub fn reassemble_shards<I>(
    input: &str,
    shard_count: usize,
    shards: I,
) -> Result<String, PipelineError>
where
    I: IntoIterator<Item = ShardHash>,
{
    let mut slots: Vec<Option<String>> = vec![None; shard_count];
    let mut received = 0_usize;
    for ShardHash { index, value } in shards {
        received += 1;
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(value),
            // Out-of-range or duplicate index: the shard set cannot be trusted.
            _ => {
                return Err(PipelineError::InvalidShard {
                    input: input.to_string(),
                    index,
                });
            }
        }
    }
    if received != shard_count {
        return Err(PipelineError::MissingShard {
            input: input.to_string(),
            received,
            expected: shard_count,
        });
    }
    Ok(slots.into_iter().flatten().collect())
}
