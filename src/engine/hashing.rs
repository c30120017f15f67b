//! Digest functions injected into the stages, and the gate serializing strong-hash calls.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::pipeline::PipelineContext;

/// Pure `hash(input) -> digest` function shared across worker threads.
pub type DigestFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The two digests the checksum stages are built from.
#[derive(Clone)]
pub struct Digests {
    /// Fast checksum; called freely in parallel.
    pub crc: DigestFn,
    /// Slow cryptographic digest; at most one call in flight per [`StrongHashGate`].
    pub strong_hash: DigestFn,
}

impl Digests {
    pub fn new<C, S>(crc: C, strong_hash: S) -> Self
    where
        C: Fn(&str) -> String + Send + Sync + 'static,
        S: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            crc: Arc::new(crc),
            strong_hash: Arc::new(strong_hash),
        }
    }
}

impl Default for Digests {
    /// CRC-32 rendered as decimal, BLAKE3 rendered as hex.
    fn default() -> Self {
        Self::new(crc32_decimal, blake3_hex)
    }
}

/// CRC-32 (IEEE) of the UTF-8 bytes, as an unsigned decimal string.
pub fn crc32_decimal(input: &str) -> String {
    crc32fast::hash(input.as_bytes()).to_string()
}

/// BLAKE3 digest of the UTF-8 bytes, as 64 lowercase hex characters.
pub fn blake3_hex(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// Fixed rayon pool running one stage's digest calls. Every worker has at most a bounded
/// number of digests queued here, so the pool never grows with the input.
pub(crate) struct DigestPool {
    pool: rayon::ThreadPool,
}

impl DigestPool {
    pub(crate) fn new(stage: &str, threads: usize) -> Result<Self, PipelineError> {
        let name = stage.to_string();
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{name}-digest-{i}"))
            // A panicking digest drops its result sender; the waiting worker reports it.
            .panic_handler(|_| {})
            .build()
            .map(|pool| Self { pool })
            .map_err(|e| PipelineError::WorkerSpawn {
                stage: stage.to_string(),
                reason: e.to_string(),
            })
    }

    /// Compute `digest(input)` on the pool. The receiver yields the digest, or closes
    /// without one if the digest panicked.
    pub(crate) fn spawn_digest(&self, digest: &DigestFn, input: String) -> Receiver<String> {
        let (tx, rx) = bounded(1);
        self.spawn_with(digest, input, move |value| {
            let _ = tx.send(value);
        });
        rx
    }

    /// Compute `digest(input)` on the pool and hand the result to `deliver`.
    pub(crate) fn spawn_with<F>(&self, digest: &DigestFn, input: String, deliver: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let digest = Arc::clone(digest);
        self.pool.spawn(move || deliver(digest(&input)));
    }
}

/// Single-slot semaphore: holding a [`GatePermit`] occupies the slot.
/// Waiting for the slot observes cancellation and the run deadline.
pub struct StrongHashGate {
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
}

/// Releases the gate slot on drop.
pub struct GatePermit<'a> {
    slot_rx: &'a Receiver<()>,
}

impl StrongHashGate {
    pub fn new() -> Self {
        let (slot_tx, slot_rx) = bounded(1);
        Self { slot_tx, slot_rx }
    }

    pub fn acquire(&self, ctx: &PipelineContext) -> Result<GatePermit<'_>, PipelineError> {
        // Both ends live in `self`, so the send cannot see a disconnected queue.
        ctx.send(&self.slot_tx, ())?;
        Ok(GatePermit {
            slot_rx: &self.slot_rx,
        })
    }

    /// True while a permit is held.
    pub fn is_held(&self) -> bool {
        self.slot_tx.is_full()
    }
}

impl Default for StrongHashGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let _ = self.slot_rx.try_recv();
    }
}
