//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    /// Name of the optional settings file looked up in the working directory.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Stages ----

/// Number of shards hashed per input by the sharded checksum stage.
pub const SHARD_COUNT: usize = 6;

/// Separator placed between sorted results by the aggregator.
pub const DEFAULT_SEPARATOR: &str = "_";

/// Separator between the two halves of a dual checksum.
pub const DUAL_CHECKSUM_SEPARATOR: char = '~';

/// Inputs signed when the CLI is given none.
pub const DEFAULT_INPUTS: [i64; 7] = [0, 1, 1, 2, 3, 5, 8];

// ---- Workers ----

/// Per-stage worker thread bounds for the checksum stages.
pub struct WorkerLimits;

impl WorkerLimits {
    /// Smallest pool a caller may ask for.
    pub const MIN: usize = 1;
    /// Floor for the automatic size; one worker waits at the strong-hash gate while another hashes.
    pub const FLOOR: usize = 2;
    /// Upper bound on threads per pool.
    pub const MAX: usize = 256;

    /// Automatic pool size from `rayon::current_num_threads()`.
    pub fn current() -> usize {
        rayon::current_num_threads().clamp(Self::FLOOR, Self::MAX)
    }

    pub fn clamp(workers: usize) -> usize {
        workers.clamp(Self::MIN, Self::MAX)
    }
}

// ---- Queues ----

/// Capacity of the hand-off queues between stages.
pub struct QueueCap;

impl QueueCap {
    /// Default per-queue capacity. Producers block (observing cancellation) once it is reached.
    pub const DEFAULT: usize = 1_024;
    /// Lower bound; a zero-capacity queue would make every hand-off a rendezvous.
    pub const MIN: usize = 1;
    /// Upper bound (avoid huge allocation).
    pub const MAX: usize = 1_000_000;

    pub fn clamp(cap: usize) -> usize {
        cap.clamp(Self::MIN, Self::MAX)
    }
}
