//! Engine module: digests, the concrete stages and the CLI around them

pub mod aggregator;
pub mod arg_parser;
pub mod core;
pub mod dual_checksum;
pub mod handlers;
pub mod hashing;
pub mod progress;
pub mod sharded_checksum;

// Re-export commonly used items
pub use aggregator::{Aggregator, combine_results};
pub use arg_parser::Cli;
pub use core::{signature_stages, single_result};
pub use dual_checksum::DualChecksumStage;
pub use handlers::handle_run;
pub use hashing::{DigestFn, Digests, GatePermit, StrongHashGate, blake3_hex, crc32_decimal};
pub use sharded_checksum::{ShardedChecksumStage, reassemble_shards};
