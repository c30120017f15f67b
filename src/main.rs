//! Signer CLI: sign a list of integers through the hash-chain pipeline.

use anyhow::Result;
use clap::Parser;
use signer::engine::arg_parser::Cli;
use signer::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
