//! CLI command handler: build opts from file + flags, run the signing chain, print the result.

use anyhow::{Context, Result};
use log::{debug, info};
use std::time::{Duration, Instant};

use crate::engine::arg_parser::Cli;
use crate::engine::core::{signature_stages, single_result};
use crate::engine::hashing::Digests;
use crate::engine::progress::{ProgressBar, finish_progress, progress_callback, setup_progress};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineContext, execute_pipeline_with_context};
use crate::utils::config::{DEFAULT_INPUTS, QueueCap};
use crate::utils::signer_toml::{apply_file_to_opts, load_signer_toml, load_signer_toml_from};
use crate::utils::setup_logging;
use crate::{Job, Opts, PipelineOpts};

/// Layer defaults, then the settings file, then CLI flags.
fn setup_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    let file = match &cli.config {
        Some(path) => Some(load_signer_toml_from(path)?),
        None => load_signer_toml(&std::env::current_dir().context("read current directory")?)?,
    };
    if let Some(file) = &file {
        apply_file_to_opts(file, &mut opts);
    }

    if let Some(secs) = cli.timeout {
        opts.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(cap) = cli.channel_cap {
        opts.channel_cap = QueueCap::clamp(cap);
    }
    if let Some(workers) = cli.workers {
        opts.workers = Some(workers);
    }
    if let Some(sep) = &cli.separator {
        opts.separator = sep.clone();
    }
    opts.verbose |= cli.verbose;
    opts.inputs = if cli.inputs.is_empty() {
        DEFAULT_INPUTS.to_vec()
    } else {
        cli.inputs.clone()
    };

    setup_logging(opts.verbose);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    Ok(opts)
}

/// Sign the inputs and print the signature on stdout. Ctrl+C cancels the run.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli)?;
    let ctx = PipelineContext::new(opts.timeout);
    let cancel = ctx.cancel_token();
    ctrlc::set_handler(move || cancel.cancel()).context("set Ctrl+C handler")?;

    let bar = setup_progress(opts.verbose, opts.inputs.len());
    let start = Instant::now();
    let signature = sign_with_progress(&opts, &Digests::default(), &ctx, &bar)?;
    info!("Signed {} inputs in {:?}", opts.inputs.len(), start.elapsed());

    println!("{signature}");
    Ok(())
}

/// Run the signing chain, reporting each aggregated item on `bar`. The bar is finished
/// before any error is returned.
fn sign_with_progress(
    opts: &Opts,
    digests: &Digests,
    ctx: &PipelineContext,
    bar: &Option<ProgressBar>,
) -> std::result::Result<String, PipelineError> {
    let pipeline_opts = PipelineOpts::from(opts);
    let stages = signature_stages(
        digests,
        &opts.separator,
        pipeline_opts.workers,
        progress_callback(bar),
    );
    let inputs: Vec<Job> = opts.inputs.iter().copied().map(Job::Int).collect();

    let outputs = execute_pipeline_with_context(stages, inputs, &pipeline_opts, ctx);
    finish_progress(bar, outputs.is_ok());
    single_result(outputs?)
}
