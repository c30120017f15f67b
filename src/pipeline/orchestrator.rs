use log::debug;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crate::errors::PipelineError;
use crate::pipeline::{
    self, PipelineContext, PipelineStage, StageInput, StageOutput, check_for_first_error,
    create_pipeline_queues,
};
use crate::utils::config::QueueCap;
use crate::{Job, PipelineOpts};

/// Handles returned by [`run_pipeline`]: read `output` until closed, then join the threads.
pub struct PipelineHandles {
    pub output: StageInput,
    pub feeder_handle: JoinHandle<usize>,
    pub stage_handles: Vec<(String, JoinHandle<()>)>,
}

/// Run `stages` over `inputs` and return everything the last stage emitted.
///
/// Either every stage drains and closes cleanly and the full output is returned, or the
/// first error recorded by any stage is returned. Partial output is never returned.
pub fn execute_pipeline(
    stages: Vec<Box<dyn PipelineStage>>,
    inputs: Vec<Job>,
    opts: &PipelineOpts,
) -> Result<Vec<Job>, PipelineError> {
    let ctx = PipelineContext::new(opts.timeout);
    execute_pipeline_with_context(stages, inputs, opts, &ctx)
}

/// [`execute_pipeline`] with a caller-owned context (cancel from another thread, share a deadline).
/// `opts.timeout` is ignored here; the context's own deadline applies.
pub fn execute_pipeline_with_context(
    stages: Vec<Box<dyn PipelineStage>>,
    inputs: Vec<Job>,
    opts: &PipelineOpts,
    ctx: &PipelineContext,
) -> Result<Vec<Job>, PipelineError> {
    let handles = run_pipeline(stages, inputs, opts, ctx);
    collect_outputs(handles, ctx)
}

/// Start the feeder and one thread per stage, wired through `len(stages) + 1` queues.
pub fn run_pipeline(
    stages: Vec<Box<dyn PipelineStage>>,
    inputs: Vec<Job>,
    opts: &PipelineOpts,
    ctx: &PipelineContext,
) -> PipelineHandles {
    let queues = create_pipeline_queues(stages.len(), QueueCap::clamp(opts.channel_cap));
    debug!(
        "pipeline: {} stages, {} inputs, queue cap {}",
        stages.len(),
        inputs.len(),
        QueueCap::clamp(opts.channel_cap)
    );

    let feeder_handle = spawn_feeder(queues.input_tx, inputs, ctx);

    let stage_handles = stages
        .into_iter()
        .zip(queues.stage_ends)
        .map(|(stage, (rx, tx))| {
            let name = stage.name().to_string();
            let input = StageInput::new(rx, ctx);
            let output = StageOutput::new(tx, ctx, &name);
            let ctx = ctx.clone();
            let handle = thread::spawn(move || run_stage(stage, ctx, input, output));
            (name, handle)
        })
        .collect();

    PipelineHandles {
        output: StageInput::new(queues.output_rx, ctx),
        feeder_handle,
        stage_handles,
    }
}

/// Push `inputs` into queue 0, then close it. Returns how many were queued.
fn spawn_feeder(
    input_tx: crossbeam_channel::Sender<Job>,
    inputs: Vec<Job>,
    ctx: &PipelineContext,
) -> JoinHandle<usize> {
    let ctx = ctx.clone();
    thread::spawn(move || {
        let mut count = 0_usize;
        for job in inputs {
            match ctx.send(&input_tx, job) {
                Ok(true) => count += 1,
                // First stage dropped its input early; it reports why.
                Ok(false) => break,
                Err(e) => {
                    ctx.fail(e);
                    break;
                }
            }
        }
        drop(input_tx);
        debug!("feeder: queued {} inputs", count);
        count
    })
}

/// Run one stage to completion, record its failure, then close its output queue.
fn run_stage(
    stage: Box<dyn PipelineStage>,
    ctx: PipelineContext,
    mut input: StageInput,
    output: StageOutput,
) {
    let name = stage.name().to_string();
    debug!("stage '{}': started", name);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.run(&ctx, &mut input, &output)));
    let result = match outcome {
        Ok(Ok(())) if !input.is_drained() => Err(PipelineError::UndrainedInput {
            stage: name.clone(),
        }),
        Ok(result) => result,
        Err(_) => Err(pipeline::error_handler::stage_panicked(&name)),
    };
    match result {
        Ok(()) => debug!("stage '{}': drained, closing output", name),
        Err(e) => ctx.fail(e),
    }
    output.close();
    drop(input);
}

/// Drain the final queue, join every thread, then report the first error or the outputs.
pub fn collect_outputs(
    handles: PipelineHandles,
    ctx: &PipelineContext,
) -> Result<Vec<Job>, PipelineError> {
    let PipelineHandles {
        mut output,
        feeder_handle,
        stage_handles,
    } = handles;

    let mut outputs = Vec::new();
    loop {
        match output.recv() {
            Ok(Some(job)) => outputs.push(job),
            Ok(None) => break,
            Err(e) => {
                ctx.fail(e);
                break;
            }
        }
    }
    drop(output);
    debug!("main: final queue closed, {} outputs", outputs.len());

    shutdown_pipeline_handles(feeder_handle, stage_handles, ctx);
    check_for_first_error(ctx)?;
    Ok(outputs)
}

/// Join the feeder and stage threads. A panic that escaped a thread is recorded as the run's error.
pub fn shutdown_pipeline_handles(
    feeder_handle: JoinHandle<usize>,
    stage_handles: Vec<(String, JoinHandle<()>)>,
    ctx: &PipelineContext,
) {
    if feeder_handle.join().is_err() {
        ctx.fail(pipeline::error_handler::stage_panicked("feeder"));
    }
    for (name, handle) in stage_handles {
        if handle.join().is_err() {
            ctx.fail(pipeline::error_handler::stage_panicked(&name));
        }
    }
}
