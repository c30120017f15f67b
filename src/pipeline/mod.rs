//! Pipeline components: run context, queues, worker tracking, executor.

pub mod context;
pub mod error_handler;
pub mod orchestrator;
pub mod stage;
pub mod workers;

pub use context::{
    CancelToken, PipelineContext, PipelineQueues, StageInput, StageOutput, create_pipeline_queues,
};
pub use error_handler::check_for_first_error;
pub use orchestrator::{
    PipelineHandles, collect_outputs, execute_pipeline, execute_pipeline_with_context,
    run_pipeline, shutdown_pipeline_handles,
};
pub use stage::{FnStage, PipelineStage, stage_fn};
pub use workers::{WorkerGroup, WorkerGuard, WorkerPool};
