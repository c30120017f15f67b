//! Completion tracking and bounded execution for a stage's internal workers.
//!
//! A stage hands every worker a [`WorkerGuard`] and calls [`WorkerGroup::wait`] before it
//! returns, so its output queue is only closed after the last worker finished writing.
//! Workers run on a fixed [`WorkerPool`]; [`WorkerGroup::spawn`] blocks while every pool
//! thread is busy, so a stage stops reading input and its queue backs up upstream.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::errors::PipelineError;
use crate::pipeline::PipelineContext;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Single pool thread: run tasks from task_rx until the pool is dropped.
fn worker_loop(task_rx: Receiver<Task>) {
    while let Ok(task) = task_rx.recv() {
        // A panicking task drops its guard while unwinding; the thread keeps serving.
        let _ = panic::catch_unwind(AssertUnwindSafe(task));
    }
}

/// Fixed set of threads fed through a rendezvous queue: a submit is accepted only by an
/// idle thread. Threads are detached and exit once the pool is dropped and their current
/// task returns.
pub struct WorkerPool {
    task_tx: Sender<Task>,
    size: usize,
}

impl WorkerPool {
    pub fn new(stage: &str, size: usize) -> Result<Self, PipelineError> {
        let size = size.max(1);
        let (task_tx, task_rx) = bounded::<Task>(0);
        for i in 0..size {
            let task_rx = task_rx.clone();
            thread::Builder::new()
                .name(format!("{stage}-{i}"))
                .spawn(move || worker_loop(task_rx))
                .map_err(|e| PipelineError::WorkerSpawn {
                    stage: stage.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(Self { task_tx, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

enum WorkerExit {
    Finished(Result<(), PipelineError>),
    Abandoned,
}

/// Reference-counted completion signal for one stage's workers, plus the pool they run on.
pub struct WorkerGroup {
    stage: String,
    exit_tx: Sender<WorkerExit>,
    exit_rx: Receiver<WorkerExit>,
    started: usize,
    pool: WorkerPool,
}

/// Held by one worker. Report through [`WorkerGuard::finish`]; dropping it unreported
/// (e.g. the worker panicked) makes [`WorkerGroup::wait`] fail.
pub struct WorkerGuard {
    exit_tx: Sender<WorkerExit>,
    reported: bool,
}

impl WorkerGroup {
    /// Start a pool of `workers` threads for `stage`.
    pub fn new(stage: &str, workers: usize) -> Result<Self, PipelineError> {
        let pool = WorkerPool::new(stage, workers)?;
        let (exit_tx, exit_rx) = unbounded();
        Ok(Self {
            stage: stage.to_string(),
            exit_tx,
            exit_rx,
            started: 0,
            pool,
        })
    }

    /// Number of guards handed out so far.
    pub fn started(&self) -> usize {
        self.started
    }

    /// Threads in the group's pool.
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    pub fn guard(&mut self) -> WorkerGuard {
        self.started += 1;
        WorkerGuard {
            exit_tx: self.exit_tx.clone(),
            reported: false,
        }
    }

    /// Run `work` on the next idle pool thread under a fresh guard. Blocks until a thread
    /// takes it, or fails when the run is cancelled or times out first.
    pub fn spawn<F>(&mut self, ctx: &PipelineContext, work: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&PipelineContext) -> Result<(), PipelineError> + Send + 'static,
    {
        let guard = self.guard();
        let worker_ctx = ctx.clone();
        let task: Task = Box::new(move || {
            let result = work(&worker_ctx);
            guard.finish(result);
        });
        if ctx.send(&self.pool.task_tx, task)? {
            Ok(())
        } else {
            Err(PipelineError::WorkerPanicked {
                stage: self.stage.clone(),
            })
        }
    }

    /// Block until every guard reported or was dropped. Returns the first worker error.
    pub fn wait(self, ctx: &PipelineContext) -> Result<(), PipelineError> {
        let WorkerGroup {
            stage,
            exit_tx,
            exit_rx,
            started,
            pool,
        } = self;
        drop(exit_tx);
        drop(pool);

        let mut first_err = None;
        let mut exited = 0_usize;
        while let Some(exit) = ctx.recv(&exit_rx)? {
            exited += 1;
            let err = match exit {
                WorkerExit::Finished(Ok(())) => continue,
                WorkerExit::Finished(Err(e)) => e,
                WorkerExit::Abandoned => PipelineError::WorkerPanicked {
                    stage: stage.clone(),
                },
            };
            first_err.get_or_insert(err);
        }
        log::debug!("stage '{}': {}/{} workers exited", stage, exited, started);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl WorkerGuard {
    pub fn finish(mut self, result: Result<(), PipelineError>) {
        let _ = self.exit_tx.send(WorkerExit::Finished(result));
        self.reported = true;
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !self.reported {
            let _ = self.exit_tx.send(WorkerExit::Abandoned);
        }
    }
}
