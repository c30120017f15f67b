//! Pipeline context: cancellation, run deadline and first-error slot shared by every stage,
//! plus the queue ends handed to each stage.

use crossbeam_channel::{Receiver, Sender, TryRecvError, at, bounded, never, select};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::Job;
use crate::errors::PipelineError;

/// Uninhabited message type: the cancel channel never carries a value, it only disconnects.
pub enum Never {}

/// Cancellation signal observable from `select!`. Cancelling drops the only sender,
/// so every receiver becomes ready at once and stays ready.
#[derive(Clone)]
pub struct CancelToken {
    trigger: Arc<Mutex<Option<Sender<Never>>>>,
    signal: Receiver<Never>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<Never>(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Idempotent. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        drop(lock(&self.trigger).take());
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub(crate) fn signal(&self) -> &Receiver<Never> {
        &self.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for one pipeline run. Cheap to clone; every clone sees the same
/// cancellation, deadline and first error.
#[derive(Clone)]
pub struct PipelineContext {
    cancel: CancelToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    first_error: Arc<Mutex<Option<PipelineError>>>,
}

impl PipelineContext {
    /// Start the run clock now. `timeout: None` means the run never times out.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_cancel_token(timeout, CancelToken::new())
    }

    /// Like [`PipelineContext::new`] but cancelled through an externally owned token.
    pub fn with_cancel_token(timeout: Option<Duration>, cancel: CancelToken) -> Self {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        Self {
            cancel,
            timeout,
            deadline,
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record `err` unless an earlier error is already recorded, then cancel the run.
    pub fn fail(&self, err: PipelineError) {
        {
            let mut slot = lock(&self.first_error);
            match slot.as_ref() {
                None => {
                    warn!("pipeline failed: {}", err);
                    *slot = Some(err);
                }
                Some(first) => debug!("ignoring '{}' after first error '{}'", err, first),
            }
        }
        self.cancel();
    }

    pub fn first_error(&self) -> Option<PipelineError> {
        lock(&self.first_error).clone()
    }

    fn deadline_timer(&self) -> Receiver<Instant> {
        match self.deadline {
            Some(deadline) => at(deadline),
            None => never(),
        }
    }

    fn timed_out(&self) -> PipelineError {
        PipelineError::Timeout(self.timeout.unwrap_or_default())
    }

    fn interrupted(&self) -> PipelineError {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => self.timed_out(),
            _ => PipelineError::Cancelled,
        }
    }

    /// Block until `rx` yields an item (`Some`) or is closed (`None`), unless the run is
    /// cancelled or its deadline passes first.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Result<Option<T>, PipelineError> {
        if self.is_cancelled() {
            return Err(self.interrupted());
        }
        let timer = self.deadline_timer();
        select! {
            recv(rx) -> msg => Ok(msg.ok()),
            recv(self.cancel.signal()) -> _ => Err(self.interrupted()),
            recv(timer) -> _ => Err(self.timed_out()),
        }
    }

    /// Block until `item` is queued on `tx`, unless the run is cancelled or times out first.
    /// Returns `Ok(false)` when every receiver of `tx` is gone.
    pub fn send<T>(&self, tx: &Sender<T>, item: T) -> Result<bool, PipelineError> {
        if self.is_cancelled() {
            return Err(self.interrupted());
        }
        let timer = self.deadline_timer();
        select! {
            send(tx, item) -> res => Ok(res.is_ok()),
            recv(self.cancel.signal()) -> _ => Err(self.interrupted()),
            recv(timer) -> _ => Err(self.timed_out()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reading end of a stage's input queue. Tracks whether the stage saw the queue close.
pub struct StageInput {
    rx: Receiver<Job>,
    ctx: PipelineContext,
    drained: bool,
}

impl StageInput {
    pub fn new(rx: Receiver<Job>, ctx: &PipelineContext) -> Self {
        Self {
            rx,
            ctx: ctx.clone(),
            drained: false,
        }
    }

    /// Next job, or `None` once the upstream closed the queue.
    pub fn recv(&mut self) -> Result<Option<Job>, PipelineError> {
        let job = self.ctx.recv(&self.rx)?;
        if job.is_none() {
            self.drained = true;
        }
        Ok(job)
    }

    /// True once [`StageInput::recv`] has observed the queue closed.
    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

/// Writing end of a stage's output queue. Clone it into workers; the queue closes once
/// the stage and every clone are dropped.
#[derive(Clone)]
pub struct StageOutput {
    tx: Sender<Job>,
    ctx: PipelineContext,
    stage: Arc<str>,
}

impl StageOutput {
    pub fn new(tx: Sender<Job>, ctx: &PipelineContext, stage: &str) -> Self {
        Self {
            tx,
            ctx: ctx.clone(),
            stage: Arc::from(stage),
        }
    }

    pub fn send(&self, job: Job) -> Result<(), PipelineError> {
        if self.ctx.send(&self.tx, job)? {
            return Ok(());
        }
        if self.ctx.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Err(PipelineError::QueueClosed {
                stage: self.stage.to_string(),
            })
        }
    }

    /// Drop this handle. The queue closes when the last handle is gone.
    pub fn close(self) {}
}

/// Queues for a run of `n` stages: `n + 1` bounded channels. The feeder writes `input_tx`
/// (queue 0), stage `i` gets `(queue i receiver, queue i+1 sender)`, the executor reads `output_rx`.
pub struct PipelineQueues {
    pub input_tx: Sender<Job>,
    pub stage_ends: Vec<(Receiver<Job>, Sender<Job>)>,
    pub output_rx: Receiver<Job>,
}

pub fn create_pipeline_queues(stage_count: usize, channel_cap: usize) -> PipelineQueues {
    let (input_tx, mut rx) = bounded::<Job>(channel_cap);
    let mut stage_ends = Vec::with_capacity(stage_count);
    for _ in 0..stage_count {
        let (tx, next_rx) = bounded::<Job>(channel_cap);
        stage_ends.push((rx, tx));
        rx = next_rx;
    }
    PipelineQueues {
        input_tx,
        stage_ends,
        output_rx: rx,
    }
}
