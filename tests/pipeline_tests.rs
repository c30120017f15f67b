use signer::engine::{
    Aggregator, Digests, DualChecksumStage, ShardedChecksumStage, StrongHashGate, blake3_hex,
    crc32_decimal, signature_stages, single_result,
};
use signer::pipeline::{
    PipelineContext, PipelineStage, WorkerGroup, create_pipeline_queues, execute_pipeline,
    execute_pipeline_with_context, stage_fn,
};
use signer::{Job, PipelineError, PipelineOpts, sign};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

const WORKERS: usize = 4;

fn stub_digests() -> Digests {
    Digests::new(|x: &str| x.to_string(), |x: &str| format!("H({x})"))
}

fn ints(values: &[i64]) -> Vec<Job> {
    values.iter().copied().map(Job::Int).collect()
}

/// Signature computed sequentially, for comparison with the concurrent chain.
fn expected_signature(values: &[i64], crc: fn(&str) -> String, strong: fn(&str) -> String) -> String {
    let mut per_input: Vec<String> = values
        .iter()
        .map(|v| {
            let v = v.to_string();
            let dual = format!("{}~{}", crc(&v), crc(&strong(&v)));
            (0..6).map(|i| crc(&format!("{i}{dual}"))).collect()
        })
        .collect();
    per_input.sort();
    per_input.join("_")
}

fn identity(x: &str) -> String {
    x.to_string()
}

fn bracket(x: &str) -> String {
    format!("H({x})")
}

// --- full chain ---

#[test]
fn test_full_chain_stub_digests() {
    let values = [0, 1, 1, 2, 3, 5, 8];
    let stages = signature_stages(&stub_digests(), "_", WORKERS, None);
    let out = execute_pipeline(stages, ints(&values), &PipelineOpts::default()).unwrap();
    assert_eq!(
        single_result(out).unwrap(),
        expected_signature(&values, identity, bracket)
    );
}

#[test]
fn test_sign_default_digests_matches_sequential() {
    let values = [0, 1, 1, 2, 3, 5, 8];
    let got = sign(&values, &Digests::default(), &PipelineOpts::default()).unwrap();
    assert_eq!(got, expected_signature(&values, crc32_decimal, blake3_hex));
}

#[test]
fn test_sign_is_deterministic() {
    let values: Vec<i64> = (0..25).collect();
    let opts = PipelineOpts {
        timeout: Some(Duration::from_secs(30)),
        channel_cap: 2,
        workers: 2,
    };
    let a = sign(&values, &Digests::default(), &opts).unwrap();
    let b = sign(&values, &Digests::default(), &opts).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_sign_empty_input() {
    let got = sign(&[], &Digests::default(), &PipelineOpts::default()).unwrap();
    assert_eq!(got, "");
}

#[test]
fn test_default_digests_shape() {
    assert_eq!(crc32_decimal(""), "0");
    assert_eq!(crc32_decimal("123456789"), "3421780262");
    assert_eq!(blake3_hex("abc").len(), 64);
}

// --- executor ---

#[test]
fn test_zero_stages_returns_inputs() {
    let out = execute_pipeline(vec![], ints(&[3, 1, 2]), &PipelineOpts::default()).unwrap();
    assert_eq!(out, ints(&[3, 1, 2]));
}

#[test]
fn test_small_queue_cap_does_not_deadlock() {
    let opts = PipelineOpts {
        timeout: Some(Duration::from_secs(30)),
        channel_cap: 1,
        ..PipelineOpts::default()
    };
    let values: Vec<i64> = (0..200).collect();
    let stages = signature_stages(&stub_digests(), "_", WORKERS, None);
    let out = execute_pipeline(stages, ints(&values), &opts).unwrap();
    assert_eq!(
        single_result(out).unwrap(),
        expected_signature(&values, identity, bracket)
    );
}

#[test]
fn test_fn_stages_run_in_order() {
    let double = stage_fn("double", |_, input, output| {
        while let Some(job) = input.recv()? {
            output.send(Job::Int(job.expect_int("double")? * 2))?;
        }
        Ok(())
    });
    let to_str = stage_fn("to_str", |_, input, output| {
        while let Some(job) = input.recv()? {
            output.send(Job::Str(job.to_string()))?;
        }
        Ok(())
    });
    let stages: Vec<Box<dyn PipelineStage>> = vec![
        Box::new(double),
        Box::new(to_str),
        Box::new(Aggregator::new()),
    ];
    let out = execute_pipeline(stages, ints(&[4, 1, 3]), &PipelineOpts::default()).unwrap();
    assert_eq!(single_result(out).unwrap(), "2_6_8");
}

#[test]
fn test_malformed_input_fails_whole_run() {
    let stages = signature_stages(&stub_digests(), "_", WORKERS, None);
    let err = execute_pipeline(
        stages,
        vec![Job::Int(1), Job::from("two"), Job::Int(3)],
        &PipelineOpts::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MalformedInput { ref stage, expected: "int", .. } if stage == "dual_checksum"
    ));
}

#[test]
fn test_stage_returning_early_is_undrained() {
    let lazy = stage_fn("lazy", |_, _, _| Ok(()));
    let err = execute_pipeline(vec![Box::new(lazy)], ints(&[1, 2]), &PipelineOpts::default())
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::UndrainedInput {
            stage: "lazy".to_string()
        }
    );
}

#[test]
fn test_stage_panic_is_reported() {
    let boom = stage_fn("boom", |_, _, _| panic!("stage exploded"));
    let stages: Vec<Box<dyn PipelineStage>> = vec![Box::new(boom), Box::new(Aggregator::new())];
    let err = execute_pipeline(stages, ints(&[1]), &PipelineOpts::default()).unwrap_err();
    assert_eq!(
        err,
        PipelineError::StagePanicked {
            stage: "boom".to_string()
        }
    );
}

#[test]
fn test_worker_panic_is_reported() {
    let digests = Digests::new(
        |x: &str| {
            if x == "13" {
                panic!("crc exploded");
            }
            x.to_string()
        },
        |x: &str| format!("H({x})"),
    );
    let stages: Vec<Box<dyn PipelineStage>> = vec![
        Box::new(DualChecksumStage::new(&digests)),
        Box::new(Aggregator::new()),
    ];
    let err = execute_pipeline(stages, ints(&[12, 13, 14]), &PipelineOpts::default())
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::WorkerPanicked {
            stage: "dual_checksum".to_string()
        }
    );
}

#[test]
fn test_lost_shard_is_missing_shard() {
    let digests = Digests::new(
        |x: &str| {
            if x.starts_with('3') {
                panic!("shard exploded");
            }
            x.to_string()
        },
        |x: &str| x.to_string(),
    );
    let stage = ShardedChecksumStage::new(&digests.crc);
    let err = execute_pipeline(
        vec![Box::new(stage)],
        vec![Job::from("v")],
        &PipelineOpts::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        PipelineError::MissingShard {
            input: "v".to_string(),
            received: 5,
            expected: 6
        }
    );
}

#[test]
fn test_hung_digest_times_out() {
    let digests = Digests::new(
        |x: &str| {
            thread::sleep(Duration::from_secs(3));
            x.to_string()
        },
        |x: &str| x.to_string(),
    );
    let opts = PipelineOpts {
        timeout: Some(Duration::from_millis(100)),
        ..PipelineOpts::default()
    };
    let start = Instant::now();
    let stages = signature_stages(&digests, "_", WORKERS, None);
    let err = execute_pipeline(stages, ints(&[1, 2]), &opts).unwrap_err();
    assert_eq!(err, PipelineError::Timeout(Duration::from_millis(100)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_cancel_from_another_thread() {
    let digests = Digests::new(
        |x: &str| {
            thread::sleep(Duration::from_secs(3));
            x.to_string()
        },
        |x: &str| x.to_string(),
    );
    let ctx = PipelineContext::new(None);
    let token = ctx.cancel_token();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });
    let start = Instant::now();
    let err = execute_pipeline_with_context(
        signature_stages(&digests, "_", WORKERS, None),
        ints(&[1, 2, 3]),
        &PipelineOpts::default(),
        &ctx,
    )
    .unwrap_err();
    assert_eq!(err, PipelineError::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_first_error_wins() {
    let ctx = PipelineContext::new(None);
    ctx.fail(PipelineError::EmptyResult);
    ctx.fail(PipelineError::Cancelled);
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.first_error(), Some(PipelineError::EmptyResult));
}

// --- queues ---

#[test]
fn test_create_pipeline_queues_wiring() {
    let queues = create_pipeline_queues(2, 4);
    assert_eq!(queues.stage_ends.len(), 2);

    queues.input_tx.send(Job::Int(1)).unwrap();
    assert_eq!(queues.stage_ends[0].0.recv().unwrap(), Job::Int(1));

    queues.stage_ends[0].1.send(Job::Int(2)).unwrap();
    assert_eq!(queues.stage_ends[1].0.recv().unwrap(), Job::Int(2));

    queues.stage_ends[1].1.send(Job::Int(3)).unwrap();
    assert_eq!(queues.output_rx.recv().unwrap(), Job::Int(3));
}

// --- WorkerGroup ---

#[test]
fn test_worker_group_all_finished() {
    let ctx = PipelineContext::new(Some(Duration::from_secs(5)));
    let mut group = WorkerGroup::new("test", 2).unwrap();
    for _ in 0..4 {
        group.spawn(&ctx, |_| Ok(())).unwrap();
    }
    assert_eq!(group.started(), 4);
    assert_eq!(group.wait(&ctx), Ok(()));
}

#[test]
fn test_worker_group_dropped_guard() {
    let ctx = PipelineContext::new(Some(Duration::from_secs(5)));
    let mut group = WorkerGroup::new("test", 2).unwrap();
    let done = group.guard();
    let lost = group.guard();
    done.finish(Ok(()));
    drop(lost);
    assert_eq!(
        group.wait(&ctx),
        Err(PipelineError::WorkerPanicked {
            stage: "test".to_string()
        })
    );
}

#[test]
fn test_worker_group_reports_worker_error() {
    let ctx = PipelineContext::new(Some(Duration::from_secs(5)));
    let mut group = WorkerGroup::new("test", 2).unwrap();
    group.spawn(&ctx, |_| Ok(())).unwrap();
    group.spawn(&ctx, |_| Err(PipelineError::EmptyResult)).unwrap();
    assert_eq!(group.wait(&ctx), Err(PipelineError::EmptyResult));
}

#[test]
fn test_worker_group_wait_observes_timeout() {
    let ctx = PipelineContext::new(Some(Duration::from_millis(50)));
    let mut group = WorkerGroup::new("test", 2).unwrap();
    let _stuck = group.guard();
    assert_eq!(
        group.wait(&ctx),
        Err(PipelineError::Timeout(Duration::from_millis(50)))
    );
}

#[test]
fn test_worker_group_spawn_blocks_while_pool_busy() {
    let ctx = PipelineContext::new(Some(Duration::from_millis(150)));
    let mut group = WorkerGroup::new("test", 2).unwrap();
    assert_eq!(group.workers(), 2);
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
    for _ in 0..2 {
        let release_rx = release_rx.clone();
        group
            .spawn(&ctx, move |_| {
                let _ = release_rx.recv();
                Ok(())
            })
            .unwrap();
    }
    let start = Instant::now();
    let err = group.spawn(&ctx, |_| Ok(())).unwrap_err();
    assert_eq!(err, PipelineError::Timeout(Duration::from_millis(150)));
    assert!(start.elapsed() >= Duration::from_millis(100));
    drop(release_tx);
}

#[test]
fn test_worker_group_pool_survives_panicking_worker() {
    let ctx = PipelineContext::new(Some(Duration::from_secs(5)));
    let mut group = WorkerGroup::new("test", 1).unwrap();
    group
        .spawn(&ctx, |_| -> Result<(), PipelineError> { panic!("worker exploded") })
        .unwrap();
    // Only one pool thread: this is accepted only if it survived the panic.
    group.spawn(&ctx, |_| Ok(())).unwrap();
    assert_eq!(
        group.wait(&ctx),
        Err(PipelineError::WorkerPanicked {
            stage: "test".to_string()
        })
    );
}

// --- bounded threads ---

/// Records the distinct threads a digest ran on.
#[derive(Clone, Default)]
struct ThreadLog(Arc<Mutex<HashSet<ThreadId>>>);

impl ThreadLog {
    fn record(&self) {
        self.0.lock().unwrap().insert(thread::current().id());
    }

    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[test]
fn test_sign_many_inputs_uses_bounded_threads() {
    let values: Vec<i64> = (0..5_000).collect();
    let crc_threads = ThreadLog::default();
    let strong_threads = ThreadLog::default();
    let digests = {
        let (c, h) = (crc_threads.clone(), strong_threads.clone());
        Digests::new(
            move |x: &str| {
                c.record();
                identity(x)
            },
            move |x: &str| {
                h.record();
                thread::sleep(Duration::from_micros(50));
                bracket(x)
            },
        )
    };
    let opts = PipelineOpts {
        workers: WORKERS,
        ..PipelineOpts::default()
    };

    let got = sign(&values, &digests, &opts).unwrap();

    assert_eq!(got, expected_signature(&values, identity, bracket));
    // Strong hash runs on dual checksum workers only.
    assert!(strong_threads.count() <= WORKERS, "{} threads", strong_threads.count());
    // crc runs on dual checksum workers plus the two stages' digest pools.
    assert!(crc_threads.count() <= 3 * WORKERS, "{} threads", crc_threads.count());
}

// --- StrongHashGate ---

#[test]
fn test_gate_single_slot() {
    let ctx = PipelineContext::new(Some(Duration::from_secs(5)));
    let gate = Arc::new(StrongHashGate::new());
    let permit = gate.acquire(&ctx).unwrap();
    assert!(gate.is_held());

    let waiter = {
        let gate = Arc::clone(&gate);
        let ctx = ctx.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let _permit = gate.acquire(&ctx).unwrap();
            start.elapsed()
        })
    };
    thread::sleep(Duration::from_millis(100));
    drop(permit);
    let waited = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(50), "waited {waited:?}");
    assert!(!gate.is_held());
}

#[test]
fn test_gate_acquire_observes_cancel() {
    let ctx = PipelineContext::new(None);
    let gate = StrongHashGate::new();
    let _held = gate.acquire(&ctx).unwrap();
    ctx.cancel();
    assert!(matches!(gate.acquire(&ctx), Err(PipelineError::Cancelled)));
}

#[test]
fn test_shared_gate_across_stages() {
    let digests = stub_digests();
    let gate = Arc::new(StrongHashGate::new());
    let a = DualChecksumStage::with_gate(&digests, Arc::clone(&gate));
    let b = DualChecksumStage::with_gate(&digests, Arc::clone(&gate));
    assert!(Arc::ptr_eq(a.gate(), b.gate()));
}

// --- single_result ---

#[test]
fn test_single_result_shapes() {
    assert_eq!(single_result(vec![]), Err(PipelineError::EmptyResult));
    assert_eq!(
        single_result(vec![Job::from("a"), Job::from("b")]),
        Err(PipelineError::UnexpectedOutput { count: 2 })
    );
    assert_eq!(single_result(vec![Job::from("ok")]), Ok("ok".to_string()));
}
