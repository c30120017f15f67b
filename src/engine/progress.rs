//! Progress bar utilities for displaying processing status

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Callback reporting `n` newly processed items. Shared with stage threads.
pub type ProgressFn = Box<dyn Fn(usize) + Send + Sync>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    /// Create a new progress bar configuration
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation
    )))
}

/// Update progress bar if available
/// Uses try_lock to avoid blocking if mutex is contended (non-blocking)
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    // If lock is contended, skip update (progress bar will catch up on next update)
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Create a progress callback function that updates the progress bar.
pub fn progress_callback(bar: &Option<ProgressBar>) -> Option<ProgressFn> {
    bar.as_ref().map(|bar| {
        let bar = Arc::clone(bar);
        Box::new(move |n: usize| update_progress_bar(&bar, n)) as ProgressFn
    })
}

/// Build the "Signing" bar when verbose. `total` is the number of items expected at the aggregator.
pub fn setup_progress(verbose: bool, total: usize) -> Option<ProgressBar> {
    verbose.then(|| {
        create_progress_bar(ProgressBarConfig::new(
            total,
            "Signing",
            Animation::Classic,
        ))
    })
}

/// End the bar's line so later output starts clean. A completed run pushes the bar to its
/// total; a failed one keeps its count and is relabelled "Failed".
pub fn finish_progress(bar: &Option<ProgressBar>, completed: bool) {
    if let Some(bar) = bar
        && let Ok(mut bar) = bar.lock()
    {
        if completed {
            let total = bar.total;
            let _ = bar.update_to(total);
        } else {
            bar.set_description("Failed");
            let _ = bar.refresh();
        }
        eprintln!();
    }
}
