//! Progress reporting for multi-step runs (Overpass fetches, region-by-region
//! acquisition).
//!
//! Library code only talks to [`ProgressCallback`]; the CLI plugs in
//! terminal bars, tests and headless runs use [`NullProgress`] or
//! [`LogProgress`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Receives step counts and status text from a long-running operation.
pub trait ProgressCallback: Send + Sync {
    /// Announces how many steps the operation will take.
    fn set_total(&self, total: u64);

    /// Marks `delta` more steps as done.
    fn inc(&self, delta: u64);

    /// Describes the step currently running.
    fn set_message(&self, msg: String);

    /// Ends the operation with a closing message.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Writes one `info` line per finished step, e.g. `[3/49] Acquiring CA`.
///
/// For runs without a terminal, where redrawn bars would only clutter
/// the log.
#[derive(Default)]
pub struct LogProgress {
    total: AtomicU64,
    done: AtomicU64,
    current: Mutex<String>,
}

impl LogProgress {
    /// Steps completed so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    fn current(&self) -> String {
        self.current
            .lock()
            .map(|msg| msg.clone())
            .unwrap_or_default()
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn inc(&self, delta: u64) {
        let done = self.done.fetch_add(delta, Ordering::Relaxed) + delta;
        log::info!(
            "[{done}/{}] {}",
            self.total.load(Ordering::Relaxed),
            self.current()
        );
    }

    fn set_message(&self, msg: String) {
        if let Ok(mut current) = self.current.lock() {
            *current = msg;
        }
    }

    fn finish(&self, msg: String) {
        log::info!("{msg}");
    }
}
