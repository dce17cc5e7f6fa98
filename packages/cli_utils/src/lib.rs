#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the `wwtp` subcommands.
//!
//! [`init_logger`] routes `log` through `indicatif-log-bridge` so log lines
//! print above the bars instead of through them. Worker processes call
//! [`init_worker_logger`]: stderr only, stdout stays free for the shard
//! report.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use wwtp_source::progress::{LogProgress, ProgressCallback};

pub use indicatif::MultiProgress;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// [`ProgressCallback`] drawn as an `indicatif` bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied by `set_total()`; spinners only learn their length late.
    counted_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Bar for a known number of steps, such as regions of an acquisition
    /// run. Falls back to [`LogProgress`] when stderr is not a terminal.
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        if !std::io::stderr().is_terminal() {
            let progress = LogProgress::default();
            progress.set_total(total);
            progress.set_message(message.to_string());
            return Arc::new(progress);
        }

        let counted_style = region_style();
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(counted_style.clone());
        bar.set_message(message.to_string());

        Arc::new(Self { bar, counted_style })
    }

    /// Spinner for work whose size is set later via `set_total()`, such as
    /// a batch of Overpass queries.
    #[must_use]
    pub fn batch_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        if !std::io::stderr().is_terminal() {
            return Arc::new(LogProgress::default());
        }

        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let counted_style = ProgressStyle::with_template(
            "{msg:<24} {wide_bar:.cyan/blue} {pos}/{len} states [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        Arc::new(Self { bar, counted_style })
    }
}

fn region_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:<24} {wide_bar:.green/dim} {pos}/{len} regions [{elapsed}]",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.counted_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Logger filter: `RUST_LOG` when set, [`DEFAULT_FILTER`] otherwise.
fn log_filter() -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|filters| !filters.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs the global logger behind `indicatif-log-bridge` and returns the
/// [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&log_filter())
        .build();
    let level = logger.filter();

    // Already set when several tests share a process.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();
    log::set_max_level(level);

    multi
}

/// Installs a plain stderr logger for `acquire-shard` worker processes.
pub fn init_worker_logger() {
    pretty_env_logger::formatted_builder()
        .parse_filters(&log_filter())
        .try_init()
        .ok();
}
