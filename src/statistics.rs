//! Logging of solver statistics with a configurable prefix and closing
//! line. When no writer has been configured, statistic logging is a
//! no-op; the solvers always report through this channel and let the
//! front end decide whether the numbers reach stdout.

use std::fmt::Display;
use std::io::stdout;
use std::io::Write;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::sync::RwLock;

/// The options for statistic logging: the prefix printed before every
/// statistic, an optional line printed after a block of statistics, and
/// the writer the statistics go to.
pub struct StatisticOptions {
    statistic_prefix: &'static str,
    after_statistics: Option<&'static str>,
    statistics_writer: Box<dyn Write + Send + Sync>,
}

static STATISTIC_OPTIONS: OnceLock<RwLock<StatisticOptions>> = OnceLock::new();

/// Configures the logging of statistics. In case no writer is
/// specified, stdout is used. Statistics are only written after this
/// has been called.
pub fn configure_statistic_logging(
    prefix: &'static str,
    after: Option<&'static str>,
    writer: Option<Box<dyn Write + Send + Sync>>,
) {
    let _ = STATISTIC_OPTIONS.get_or_init(|| {
        RwLock::new(StatisticOptions {
            statistic_prefix: prefix,
            after_statistics: after,
            statistics_writer: writer.unwrap_or_else(|| Box::new(stdout())),
        })
    });
}

/// Logs the statistic `name` with `value` in the form
/// `{PREFIX} {NAME}={VALUE}`.
pub fn log_statistic(name: impl Display, value: impl Display) {
    if let Some(lock) = STATISTIC_OPTIONS.get() {
        if let Ok(mut options) = lock.write() {
            let prefix = options.statistic_prefix;
            let _ = writeln!(options.statistics_writer, "{prefix} {name}={value}");
        }
    }
}

/// Logs the closing line of a block of statistics, if one is
/// configured.
pub fn log_statistic_postfix() {
    if let Some(lock) = STATISTIC_OPTIONS.get() {
        if let Ok(mut options) = lock.write() {
            if let Some(postfix) = options.after_statistics {
                let _ = writeln!(options.statistics_writer, "{postfix}");
            }
        }
    }
}

/// Returns whether statistics should be logged, i.e. whether the
/// options have been configured.
pub fn should_log_statistics() -> bool {
    STATISTIC_OPTIONS.get().is_some()
}

/// Counters of one branch-and-bound solve. Updated with relaxed atomics
/// from concurrent search tasks; no counter is load-bearing for the
/// search itself.
#[derive(Debug, Default)]
pub struct BranchAndBoundStatistics {
    /// Number of fully eliminated chains handed to the scheduler.
    pub scheduled_leaves: AtomicUsize,
    /// Number of subtrees cut by the critical-path bound, per search
    /// depth.
    pub prunes_per_depth: Vec<AtomicUsize>,
}

impl BranchAndBoundStatistics {
    pub fn new(max_depth: usize) -> BranchAndBoundStatistics {
        let mut prunes_per_depth = Vec::new();
        prunes_per_depth.resize_with(max_depth, AtomicUsize::default);

        BranchAndBoundStatistics {
            scheduled_leaves: AtomicUsize::new(0),
            prunes_per_depth,
        }
    }

    pub fn count_leaf(&self) {
        let _ = self.scheduled_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_prune(&self, depth: usize) {
        if let Some(counter) = self.prunes_per_depth.get(depth) {
            let _ = counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Writes the counters through the statistic logging channel.
    pub fn log(&self) {
        log_statistic(
            "scheduledLeaves",
            self.scheduled_leaves.load(Ordering::Relaxed),
        );

        for (depth, counter) in self.prunes_per_depth.iter().enumerate() {
            let prunes = counter.load(Ordering::Relaxed);
            if prunes > 0 {
                log_statistic(format!("prunesAtDepth{depth}"), prunes);
            }
        }
    }
}
