//! # Global session configuration.
//!
//! Provides [`Config`] centralized settings for the broadcaster, scheduler and
//! session controller.
//!
//! ## Sentinel values
//! - `heartbeat_interval = 0s` → heartbeat timer disabled
//! - `timeline_workers = 0` → clamped to 1

use std::time::Duration;

/// Wait bound applied to every broadcast call.
pub const DEFAULT_FANOUT_CEILING: Duration = Duration::from_secs(300);

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of timeline workers.
pub const DEFAULT_TIMELINE_WORKERS: usize = 2;

/// Global configuration for a session.
///
/// ## Field semantics
/// - `run_id`: identifier passed to the registrar on every notification
/// - `fanout_ceiling`: max wait of a single broadcast call
/// - `heartbeat_interval`: fixed-rate heartbeat period (`0s` = disabled)
/// - `timeline_workers`: how many timeline entries may run at once (min 1)
/// - `check_results`: run the check broadcast when the session stops
/// - `shutdown_grace`: wait for in-flight broadcast tasks on [`close`](crate::Session::close)
#[derive(Clone, Debug)]
pub struct Config {
    /// Identifier of the test run.
    pub run_id: String,

    /// Maximum time a broadcast waits for its fan-out tasks.
    ///
    /// Void broadcasts log a warning and return when it elapses; the check
    /// broadcast fails with [`BroadcastError::CheckTimedOut`](crate::BroadcastError::CheckTimedOut).
    pub fanout_ceiling: Duration,

    /// Period of the heartbeat timer. The first tick fires immediately.
    pub heartbeat_interval: Duration,

    /// Size of the timeline worker pool.
    ///
    /// Entries due while all workers are busy queue behind them.
    pub timeline_workers: usize,

    /// Whether [`Session::stop`](crate::Session::stop) runs the check broadcast.
    pub check_results: bool,

    /// Grace given to in-flight broadcast tasks when the session is closed.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Returns the heartbeat period as an `Option`.
    ///
    /// - `None` → heartbeat disabled
    /// - `Some(d)` → tick every `d`
    #[inline]
    pub fn heartbeat_period(&self) -> Option<Duration> {
        if self.heartbeat_interval == Duration::ZERO {
            None
        } else {
            Some(self.heartbeat_interval)
        }
    }

    /// Returns the timeline pool size clamped to a minimum of 1.
    #[inline]
    pub fn timeline_workers_clamped(&self) -> usize {
        self.timeline_workers.max(1)
    }

    /// Returns a copy with the given run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `run_id` = random UUID v4
    /// - `fanout_ceiling = 300s`
    /// - `heartbeat_interval = 30s`
    /// - `timeline_workers = 2`
    /// - `check_results = false`
    /// - `shutdown_grace = 10s`
    fn default() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            fanout_ceiling: DEFAULT_FANOUT_CEILING,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeline_workers: DEFAULT_TIMELINE_WORKERS,
            check_results: false,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}
