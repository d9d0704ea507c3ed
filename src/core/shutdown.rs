//! # Dropped-task reporting.
//!
//! Both the broadcaster pool and the timeline timer report how many tasks a
//! forced shutdown discarded, with the same wording:
//!
//! ```text
//! broadcast: 1 task was dropped on shutdown
//! timeline: 3 tasks were dropped on shutdown
//! ```

use tracing::{debug, warn};

/// Formats the dropped-task message (singular for `0`/`1`, plural above).
pub(crate) fn dropped_message(pool: &str, dropped: usize) -> String {
    if dropped <= 1 {
        format!("{pool}: {dropped} task was dropped on shutdown")
    } else {
        format!("{pool}: {dropped} tasks were dropped on shutdown")
    }
}

/// Logs the dropped-task count (warn when anything was lost).
pub(crate) fn report_dropped(pool: &str, dropped: usize) {
    let msg = dropped_message(pool, dropped);
    if dropped == 0 {
        debug!(pool, dropped, "{msg}");
    } else {
        warn!(pool, dropped, "{msg}");
    }
}
