//! # Per-observer sandbox and fan-out task pool.
//!
//! Every observer hook runs inside [`sandbox`], which turns the hook's result
//! (or a panic) into an [`Outcome`]:
//!
//! ```text
//! hook() ──► Ok(())                ──► Outcome::Done
//!        ──► Err(Failed{error})    ──► Outcome::Failed(error)
//!        ──► Err(Escape(signal))   ──► Outcome::Escaped(signal)
//!        ──► panic!                ──► Outcome::Failed("panicked: ...")
//! ```
//!
//! Hooks are spawned on a [`TaskPool`]: a tracked set of tokio tasks that can
//! be drained with a grace period and then cancelled in bulk.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if an observer uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::core::shutdown::report_dropped;
use crate::error::{EscapeSignal, ObserverError};

/// Lifecycle moment being broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    BeforeRun,
    AfterRun,
    Heartbeat,
    Abort,
    CustomEvent,
    Check,
}

impl Phase {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Phase::BeforeRun => "before_run",
            Phase::AfterRun => "after_run",
            Phase::Heartbeat => "heartbeat",
            Phase::Abort => "abort",
            Phase::CustomEvent => "custom_event",
            Phase::Check => "check",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one observer hook, as seen by the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Failed(String),
    Escaped(EscapeSignal),
}

impl From<Result<(), ObserverError>> for Outcome {
    fn from(res: Result<(), ObserverError>) -> Self {
        match res {
            Ok(()) => Outcome::Done,
            Err(ObserverError::Failed { error }) => Outcome::Failed(error),
            Err(ObserverError::Escape(sig)) => Outcome::Escaped(sig),
        }
    }
}

/// Runs a hook future, converting a panic into an ordinary failure.
pub(crate) async fn sandbox<F, T>(fut: F) -> Result<T, ObserverError>
where
    F: Future<Output = Result<T, ObserverError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic_err) => Err(ObserverError::Failed {
            error: format!("panicked: {}", panic_message(&*panic_err)),
        }),
    }
}

fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tracked pool of fan-out tasks with bulk, grace-bounded shutdown.
pub(crate) struct TaskPool {
    label: &'static str,
    tracker: TaskTracker,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl TaskPool {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Spawns `fut`; resolves to `None` if the pool is force-cancelled first.
    pub(crate) fn spawn<F, T>(&self, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                out = fut => Some(out),
            }
        })
    }

    /// Waits up to `grace` for in-flight tasks, then cancels the rest.
    ///
    /// Returns the number of cancelled tasks; a second call is a no-op returning `0`.
    pub(crate) async fn shutdown(&self, grace: Duration) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(pool = self.label, "pool already shut down");
            return 0;
        }
        self.tracker.close();

        let dropped = match time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => 0,
            Err(_elapsed) => {
                let n = self.tracker.len();
                self.cancel.cancel();
                n
            }
        };
        report_dropped(self.label, dropped);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sandbox_turns_panic_into_failure() {
        let hook = async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), ObserverError>(())
        };
        let res = sandbox(hook).await;
        match res {
            Err(ObserverError::Failed { error }) => assert_eq!(error, "panicked: kaboom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outcome_from_result() {
        assert_eq!(Outcome::from(Ok(())), Outcome::Done);
        assert_eq!(
            Outcome::from(Err(ObserverError::fail("x"))),
            Outcome::Failed("x".into())
        );
        assert_eq!(
            Outcome::from(Err(EscapeSignal::kill("k").into())),
            Outcome::Escaped(EscapeSignal::kill("k"))
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_stragglers_once() {
        let pool = TaskPool::new("test");
        let slow = pool.spawn(async {
            time::sleep(Duration::from_secs(60)).await;
        });
        let fast = pool.spawn(async { 7 });
        assert_eq!(fast.await.unwrap(), Some(7));

        assert_eq!(pool.shutdown(Duration::from_millis(20)).await, 1);
        assert_eq!(slow.await.unwrap(), None);
        assert!(pool.is_closed());
        assert_eq!(pool.shutdown(Duration::from_millis(20)).await, 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_quick_tasks() {
        let pool = TaskPool::new("test");
        let h = pool.spawn(async {
            time::sleep(Duration::from_millis(10)).await;
            "done"
        });
        assert_eq!(pool.shutdown(Duration::from_secs(5)).await, 0);
        assert_eq!(h.await.unwrap(), Some("done"));
    }
}
