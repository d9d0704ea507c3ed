//! # eventvisor
//!
//! **Eventvisor** orchestrates pluggable observers during a long-running test
//! session.
//!
//! It notifies observers of lifecycle transitions (before run, after run,
//! abort), polls them on a heartbeat, fires a timeline of custom events at
//! fixed offsets from session start, and collects their pass/fail verdicts.
//! Observers can halt or abort the whole session from their heartbeat hook.
//!
//! ## Architecture
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  Session (NotStarted → Running → Stopped / Aborted)          │
//!  └──────┬──────────────────────────────────┬────────────────────┘
//!         │ before/after/abort/check         │ start / shutdown_now
//!         │                                  ▼
//!         │                 ┌──────────────────────────────────┐
//!         │                 │  Scheduler                       │
//!         │                 │  - heartbeat timer (fixed rate)  │
//!         │                 │  - timeline timer (2 workers)    │──► Registrar
//!         │                 └──────┬───────────────────────────┘
//!         │                        │ heartbeat / custom event
//!         ▼                        ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  Broadcaster — one task per observer, bounded by the ceiling │
//!  └──────┬───────────────────┬───────────────────┬───────────────┘
//!         ▼                   ▼                   ▼
//!     observer 1          observer 2          observer N
//!         │
//!         └─ EscapeSignal (heartbeat only) ──► Scheduler::escape_signals()
//!                                          ──► Session::respond_to()
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Observers**     | Lifecycle, heartbeat, custom event and check hooks.           | [`Observer`], [`Verdict`], [`CheckResult`] |
//! | **Broadcasting**  | Concurrent fan-out with failure isolation and a wait bound.   | [`Broadcaster`]                            |
//! | **Scheduling**    | Fixed-rate heartbeat and one-shot custom event timeline.      | [`Scheduler`], [`Timeline`]                |
//! | **Sessions**      | Lifecycle state machine and escape signal handling.           | [`Session`], [`SessionState`]              |
//! | **Errors**        | Typed errors and escape signals.                              | [`EscapeSignal`], [`SessionError`]         |
//! | **Configuration** | Centralized runtime settings.                                 | [`Config`]                                 |
//!
//! ## Optional features
//! - `logging` (default): exports a built-in [`LogObserver`] _(demo/reference)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use eventvisor::{Config, EscapeSignal, Observer, ObserverError, Session, Verdict};
//!
//! struct ErrorRate;
//!
//! #[async_trait]
//! impl Observer for ErrorRate {
//!     fn name(&self) -> &str { "error-rate" }
//!
//!     async fn heartbeat(&self) -> Result<(), ObserverError> {
//!         let rate = 0.01; // poll the system under test...
//!         if rate > 0.5 {
//!             return Err(EscapeSignal::abort("error rate above 50%").into());
//!         }
//!         Ok(())
//!     }
//!
//!     async fn check(&self) -> Result<Verdict, ObserverError> {
//!         Ok(Verdict::success("error rate within budget"))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default().with_run_id("nightly-42");
//!     cfg.heartbeat_interval = Duration::from_millis(5);
//!     cfg.check_results = true;
//!
//!     let session = Session::builder(cfg)
//!         .with_observer(Arc::new(ErrorRate))
//!         .with_timeline("PT0.01S|spike(double the load)|rps=400".parse()?)
//!         .build()?;
//!
//!     session.start().await?;
//!     tokio::select! {
//!         Some(signal) = session.escape_signal() => session.respond_to(signal).await?,
//!         _ = tokio::time::sleep(Duration::from_millis(30)) => {
//!             let checks = session.stop().await?;
//!             assert!(eventvisor::all_passed(&checks));
//!         }
//!     }
//!     session.close().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod observers;
mod registrar;
mod timeline;

// ---- Public re-exports ----

pub use crate::core::{
    Broadcaster, BroadcasterBuilder, Config, Scheduler, Session, SessionBuilder, SessionState,
    DEFAULT_FANOUT_CEILING, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMELINE_WORKERS,
};
pub use error::{
    BoxError, BroadcastError, EscapeSignal, ObserverError, RegistryError, ScheduleError,
    SessionError, SignalKind, Timer, TimelineError,
};
pub use observers::{
    all_passed, CheckResult, CheckStatus, Observer, ObserverRef, ObserverRegistry, Verdict,
};
pub use registrar::{NoopRegistrar, Registrar};
pub use timeline::{parse_iso8601, sanitize, Timeline, TimelineEntry};

// Optional: expose a simple built-in logging observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogObserver;
