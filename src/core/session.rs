//! # Session: lifecycle state machine around a test run.
//!
//! Sequences [`Broadcaster`] and [`Scheduler`] calls:
//!
//! ```text
//!                 start()                 stop()
//!   NotStarted ───────────► Running ───────────────► Stopped
//!                              │    kill()          ▲
//!                              ├────────────────────┘
//!                              │    abort()
//!                              └───────────────────► Aborted
//!
//! start():  before_run ──► heartbeat timer ──► timeline timer
//! stop():   shutdown timers ──► after_run ──► check (if enabled)
//! abort():  shutdown timers ──► abort
//! kill():   shutdown timers
//! ```
//!
//! `Stopped` and `Aborted` are terminal: any transition outside the table
//! fails with [`SessionError::InvalidTransition`].
//!
//! ## Escape signals
//! The session does not react to escape signals on its own. The embedder
//! awaits [`Session::escape_signal`] and hands the signal to
//! [`Session::respond_to`] (ABORT → `abort()`, KILL → `kill()`).
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{Config, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::builder(Config::default())
//!     .with_timeline("PT1S|warmup\nPT5S|spike(peak load)|rps=900".parse()?)
//!     .build()?;
//!
//! session.start().await?;
//! tokio::select! {
//!     Some(signal) = session.escape_signal() => session.respond_to(signal).await?,
//!     _ = tokio::time::sleep(Duration::from_millis(10)) => {
//!         let checks = session.stop().await?;
//!         assert!(eventvisor::all_passed(&checks));
//!     }
//! }
//! assert!(session.is_stopped());
//! session.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::core::broadcaster::Broadcaster;
use crate::core::config::Config;
use crate::core::scheduler::Scheduler;
use crate::error::{EscapeSignal, SessionError, SignalKind};
use crate::observers::{CheckResult, ObserverRef, ObserverRegistry};
use crate::registrar::{NoopRegistrar, Registrar};
use crate::timeline::Timeline;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Built, not started yet.
    NotStarted,
    /// Timers running.
    Running,
    /// Stopped normally (or killed).
    Stopped,
    /// Aborted; abort hooks ran.
    Aborted,
}

impl SessionState {
    /// True for `Stopped` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Aborted)
    }

    /// Allowed-edge table.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::NotStarted, SessionState::Running)
                | (SessionState::Running, SessionState::Stopped)
                | (SessionState::Running, SessionState::Aborted)
        )
    }
}

/// Builder for a [`Session`].
pub struct SessionBuilder {
    cfg: Config,
    observers: Vec<ObserverRef>,
    timeline: Timeline,
    registrar: Arc<dyn Registrar>,
}

impl SessionBuilder {
    /// Creates a builder with no observers, an empty timeline and a no-op registrar.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
            timeline: Timeline::new(),
            registrar: Arc::new(NoopRegistrar),
        }
    }

    /// Sets observers, in registration order.
    pub fn with_observers(mut self, observers: Vec<ObserverRef>) -> Self {
        self.observers = observers;
        self
    }

    /// Appends one observer.
    pub fn with_observer(mut self, observer: ObserverRef) -> Self {
        self.observers.push(observer);
        self
    }

    /// Instantiates the named observers from `registry` and appends them.
    pub fn with_registry<S: AsRef<str>>(
        mut self,
        registry: &ObserverRegistry,
        names: &[S],
    ) -> Result<Self, SessionError> {
        self.observers.extend(registry.resolve(names)?);
        Ok(self)
    }

    /// Sets the custom event timeline.
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    /// Sets the test-registration collaborator.
    pub fn with_registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Validates observers and wires broadcaster and scheduler.
    pub fn build(self) -> Result<Session, SessionError> {
        let broadcaster = Arc::new(
            Broadcaster::builder(self.cfg.clone())
                .with_observers(self.observers)
                .build()?,
        );
        let scheduler = Scheduler::new(
            Arc::clone(&broadcaster),
            self.registrar,
            self.timeline,
            &self.cfg,
        );
        Ok(Session {
            cfg: self.cfg,
            state: Mutex::new(SessionState::NotStarted),
            broadcaster,
            scheduler,
        })
    }
}

/// Sequences lifecycle broadcasts and timers around one test run.
pub struct Session {
    cfg: Config,
    state: Mutex<SessionState>,
    broadcaster: Arc<Broadcaster>,
    scheduler: Scheduler,
}

impl Session {
    /// Returns a builder.
    pub fn builder(cfg: Config) -> SessionBuilder {
        SessionBuilder::new(cfg)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// True once the session was stopped, killed or aborted.
    pub fn is_stopped(&self) -> bool {
        self.state().is_terminal()
    }

    /// Identifier of the run.
    pub fn run_id(&self) -> &str {
        &self.cfg.run_id
    }

    /// The session's broadcaster.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Broadcasts before-run, then starts the heartbeat and the timeline.
    ///
    /// If the session is stopped, killed or aborted while before-run is still
    /// in flight, no timer is started and `start` returns `Ok`.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Running)?;
        self.broadcaster.broadcast_before_run().await;

        // Held while the timers start so a concurrent stop either sees them or we see it.
        let state = self.lock_state();
        if *state != SessionState::Running {
            warn!(run_id = %self.cfg.run_id, state = ?*state, "session ended during before-run; timers not started");
            return Ok(());
        }
        self.scheduler.start_heartbeat()?;
        self.scheduler.start_timeline()?;
        Ok(())
    }

    /// Stops the timers, broadcasts after-run and, if enabled, runs the check pass.
    ///
    /// Returns the check results (empty when checking is disabled).
    pub async fn stop(&self) -> Result<Vec<CheckResult>, SessionError> {
        self.transition(SessionState::Stopped)?;
        self.scheduler.shutdown_now().await;
        self.broadcaster.broadcast_after_run().await;

        if !self.cfg.check_results {
            return Ok(Vec::new());
        }
        let results = self.broadcaster.broadcast_check().await?;
        let failed = results.iter().filter(|r| r.is_failure()).count();
        info!(checks = results.len(), failed, "session checked");
        Ok(results)
    }

    /// Stops the timers and broadcasts abort; after-run and check are skipped.
    pub async fn abort(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Aborted)?;
        self.scheduler.shutdown_now().await;
        self.broadcaster.broadcast_abort().await;
        Ok(())
    }

    /// Stops the timers without any further broadcast.
    pub async fn kill(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Stopped)?;
        self.scheduler.shutdown_now().await;
        Ok(())
    }

    /// Waits until a heartbeat observer raises an escape signal and takes it.
    ///
    /// Each signal is delivered to one caller only; a later call waits for the
    /// next one. Cancel-safe, so it can sit in a `select!` arm.
    /// Returns `None` if the scheduler is gone.
    pub async fn escape_signal(&self) -> Option<EscapeSignal> {
        let mut rx = self.scheduler.escape_signals();
        loop {
            rx.wait_for(Option::is_some).await.ok()?;
            if let Some(signal) = self.scheduler.take_escape_signal() {
                return Some(signal);
            }
        }
    }

    /// Reacts to an escape signal: ABORT → [`abort`](Self::abort), KILL → [`kill`](Self::kill).
    ///
    /// ABORT is the graceful exit (abort hooks run, state `Aborted`). KILL is the
    /// immediate halt (timers stop, no hooks, state `Stopped`).
    pub async fn respond_to(&self, signal: EscapeSignal) -> Result<(), SessionError> {
        warn!(signal = %signal, "responding to escape signal");
        match signal.kind() {
            SignalKind::Abort => self.abort().await,
            SignalKind::Kill => self.kill().await,
        }
    }

    /// Shuts down the broadcaster's task pool within `Config::shutdown_grace`.
    ///
    /// Returns the number of dropped observer tasks.
    pub async fn close(&self) -> usize {
        self.broadcaster.shutdown(self.cfg.shutdown_grace).await
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates and commits a transition; returns the previous state.
    fn transition(&self, to: SessionState) -> Result<SessionState, SessionError> {
        let mut state = self.lock_state();
        let from = *state;
        if !from.can_transition_to(to) {
            warn!(from = ?from, to = ?to, "rejected session transition");
            return Err(SessionError::InvalidTransition { from, to });
        }
        *state = to;
        info!(run_id = %self.cfg.run_id, from = ?from, to = ?to, "session transition");
        Ok(from)
    }
}
