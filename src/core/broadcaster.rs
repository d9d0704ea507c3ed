//! # Broadcaster: bounded-time fan-out to all observers.
//!
//! The [`Broadcaster`] owns the (immutable) observer list and a task pool. Each
//! broadcast spawns one task per observer, then waits for all of them or for
//! the fan-out ceiling, whichever comes first.
//!
//! ## Architecture
//! ```text
//! broadcast_X()
//!     │
//!     ├──► task 1 ──► sandbox(obs1.X()) ──► Outcome ─┐
//!     ├──► task 2 ──► sandbox(obs2.X()) ──► Outcome ─┼──► escape sink (append-only)
//!     └──► task N ──► sandbox(obsN.X()) ──► Outcome ─┘
//!     │
//!     └──► timeout(ceiling, join_all) ──► Ok  → inspect sink (heartbeat only)
//!                                     └─► Err → warn, tasks keep running detached
//! ```
//!
//! ## Rules
//! - **Isolation**: a failing, panicking or hanging observer never delays or fails its siblings
//! - **Bounded wait**: every broadcast returns after at most `Config::fanout_ceiling`
//! - **Escape signals**: only [`broadcast_heartbeat`](Broadcaster::broadcast_heartbeat)
//!   surfaces them (ABORT over KILL); other broadcasts log and drop them
//! - **Check pass**: failures become `FAILURE` results; ceiling expiry is an error
//! - **No ordering** between observers within one broadcast
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use eventvisor::{Broadcaster, Config, Observer, ObserverError};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Observer for Hello {
//!     fn name(&self) -> &str { "hello" }
//!     async fn before_run(&self) -> Result<(), ObserverError> { Ok(()) }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let b = Broadcaster::builder(Config::default())
//!     .with_observers(vec![Arc::new(Hello)])
//!     .build()?;
//! b.broadcast_before_run().await;
//! b.shutdown(std::time::Duration::from_secs(1)).await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tracing::{debug, error, warn};

use crate::core::config::Config;
use crate::core::dispatch::{sandbox, Outcome, Phase, TaskPool};
use crate::error::{BroadcastError, EscapeSignal, ObserverError};
use crate::observers::{CheckResult, ObserverRef};
use crate::timeline::TimelineEntry;

/// Builder for a [`Broadcaster`].
pub struct BroadcasterBuilder {
    cfg: Config,
    observers: Vec<ObserverRef>,
}

impl BroadcasterBuilder {
    /// Creates a builder with no observers.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
        }
    }

    /// Sets the observers, in registration order.
    pub fn with_observers(mut self, observers: Vec<ObserverRef>) -> Self {
        self.observers = observers;
        self
    }

    /// Appends one observer.
    pub fn with_observer(mut self, observer: ObserverRef) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validates observer names (non-empty, unique) and builds the broadcaster.
    pub fn build(self) -> Result<Broadcaster, BroadcastError> {
        let mut seen = HashSet::with_capacity(self.observers.len());
        for (index, obs) in self.observers.iter().enumerate() {
            let name = obs.name();
            if name.is_empty() {
                return Err(BroadcastError::EmptyName { index });
            }
            if !seen.insert(name.to_string()) {
                return Err(BroadcastError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }
        Ok(Broadcaster {
            observers: self.observers.into(),
            ceiling: self.cfg.fanout_ceiling,
            pool: TaskPool::new("broadcast"),
        })
    }
}

/// Fans lifecycle, heartbeat, custom event and check calls out to all observers.
pub struct Broadcaster {
    observers: Arc<[ObserverRef]>,
    ceiling: Duration,
    pool: TaskPool,
}

/// Escape signals of one broadcast; `None` once the broadcast stopped collecting.
type EscapeSink = Arc<Mutex<Option<Vec<EscapeSignal>>>>;

impl Broadcaster {
    /// Returns a builder.
    pub fn builder(cfg: Config) -> BroadcasterBuilder {
        BroadcasterBuilder::new(cfg)
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Observer names in registration order.
    pub fn observer_names(&self) -> Vec<String> {
        self.observers.iter().map(|o| o.name().to_string()).collect()
    }

    /// True once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_closed()
    }

    /// Calls [`Observer::before_run`](crate::Observer::before_run) on every observer.
    pub async fn broadcast_before_run(&self) {
        self.fan_out(Phase::BeforeRun, |o| async move { o.before_run().await })
            .await;
    }

    /// Calls [`Observer::after_run`](crate::Observer::after_run) on every observer.
    pub async fn broadcast_after_run(&self) {
        self.fan_out(Phase::AfterRun, |o| async move { o.after_run().await })
            .await;
    }

    /// Calls [`Observer::abort`](crate::Observer::abort) on every observer.
    pub async fn broadcast_abort(&self) {
        self.fan_out(Phase::Abort, |o| async move { o.abort().await })
            .await;
    }

    /// Calls [`Observer::custom_event`](crate::Observer::custom_event) on every observer.
    ///
    /// Escape signals raised here are logged, not surfaced.
    pub async fn broadcast_custom_event(&self, entry: &TimelineEntry) {
        let entry = Arc::new(entry.clone());
        self.fan_out(Phase::CustomEvent, move |o| {
            let entry = Arc::clone(&entry);
            async move { o.custom_event(&entry).await }
        })
        .await;
    }

    /// Calls [`Observer::heartbeat`](crate::Observer::heartbeat) on every observer.
    ///
    /// Once all tasks finished (or the ceiling elapsed), returns the captured
    /// ABORT signal if any, else the captured KILL signal if any, else `Ok(())`.
    ///
    /// A signal raised by an observer still running when the ceiling elapsed
    /// belongs to no broadcast: it is logged and dropped.
    pub async fn broadcast_heartbeat(&self) -> Result<(), EscapeSignal> {
        let signals = self
            .fan_out(Phase::Heartbeat, |o| async move { o.heartbeat().await })
            .await;

        match signals.into_iter().max_by_key(|s| s.kind().priority()) {
            Some(sig) => {
                warn!(signal = %sig, "heartbeat raised escape signal");
                Err(sig)
            }
            None => Ok(()),
        }
    }

    /// Asks every observer for a verdict.
    ///
    /// Results come back in registration order. An observer that fails, panics
    /// or is cancelled yields a `FAILURE` result carrying the cause.
    ///
    /// # Errors
    /// - [`BroadcastError::CheckTimedOut`] if the ceiling elapsed first
    /// - [`BroadcastError::ShutDown`] after [`shutdown`](Self::shutdown)
    pub async fn broadcast_check(&self) -> Result<Vec<CheckResult>, BroadcastError> {
        if self.pool.is_closed() {
            warn!(phase = %Phase::Check, "broadcaster is shut down; check skipped");
            return Err(BroadcastError::ShutDown);
        }

        let handles: Vec<JoinHandle<Option<CheckResult>>> = self
            .observers
            .iter()
            .map(|obs| {
                let obs = Arc::clone(obs);
                self.pool.spawn(async move {
                    let (id, kind) = (obs.name().to_string(), obs.kind());
                    match sandbox(obs.check()).await {
                        Ok(verdict) => CheckResult::from_verdict(&id, kind, verdict),
                        Err(e) => {
                            error!(observer = %id, phase = %Phase::Check, error = %e, "observer check failed");
                            CheckResult::failed(&id, kind, e)
                        }
                    }
                })
            })
            .collect();

        let joined = self
            .await_all(Phase::Check, handles)
            .await
            .ok_or(BroadcastError::CheckTimedOut {
                ceiling: self.ceiling,
            })?;

        let results = self
            .observers
            .iter()
            .zip(joined)
            .map(|(obs, res)| match res {
                Ok(Some(result)) => result,
                Ok(None) => CheckResult::failed(obs.name(), obs.kind(), "check cancelled by shutdown"),
                Err(join_err) => CheckResult::failed(obs.name(), obs.kind(), join_err),
            })
            .collect();
        Ok(results)
    }

    /// Stops the task pool: waits up to `timeout` for in-flight observer
    /// tasks, then cancels the rest and logs how many were dropped.
    ///
    /// Idempotent; a second call returns `0` without reporting.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.pool.shutdown(timeout).await
    }

    /// Spawns `call(observer)` for every observer and waits (bounded).
    ///
    /// Returns the escape signals captured before the wait ended.
    async fn fan_out<F, Fut>(&self, phase: Phase, call: F) -> Vec<EscapeSignal>
    where
        F: Fn(ObserverRef) -> Fut,
        Fut: Future<Output = Result<(), ObserverError>> + Send + 'static,
    {
        if self.pool.is_closed() {
            warn!(phase = %phase, "broadcaster is shut down; broadcast skipped");
            return Vec::new();
        }
        debug!(phase = %phase, observers = self.observers.len(), "broadcasting");

        let sink: EscapeSink = Arc::new(Mutex::new(Some(Vec::new())));
        let handles: Vec<JoinHandle<Option<()>>> = self
            .observers
            .iter()
            .map(|obs| {
                let name = obs.name().to_string();
                let hook = call(Arc::clone(obs));
                let sink = Arc::clone(&sink);
                self.pool.spawn(async move {
                    let outcome = Outcome::from(sandbox(hook).await);
                    record(phase, &name, outcome, &sink);
                })
            })
            .collect();

        if let Some(joined) = self.await_all(phase, handles).await {
            for res in joined {
                report_interrupted(phase, res);
            }
        }

        let captured = sink.lock().unwrap_or_else(PoisonError::into_inner).take();
        captured.unwrap_or_default()
    }

    /// Joins all handles within the ceiling; `None` if it elapsed.
    async fn await_all<T>(
        &self,
        phase: Phase,
        handles: Vec<JoinHandle<Option<T>>>,
    ) -> Option<Vec<Result<Option<T>, JoinError>>> {
        match time::timeout(self.ceiling, join_all(handles)).await {
            Ok(joined) => Some(joined),
            Err(_elapsed) => {
                warn!(
                    phase = %phase,
                    ceiling = ?self.ceiling,
                    "fan-out ceiling reached; unfinished observer tasks keep running in the background"
                );
                None
            }
        }
    }
}

/// Logs one outcome and appends escape signals to the sink.
fn record(phase: Phase, name: &str, outcome: Outcome, sink: &EscapeSink) {
    match outcome {
        Outcome::Done => {}
        Outcome::Failed(err) => {
            error!(observer = %name, phase = %phase, error = %err, "observer hook failed");
        }
        Outcome::Escaped(sig) if phase == Phase::Heartbeat => {
            match sink.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
                Some(signals) => {
                    warn!(observer = %name, signal = %sig, "observer raised escape signal");
                    signals.push(sig);
                }
                None => {
                    warn!(
                        observer = %name,
                        signal = %sig,
                        "escape signal raised after the fan-out ceiling; dropped"
                    );
                }
            }
        }
        Outcome::Escaped(sig) => {
            error!(
                observer = %name,
                phase = %phase,
                signal = %sig,
                "escape signal outside heartbeat is treated as a failure"
            );
        }
    }
}

fn report_interrupted(phase: Phase, res: Result<Option<()>, JoinError>) {
    match res {
        Ok(Some(())) => {}
        Ok(None) => {
            warn!(phase = %phase, "observer task cancelled by shutdown; broadcast may be incomplete");
        }
        Err(e) => {
            warn!(phase = %phase, error = %e, "observer task interrupted; broadcast may be incomplete");
        }
    }
}
