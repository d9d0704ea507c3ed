//! # Scheduler: heartbeat timer and custom event timeline.
//!
//! Owns two independent timer facilities, created on start and torn down
//! together by [`Scheduler::shutdown_now`].
//!
//! ## Heartbeat
//! ```text
//! interval(period) — first tick immediate, fixed rate
//! loop {
//!   ├─► registrar.notify_heartbeat(run_id)      (failure logged, isolated)
//!   └─► broadcaster.broadcast_heartbeat()
//!         ├─ Ok            → next tick
//!         └─ Err(signal)   → publish on escape_signals(), stop ticking
//! }
//! ```
//!
//! ## Timeline
//! ```text
//! start ──► one task per entry
//!             ├─► sleep_until(start + offset)            (cancellable)
//!             ├─► acquire worker permit (pool of N, default 2)
//!             ├─► registrar.notify_custom_event(...)     (failure logged, isolated)
//!             └─► broadcaster.broadcast_custom_event(entry)
//! ```
//! Entries due while every worker is busy queue behind them.
//!
//! ## Rules
//! - Starting a timer twice without `shutdown_now` fails with [`ScheduleError::AlreadyStarted`]
//! - Starting the timeline with no entries is a logged no-op
//! - `shutdown_now` is safe when nothing was started
//! - `shutdown_now` must not be awaited from inside an observer hook (it joins the timer tasks)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::broadcaster::Broadcaster;
use crate::core::config::Config;
use crate::core::shutdown::report_dropped;
use crate::error::{EscapeSignal, ScheduleError, Timer};
use crate::registrar::Registrar;
use crate::timeline::{Timeline, TimelineEntry};

struct HeartbeatTimer {
    cancel: CancellationToken,
    /// `None` when the heartbeat is disabled by config.
    handle: Option<JoinHandle<()>>,
}

struct TimelineTimer {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    /// Entries whose task has not started executing yet.
    pending: Arc<AtomicUsize>,
}

/// Shared state handed to every timer task.
#[derive(Clone)]
struct TimerCtx {
    broadcaster: Arc<Broadcaster>,
    registrar: Arc<dyn Registrar>,
    run_id: Arc<str>,
}

/// Drives the broadcaster from a heartbeat timer and a one-shot event timeline.
pub struct Scheduler {
    ctx: TimerCtx,
    timeline: Arc<[TimelineEntry]>,
    heartbeat_period: Option<Duration>,
    workers: usize,
    heartbeat: Mutex<Option<HeartbeatTimer>>,
    timeline_timer: Mutex<Option<TimelineTimer>>,
    signal_tx: watch::Sender<Option<EscapeSignal>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    /// Creates a scheduler; no timer runs until started.
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        registrar: Arc<dyn Registrar>,
        timeline: Timeline,
        cfg: &Config,
    ) -> Self {
        let (signal_tx, _rx) = watch::channel(None);
        Self {
            ctx: TimerCtx {
                broadcaster,
                registrar,
                run_id: Arc::from(cfg.run_id.as_str()),
            },
            timeline: timeline.into_entries().into(),
            heartbeat_period: cfg.heartbeat_period(),
            workers: cfg.timeline_workers_clamped(),
            heartbeat: Mutex::new(None),
            timeline_timer: Mutex::new(None),
            signal_tx,
        }
    }

    /// Receiver of escape signals raised by heartbeat observers.
    ///
    /// Holds `None` until the first signal; the heartbeat stops after publishing one.
    pub fn escape_signals(&self) -> watch::Receiver<Option<EscapeSignal>> {
        self.signal_tx.subscribe()
    }

    /// Takes the published escape signal, leaving `None` behind.
    pub(crate) fn take_escape_signal(&self) -> Option<EscapeSignal> {
        self.signal_tx.send_replace(None)
    }

    /// True while the heartbeat timer is started (and not shut down).
    pub fn is_heartbeat_running(&self) -> bool {
        lock(&self.heartbeat)
            .as_ref()
            .and_then(|t| t.handle.as_ref())
            .is_some_and(|h| !h.is_finished())
    }

    /// True while at least one timeline entry has not fired yet.
    pub fn is_timeline_running(&self) -> bool {
        lock(&self.timeline_timer)
            .as_ref()
            .is_some_and(|t| t.handles.iter().any(|h| !h.is_finished()))
    }

    /// Starts the fixed-rate heartbeat (first tick immediately).
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_heartbeat(&self) -> Result<(), ScheduleError> {
        let mut slot = lock(&self.heartbeat);
        if slot.is_some() {
            return Err(ScheduleError::AlreadyStarted {
                timer: Timer::Heartbeat,
            });
        }

        let cancel = CancellationToken::new();
        let handle = match self.heartbeat_period {
            None => {
                info!("heartbeat disabled (interval = 0)");
                None
            }
            Some(period) => {
                info!(period = ?period, "starting heartbeat timer");
                let ctx = self.ctx.clone();
                let tx = self.signal_tx.clone();
                let token = cancel.clone();
                Some(tokio::spawn(
                    heartbeat_loop(ctx, period, token, tx).instrument(info_span!("heartbeat")),
                ))
            }
        };
        *slot = Some(HeartbeatTimer { cancel, handle });
        Ok(())
    }

    /// Schedules one task per timeline entry, relative to now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_timeline(&self) -> Result<(), ScheduleError> {
        let mut slot = lock(&self.timeline_timer);
        if slot.is_some() {
            return Err(ScheduleError::AlreadyStarted {
                timer: Timer::Timeline,
            });
        }
        if self.timeline.is_empty() {
            info!("no custom events scheduled");
            return Ok(());
        }

        info!(
            entries = self.timeline.len(),
            workers = self.workers,
            "starting timeline"
        );
        let cancel = CancellationToken::new();
        let workers = Arc::new(Semaphore::new(self.workers));
        let pending = Arc::new(AtomicUsize::new(self.timeline.len()));
        let started = Instant::now();

        let handles = self
            .timeline
            .iter()
            .map(|entry| {
                let job = TimelineJob {
                    ctx: self.ctx.clone(),
                    entry: entry.clone(),
                    fire_at: started + entry.offset(),
                    workers: Arc::clone(&workers),
                    pending: Arc::clone(&pending),
                    cancel: cancel.clone(),
                };
                let span = info_span!("timeline", event = entry.name());
                tokio::spawn(job.run().instrument(span))
            })
            .collect();

        *slot = Some(TimelineTimer {
            cancel,
            handles,
            pending,
        });
        Ok(())
    }

    /// Cancels both timers and waits for their tasks to end.
    ///
    /// Returns (and logs) the number of timeline entries that never started.
    pub async fn shutdown_now(&self) -> usize {
        let heartbeat = lock(&self.heartbeat).take();
        let timeline = lock(&self.timeline_timer).take();

        if let Some(hb) = heartbeat {
            hb.cancel.cancel();
            if let Some(handle) = hb.handle {
                handle.abort();
                let _ = handle.await;
            }
            debug!("heartbeat timer stopped");
        }

        let Some(tl) = timeline else {
            return 0;
        };
        tl.cancel.cancel();
        for handle in &tl.handles {
            handle.abort();
        }
        for handle in tl.handles {
            let _ = handle.await;
        }
        let dropped = tl.pending.load(Ordering::SeqCst);
        report_dropped("timeline", dropped);
        dropped
    }
}

async fn heartbeat_loop(
    ctx: TimerCtx,
    period: Duration,
    cancel: CancellationToken,
    signal_tx: watch::Sender<Option<EscapeSignal>>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = ctx.registrar.notify_heartbeat(&ctx.run_id).await {
            error!(run_id = %ctx.run_id, error = %e, "heartbeat registration failed");
        }

        if let Err(sig) = ctx.broadcaster.broadcast_heartbeat().await {
            warn!(signal = %sig, "heartbeat stopped by escape signal");
            signal_tx.send_replace(Some(sig));
            break;
        }
    }
}

/// One scheduled timeline entry.
struct TimelineJob {
    ctx: TimerCtx,
    entry: TimelineEntry,
    fire_at: Instant,
    workers: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl TimelineJob {
    async fn run(self) {
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return,
            permit = async {
                time::sleep_until(self.fire_at).await;
                Arc::clone(&self.workers).acquire_owned().await
            } => permit,
        };
        let Ok(_permit) = permit else {
            return;
        };
        self.pending.fetch_sub(1, Ordering::SeqCst);

        let entry = &self.entry;
        info!(
            event = entry.name(),
            offset = ?entry.offset(),
            description = entry.description(),
            "firing custom event"
        );
        if let Err(e) = self
            .ctx
            .registrar
            .notify_custom_event(&self.ctx.run_id, entry.description())
            .await
        {
            error!(event = entry.name(), error = %e, "custom event registration failed");
        }
        self.ctx.broadcaster.broadcast_custom_event(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;

    use crate::error::{BoxError, ObserverError, SignalKind};
    use crate::observers::{Observer, ObserverRef};

    #[derive(Default)]
    struct Recorder {
        heartbeats: AtomicUsize,
        events: Mutex<Vec<(String, Duration)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        event_delay: Duration,
        kill_on_heartbeat: bool,
        origin: Mutex<Option<Instant>>,
    }

    impl Recorder {
        fn heartbeats(&self) -> usize {
            self.heartbeats.load(Ordering::SeqCst)
        }

        fn events(&self) -> Vec<(String, Duration)> {
            lock(&self.events).clone()
        }

        fn mark_origin(&self) {
            *lock(&self.origin) = Some(Instant::now());
        }
    }

    #[async_trait]
    impl Observer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn heartbeat(&self) -> Result<(), ObserverError> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.kill_on_heartbeat {
                return Err(crate::EscapeSignal::kill("stop the run").into());
            }
            Ok(())
        }

        async fn custom_event(&self, entry: &TimelineEntry) -> Result<(), ObserverError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let origin = *lock(&self.origin);
            let at = origin.map(|o| o.elapsed()).unwrap_or_default();
            lock(&self.events).push((entry.name().to_string(), at));
            time::sleep(self.event_delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingRegistrar {
        heartbeats: AtomicUsize,
        events: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Registrar for CountingRegistrar {
        async fn notify_heartbeat(&self, run_id: &str) -> Result<(), BoxError> {
            assert_eq!(run_id, "run-42");
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err("registration endpoint down".into());
            }
            Ok(())
        }

        async fn notify_custom_event(&self, _run_id: &str, description: &str) -> Result<(), BoxError> {
            lock(&self.events).push(description.to_string());
            if self.failing.load(Ordering::SeqCst) {
                return Err("registration endpoint down".into());
            }
            Ok(())
        }
    }

    /// Observer and registrar at once, writing to one shared journal.
    #[derive(Default)]
    struct Sequence {
        journal: Mutex<Vec<&'static str>>,
    }

    impl Sequence {
        fn push(&self, step: &'static str) {
            lock(&self.journal).push(step);
        }

        fn drain(&self) -> Vec<&'static str> {
            std::mem::take(&mut *lock(&self.journal))
        }
    }

    #[async_trait]
    impl Observer for Sequence {
        fn name(&self) -> &str {
            "sequence"
        }

        async fn heartbeat(&self) -> Result<(), ObserverError> {
            self.push("observer");
            Ok(())
        }

        async fn custom_event(&self, _entry: &TimelineEntry) -> Result<(), ObserverError> {
            self.push("observer");
            Ok(())
        }
    }

    #[async_trait]
    impl Registrar for Sequence {
        async fn notify_heartbeat(&self, _run_id: &str) -> Result<(), BoxError> {
            self.push("registrar");
            Ok(())
        }

        async fn notify_custom_event(&self, _run_id: &str, _description: &str) -> Result<(), BoxError> {
            self.push("registrar");
            Ok(())
        }
    }

    fn scheduler(
        recorder: Arc<Recorder>,
        registrar: Arc<CountingRegistrar>,
        timeline: Timeline,
        interval: Duration,
    ) -> Scheduler {
        let cfg = Config {
            run_id: "run-42".into(),
            heartbeat_interval: interval,
            ..Config::default()
        };
        let broadcaster = Broadcaster::builder(cfg.clone())
            .with_observer(recorder as ObserverRef)
            .build()
            .unwrap();
        Scheduler::new(Arc::new(broadcaster), registrar, timeline, &cfg)
    }

    fn entry(secs: u64, name: &str) -> TimelineEntry {
        TimelineEntry::new(Duration::from_secs(secs), name, None, None)
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_at_fixed_rate_from_zero() {
        let rec = Arc::new(Recorder::default());
        let reg = Arc::new(CountingRegistrar::default());
        let s = scheduler(rec.clone(), reg.clone(), Timeline::new(), Duration::from_secs(10));

        s.start_heartbeat().unwrap();
        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(rec.heartbeats(), 4);
        assert_eq!(reg.heartbeats.load(Ordering::SeqCst), 4);
        assert!(s.is_heartbeat_running());

        assert_eq!(s.shutdown_now().await, 0);
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rec.heartbeats(), 4);
        assert!(!s.is_heartbeat_running());
    }

    #[tokio::test(start_paused = true)]
    async fn registrar_is_notified_before_each_broadcast() {
        let seq = Arc::new(Sequence::default());
        let cfg = Config {
            run_id: "run-42".into(),
            heartbeat_interval: Duration::from_secs(10),
            ..Config::default()
        };
        let broadcaster = Broadcaster::builder(cfg.clone())
            .with_observer(seq.clone() as ObserverRef)
            .build()
            .unwrap();
        let s = Scheduler::new(
            Arc::new(broadcaster),
            seq.clone(),
            Timeline::from(vec![entry(3, "spike")]),
            &cfg,
        );

        s.start_heartbeat().unwrap();
        time::sleep(Duration::from_secs(5)).await;
        s.shutdown_now().await;
        assert_eq!(seq.drain(), vec!["registrar", "observer"]);

        s.start_timeline().unwrap();
        time::sleep(Duration::from_secs(5)).await;
        s.shutdown_now().await;
        assert_eq!(seq.drain(), vec!["registrar", "observer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn registrar_failure_does_not_block_heartbeat() {
        let rec = Arc::new(Recorder::default());
        let reg = Arc::new(CountingRegistrar::default());
        reg.failing.store(true, Ordering::SeqCst);
        let s = scheduler(rec.clone(), reg, Timeline::new(), Duration::from_secs(10));

        s.start_heartbeat().unwrap();
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(rec.heartbeats(), 2);
        s.shutdown_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn escape_signal_stops_heartbeat_and_is_published() {
        let rec = Arc::new(Recorder {
            kill_on_heartbeat: true,
            ..Recorder::default()
        });
        let s = scheduler(
            rec.clone(),
            Arc::new(CountingRegistrar::default()),
            Timeline::new(),
            Duration::from_secs(10),
        );
        let mut signals = s.escape_signals();

        s.start_heartbeat().unwrap();
        signals.changed().await.unwrap();
        let sig = signals.borrow().clone().unwrap();
        assert_eq!(sig.kind(), SignalKind::Kill);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rec.heartbeats(), 1);
        s.shutdown_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_fires_entries_at_their_offsets() {
        let rec = Arc::new(Recorder::default());
        let reg = Arc::new(CountingRegistrar::default());
        let timeline = Timeline::from(vec![entry(10, "late"), entry(5, "early")]);
        let s = scheduler(rec.clone(), reg.clone(), timeline, Duration::ZERO);

        rec.mark_origin();
        s.start_timeline().unwrap();

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rec.events(), vec![("early".to_string(), Duration::from_secs(5))]);

        time::sleep(Duration::from_secs(5)).await;
        let names: Vec<String> = rec.events().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["early", "late"]);
        assert_eq!(
            *lock(&reg.events),
            vec!["early-PT5S".to_string(), "late-PT10S".to_string()]
        );
        assert!(!s.is_timeline_running());
        assert_eq!(s.shutdown_now().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_runs_at_most_two_entries_at_once() {
        let rec = Arc::new(Recorder {
            event_delay: Duration::from_secs(10),
            ..Recorder::default()
        });
        let timeline = Timeline::from(vec![entry(1, "a"), entry(1, "b"), entry(1, "c")]);
        let s = scheduler(
            rec.clone(),
            Arc::new(CountingRegistrar::default()),
            timeline,
            Duration::ZERO,
        );

        rec.mark_origin();
        s.start_timeline().unwrap();

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rec.events().len(), 2);

        time::sleep(Duration::from_secs(10)).await;
        let events = rec.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].1, Duration::from_secs(11));
        assert_eq!(rec.max_running.load(Ordering::SeqCst), 2);
        s.shutdown_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn registrar_failure_does_not_block_custom_event() {
        let rec = Arc::new(Recorder::default());
        let reg = Arc::new(CountingRegistrar::default());
        reg.failing.store(true, Ordering::SeqCst);
        let s = scheduler(rec.clone(), reg, Timeline::from(vec![entry(1, "x")]), Duration::ZERO);

        s.start_timeline().unwrap();
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rec.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_now_reports_unfired_entries() {
        let rec = Arc::new(Recorder::default());
        let timeline = Timeline::from(vec![entry(1, "a"), entry(100, "b"), entry(200, "c")]);
        let s = scheduler(
            rec.clone(),
            Arc::new(CountingRegistrar::default()),
            timeline,
            Duration::ZERO,
        );

        s.start_timeline().unwrap();
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(s.shutdown_now().await, 2);
        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(rec.events().len(), 1);
    }

    #[tokio::test]
    async fn double_start_is_rejected_until_shutdown() {
        let s = scheduler(
            Arc::new(Recorder::default()),
            Arc::new(CountingRegistrar::default()),
            Timeline::from(vec![entry(3600, "a")]),
            Duration::from_secs(3600),
        );

        s.start_heartbeat().unwrap();
        s.start_timeline().unwrap();
        assert!(matches!(
            s.start_heartbeat(),
            Err(ScheduleError::AlreadyStarted {
                timer: Timer::Heartbeat
            })
        ));
        assert!(matches!(
            s.start_timeline(),
            Err(ScheduleError::AlreadyStarted {
                timer: Timer::Timeline
            })
        ));

        assert_eq!(s.shutdown_now().await, 1);
        s.start_heartbeat().unwrap();
        s.start_timeline().unwrap();
        s.shutdown_now().await;
    }

    #[tokio::test]
    async fn empty_timeline_and_idle_shutdown_are_no_ops() {
        let s = scheduler(
            Arc::new(Recorder::default()),
            Arc::new(CountingRegistrar::default()),
            Timeline::new(),
            Duration::ZERO,
        );
        assert_eq!(s.shutdown_now().await, 0);
        s.start_timeline().unwrap();
        assert!(!s.is_timeline_running());
        s.start_heartbeat().unwrap();
        assert!(!s.is_heartbeat_running());
        assert_eq!(s.shutdown_now().await, 0);
    }
}
