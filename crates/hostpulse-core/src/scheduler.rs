//! Self-paced poll loop with at most one cycle in flight.
//!
//! ```text
//!            begin_cycle()            finish_cycle()
//!   ┌──────┐ ───────────▶ ┌──────────┐ ───────────▶ ┌──────┐
//!   │ Idle │              │ Fetching │              │ Idle │ ── sleep(interval) ──▶ …
//!   └──────┘              └──────────┘              └──────┘
//!       │                      │ stop()
//!       └──────────────────────┴──────────▶ Stopped (terminal)
//! ```
//!
//! The next cycle starts `interval` after the previous one resolved, so a slow
//! fetch stretches the cadence instead of stacking requests.
//!
//! Every cycle is stamped with a [`CycleId`]. Results are applied only while
//! their id is still the current generation and the scheduler has not been
//! stopped; anything else is dropped. Teardown abandons an outstanding fetch
//! outright.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::source::{Criticality, FetchError, FetchKind};

/// Cadence of the machine detail view.
pub const DETAIL_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the fleet overview.
pub const OVERVIEW_INTERVAL: Duration = Duration::from_secs(3);

/// Poll loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn detail() -> Self {
        Self::new(DETAIL_INTERVAL)
    }

    pub fn overview() -> Self {
        Self::new(OVERVIEW_INTERVAL)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::detail()
    }
}

/// Generation stamp of one poll cycle. Strictly increasing per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleId(u64);

impl CycleId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("cycle {0} is still in flight")]
    CycleInFlight(CycleId),
    #[error("scheduler is stopped")]
    Stopped,
}

/// Outcome of one cycle, reported to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStatus {
    pub cycle: CycleId,
    /// A critical fetch failed; nothing from this cycle was applied.
    pub critical_failed: bool,
    /// Error of the failed critical fetch, if any.
    pub critical_error: Option<FetchError>,
    /// Non-critical sources that failed; their previous data was kept.
    pub non_critical_failures: BTreeSet<FetchKind>,
}

impl CycleStatus {
    pub fn ok(cycle: CycleId) -> Self {
        Self {
            cycle,
            critical_failed: false,
            critical_error: None,
            non_critical_failures: BTreeSet::new(),
        }
    }

    pub fn critical(cycle: CycleId, error: FetchError) -> Self {
        Self {
            critical_failed: true,
            critical_error: Some(error),
            ..Self::ok(cycle)
        }
    }

    /// Records a failed fetch, classified by [`FetchKind::criticality`].
    ///
    /// The first critical error is kept.
    pub fn record_failure(&mut self, kind: FetchKind, error: FetchError) {
        match kind.criticality() {
            Criticality::Critical => {
                self.critical_failed = true;
                self.critical_error.get_or_insert(error);
            }
            Criticality::NonCritical => {
                self.non_critical_failures.insert(kind);
            }
        }
    }

    /// True when every fetch of the cycle succeeded.
    pub fn is_clean(&self) -> bool {
        !self.critical_failed && self.non_critical_failures.is_empty()
    }
}

/// A view driven by the poll loop.
///
/// `fetch` performs the cycle's I/O without touching state; `apply` is the
/// only place state changes and is never called for a discarded cycle.
#[async_trait]
pub trait PollTarget: Send + Sync {
    type Fetched: Send;

    /// Issues this cycle's fetches.
    async fn fetch(&self, cycle: CycleId) -> Self::Fetched;

    /// Applies a completed, still-current cycle.
    fn apply(&mut self, cycle: CycleId, fetched: Self::Fetched) -> CycleStatus;

    /// Called once when the loop ends.
    fn teardown(&mut self) {}
}

#[derive(Debug, Default)]
struct Shared {
    generation: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicU64,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl Shared {
    fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        if first {
            self.stop_notify.notify_waiters();
        }
        first
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Cloneable control and instrumentation handle for a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Stops the loop. Idempotent; an outstanding fetch is abandoned.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Cycles currently in flight (0 or 1).
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously in-flight cycles ever observed.
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// Cycles whose results were applied.
    pub fn cycles_completed(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }
}

/// Drives one monitored view.
#[derive(Debug)]
pub struct PollScheduler {
    name: String,
    config: PollConfig,
    shared: Arc<Shared>,
}

impl PollScheduler {
    pub fn new(name: impl Into<String>, config: PollConfig) -> Self {
        Self {
            name: name.into(),
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.shared.is_stopped() {
            SchedulerState::Stopped
        } else if self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Fetching
        } else {
            SchedulerState::Idle
        }
    }

    /// Current generation (the id of the most recent cycle, if any).
    pub fn current(&self) -> Option<CycleId> {
        match self.shared.generation.load(Ordering::SeqCst) {
            0 => None,
            g => Some(CycleId(g)),
        }
    }

    /// `Idle → Fetching`. Fails if stopped or a cycle is outstanding.
    pub fn begin_cycle(&self) -> Result<CycleId, SchedulerError> {
        if self.shared.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if self
            .shared
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let current = CycleId(self.shared.generation.load(Ordering::SeqCst));
            return Err(SchedulerError::CycleInFlight(current));
        }
        self.shared.max_in_flight.fetch_max(1, Ordering::SeqCst);
        let id = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CycleId(id))
    }

    /// Whether results stamped `cycle` may still be applied.
    pub fn accepts(&self, cycle: CycleId) -> bool {
        !self.shared.is_stopped() && self.current() == Some(cycle)
    }

    /// `Fetching → Idle`. Returns whether the cycle's results may be applied.
    pub fn finish_cycle(&self, cycle: CycleId) -> bool {
        if self.current() != Some(cycle) {
            return false;
        }
        self.shared.in_flight.store(0, Ordering::SeqCst);
        !self.shared.is_stopped()
    }

    /// Stops scheduling. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    /// Runs cycles until stopped, then tears the target down and returns it.
    pub async fn run<T: PollTarget>(self, mut target: T) -> T {
        let interval = self.config.interval;
        info!(
            view = %self.name,
            interval_ms = interval.as_millis() as u64,
            "polling started"
        );

        loop {
            let cycle = match self.begin_cycle() {
                Ok(id) => id,
                Err(SchedulerError::Stopped) => break,
                Err(e) => {
                    // Only if a cycle was begun by hand before `run`.
                    warn!(view = %self.name, error = %e, "cycle not started");
                    break;
                }
            };

            let t0 = Instant::now();
            let fetched = tokio::select! {
                biased;
                _ = self.shared.stopped() => {
                    self.shared.in_flight.store(0, Ordering::SeqCst);
                    debug!(view = %self.name, %cycle, "abandoning in-flight cycle");
                    break;
                }
                fetched = target.fetch(cycle) => fetched,
            };
            let elapsed = t0.elapsed();

            if self.finish_cycle(cycle) {
                let status = target.apply(cycle, fetched);
                self.shared.completed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    view = %self.name,
                    %cycle,
                    duration_ms = elapsed.as_millis() as u64,
                    critical_failed = status.critical_failed,
                    non_critical_failures = status.non_critical_failures.len(),
                    "cycle completed"
                );
            } else {
                debug!(view = %self.name, %cycle, "discarding results of stale cycle");
            }

            if elapsed > interval {
                warn!(
                    view = %self.name,
                    duration_ms = elapsed.as_millis() as u64,
                    interval_ms = interval.as_millis() as u64,
                    "cycle exceeded poll interval"
                );
            }

            tokio::select! {
                biased;
                _ = self.shared.stopped() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        target.teardown();
        info!(
            view = %self.name,
            cycles = self.shared.completed.load(Ordering::SeqCst),
            "polling stopped"
        );
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Target whose fetch takes `fetch_time` and whose cycles alternate
    /// between success and critical failure when `flaky` is set.
    struct Recorder {
        fetch_time: Duration,
        hang: bool,
        flaky: bool,
        starts: Mutex<Vec<Instant>>,
        applied: Vec<CycleId>,
        torn_down: bool,
    }

    impl Recorder {
        fn new(fetch_time: Duration) -> Self {
            Self {
                fetch_time,
                hang: false,
                flaky: false,
                starts: Mutex::new(Vec::new()),
                applied: Vec::new(),
                torn_down: false,
            }
        }
    }

    #[async_trait]
    impl PollTarget for Recorder {
        type Fetched = Result<(), FetchError>;

        async fn fetch(&self, cycle: CycleId) -> Self::Fetched {
            self.starts.lock().unwrap().push(Instant::now());
            if self.hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.fetch_time).await;
            if self.flaky && cycle.get() % 2 == 0 {
                return Err(FetchError::Transport("connection refused".into()));
            }
            Ok(())
        }

        fn apply(&mut self, cycle: CycleId, fetched: Self::Fetched) -> CycleStatus {
            match fetched {
                Ok(()) => {
                    self.applied.push(cycle);
                    CycleStatus::ok(cycle)
                }
                Err(e) => CycleStatus::critical(cycle, e),
            }
        }

        fn teardown(&mut self) {
            self.torn_down = true;
        }
    }

    #[test]
    fn state_machine_transitions() {
        let s = PollScheduler::new("test", PollConfig::detail());
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.current(), None);

        let c1 = s.begin_cycle().unwrap();
        assert_eq!(s.state(), SchedulerState::Fetching);
        assert_eq!(s.begin_cycle(), Err(SchedulerError::CycleInFlight(c1)));
        assert!(s.accepts(c1));
        assert!(s.finish_cycle(c1));
        assert_eq!(s.state(), SchedulerState::Idle);

        let c2 = s.begin_cycle().unwrap();
        assert!(c2 > c1);
        assert!(!s.accepts(c1));
        assert!(!s.finish_cycle(c1));
        assert_eq!(s.state(), SchedulerState::Fetching);
        assert!(s.finish_cycle(c2));

        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.begin_cycle(), Err(SchedulerError::Stopped));
    }

    #[test]
    fn results_after_stop_are_rejected() {
        let s = PollScheduler::new("test", PollConfig::detail());
        let c = s.begin_cycle().unwrap();
        s.handle().stop();
        assert!(!s.accepts(c));
        assert!(!s.finish_cycle(c));
    }

    #[test]
    fn cadence_presets() {
        assert_eq!(PollConfig::detail().interval, Duration::from_secs(1));
        assert_eq!(PollConfig::overview().interval, Duration::from_secs(3));
        assert_eq!(PollConfig::default(), PollConfig::detail());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_stretches_cadence_without_overlap() {
        let sched = PollScheduler::new("slow", PollConfig::new(Duration::from_secs(1)));
        let handle = sched.handle();
        let task = tokio::spawn(sched.run(Recorder::new(Duration::from_millis(2500))));

        // Cycles start at 0s, 3.5s, 7s; the third resolves at 9.5s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.stop();
        let target = task.await.unwrap();

        assert_eq!(target.applied.len(), 3);
        assert_eq!(handle.max_in_flight(), 1);
        assert_eq!(handle.in_flight(), 0);
        assert!(target.torn_down);

        let starts = target.starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_millis(3500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn critical_failures_do_not_halt_polling() {
        let sched = PollScheduler::new("flaky", PollConfig::new(Duration::from_secs(1)));
        let handle = sched.handle();
        let mut target = Recorder::new(Duration::ZERO);
        target.flaky = true;
        let task = tokio::spawn(sched.run(target));

        // Cycles at 0..=5s.
        tokio::time::sleep(Duration::from_millis(5500)).await;
        handle.stop();
        let target = task.await.unwrap();

        assert_eq!(handle.cycles_started(), 6);
        assert_eq!(handle.cycles_completed(), 6);
        let applied: Vec<u64> = target.applied.iter().map(|c| c.get()).collect();
        assert_eq!(applied, vec![1, 3, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_hanging_fetch() {
        let sched = PollScheduler::new("hang", PollConfig::detail());
        let handle = sched.handle();
        let mut target = Recorder::new(Duration::ZERO);
        target.hang = true;
        let task = tokio::spawn(sched.run(target));

        tokio::time::sleep(Duration::from_secs(30)).await;
        // A fetch that never resolves blocks further cycles, nothing more.
        assert_eq!(handle.cycles_started(), 1);
        assert_eq!(handle.in_flight(), 1);

        handle.stop();
        let target = task.await.unwrap();
        assert!(target.applied.is_empty());
        assert!(target.torn_down);
        assert_eq!(handle.in_flight(), 0);
        assert_eq!(handle.cycles_completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_delay_ends_loop_promptly() {
        let sched = PollScheduler::new("idle", PollConfig::new(Duration::from_secs(60)));
        let handle = sched.handle();
        let task = tokio::spawn(sched.run(Recorder::new(Duration::ZERO)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let t0 = Instant::now();
        handle.stop();
        let target = task.await.unwrap();
        assert_eq!(t0.elapsed(), Duration::ZERO);
        assert_eq!(target.applied.len(), 1);
    }

    #[test]
    fn cycle_status_helpers() {
        let c = CycleId(4);
        assert!(CycleStatus::ok(c).is_clean());
        let crit = CycleStatus::critical(c, FetchError::Decode("bad json".into()));
        assert!(crit.critical_failed);
        assert!(!crit.is_clean());
        let mut partial = CycleStatus::ok(c);
        partial.non_critical_failures.insert(FetchKind::Auxiliary);
        assert!(!partial.is_clean());
        assert_eq!(c.to_string(), "#4");
    }

    #[test]
    fn failures_are_classified_by_kind() {
        let mut status = CycleStatus::ok(CycleId(1));
        status.record_failure(FetchKind::Snapshots, FetchError::Decode("bad".into()));
        status.record_failure(FetchKind::Auxiliary, FetchError::Transport("reset".into()));
        assert!(!status.critical_failed);
        assert_eq!(status.non_critical_failures.len(), 2);

        status.record_failure(FetchKind::Alerts, FetchError::Transport("first".into()));
        status.record_failure(FetchKind::Entities, FetchError::Transport("second".into()));
        assert!(status.critical_failed);
        assert_eq!(
            status.critical_error,
            Some(FetchError::Transport("first".into()))
        );
        assert!(!status.non_critical_failures.contains(&FetchKind::Alerts));
    }
}
