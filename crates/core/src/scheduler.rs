//! Daily trigger for the advice run.
//!
//! At most one run is in flight at a time. A trigger that arrives while a run is
//! executing is dropped, never queued. After every run, successful or not, the next
//! fire time is recomputed and the timer re-armed.

use crate::advice::RunReport;
use crate::config::Settings;
use crate::time::daily::{next_fire_time, within_grace_window};
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

#[async_trait::async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    async fn run(&self) -> anyhow::Result<RunReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Local wall-clock hour, 0..=23.
    pub hour: u32,
    /// A start this long after `hour` fires right away instead of waiting a day.
    pub grace: chrono::Duration,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            hour: 10,
            grace: chrono::Duration::minutes(5),
        }
    }
}

impl ScheduleOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            hour: settings.schedule_hour,
            grace: chrono::Duration::minutes(settings.grace_minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchedulerStatus {
    pub armed: bool,
    pub running: bool,
    pub next_fire_time: Option<DateTime<Local>>,
    pub minutes_until_next: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
enum Cadence {
    Daily,
    Every(Duration),
}

#[derive(Default)]
struct SchedulerState {
    next_fire_time: Option<DateTime<Local>>,
    last_run_on: Option<NaiveDate>,
    /// Bumped on every start/stop so a superseded timer task stops re-arming.
    generation: u64,
    stop: Option<watch::Sender<bool>>,
}

struct Inner {
    job: Arc<dyn ScheduledJob>,
    options: ScheduleOptions,
    executing: AtomicBool,
    state: Mutex<SchedulerState>,
}

/// Cheap to clone; clones share the same timer and execution guard.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, options: ScheduleOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                options,
                executing: AtomicBool::new(false),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Arms the daily trigger, replacing any existing one. Fires immediately when called
    /// inside the grace window and nothing has run yet today.
    pub fn start(&self) -> anyhow::Result<()> {
        let now = Local::now();
        let options = self.inner.options;
        let already_ran = self.inner.state().last_run_on == Some(now.date_naive());
        let fire_now = !already_ran && within_grace_window(&now, options.hour, options.grace)?;
        self.spawn(Cadence::Daily, fire_now)
    }

    /// Accelerated cadence for verification: runs now, then every `every`.
    pub fn start_with_interval(&self, every: Duration) -> anyhow::Result<()> {
        anyhow::ensure!(!every.is_zero(), "scheduler interval must be positive");
        self.spawn(Cadence::Every(every), true)
    }

    /// Disarms the timer. A run already in flight is allowed to finish.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        state.generation += 1;
        state.next_fire_time = None;
        if let Some(stop) = state.stop.take() {
            let _ = stop.send(true);
            tracing::info!("scheduler stopped");
        }
    }

    /// Out-of-band run sharing the single-flight guard. `Ok(None)` when a run was
    /// already executing.
    pub async fn execute_now(&self) -> anyhow::Result<Option<RunReport>> {
        self.inner.fire().await.transpose()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state();
        let minutes_until_next = state
            .next_fire_time
            .map(|next| (next - Local::now()).num_minutes().max(0));
        SchedulerStatus {
            armed: state.stop.is_some(),
            running: self.inner.executing.load(Ordering::SeqCst),
            next_fire_time: state.next_fire_time,
            minutes_until_next,
        }
    }

    fn spawn(&self, cadence: Cadence, fire_first: bool) -> anyhow::Result<()> {
        self.stop();

        let (stop_tx, stop_rx) = watch::channel(false);
        let generation = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.stop = Some(stop_tx);
            state.generation
        };

        let first_wait = if fire_first {
            self.inner.state().next_fire_time = Some(Local::now());
            Duration::ZERO
        } else {
            match self.inner.arm(cadence, generation)? {
                Some(wait) => wait,
                None => return Ok(()),
            }
        };

        tracing::info!(?cadence, fire_first, "scheduler armed");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.timer_loop(cadence, generation, first_wait, stop_rx).await;
        });
        Ok(())
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn timer_loop(
        &self,
        cadence: Cadence,
        generation: u64,
        mut wait: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }

            // Outcome is logged inside `fire`; a failed run still re-arms.
            let _ = self.fire().await;

            wait = match self.arm(cadence, generation) {
                Ok(Some(wait)) => wait,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "failed to compute next fire time; scheduler halted");
                    let mut state = self.state();
                    if state.generation == generation {
                        state.stop = None;
                        state.next_fire_time = None;
                    }
                    break;
                }
            };
        }
    }

    /// Stores the next fire time. `None` when this timer has been superseded.
    fn arm(&self, cadence: Cadence, generation: u64) -> anyhow::Result<Option<Duration>> {
        let now = Local::now();
        let (next, wait) = match cadence {
            Cadence::Daily => {
                let next = next_fire_time(&now, self.options.hour)?;
                (next, (next - now).to_std().unwrap_or(Duration::ZERO))
            }
            Cadence::Every(every) => (now + chrono::Duration::from_std(every)?, every),
        };

        let mut state = self.state();
        if state.generation != generation {
            return Ok(None);
        }
        state.next_fire_time = Some(next);
        tracing::info!(next_fire_time = %next, "next advice run scheduled");
        Ok(Some(wait))
    }

    async fn fire(&self) -> Option<anyhow::Result<RunReport>> {
        let Some(_guard) = ExecutionGuard::acquire(&self.executing) else {
            tracing::warn!("advice run already in progress; trigger dropped");
            return None;
        };

        let result = self.job.run().await;
        self.state().last_run_on = Some(Local::now().date_naive());

        match &result {
            Ok(report) => tracing::info!(
                run_id = %report.run_id,
                succeeded = report.success_count(),
                total = report.results.len(),
                "scheduled advice run finished"
            ),
            Err(err) => tracing::error!(error = %format!("{err:#}"), "advice run aborted"),
        }
        Some(result)
    }
}

/// Holds the single-flight flag for the lifetime of one run.
struct ExecutionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ExecutionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{FailureKind, ProviderFailure, ProviderRunResult};
    use chrono::Timelike;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeeds,
        EveryProviderFails,
        Aborts,
    }

    struct CountingJob {
        runs: AtomicUsize,
        outcome: Outcome,
        takes: Duration,
    }

    impl CountingJob {
        fn new(outcome: Outcome, takes: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                outcome,
                takes,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    fn transport_failure(provider: &str) -> ProviderRunResult {
        ProviderRunResult {
            provider_name: provider.to_string(),
            advice: None,
            error: Some(ProviderFailure {
                kind: FailureKind::Transport,
                message: "connection refused".to_string(),
                partial_advice: None,
            }),
            ledger: None,
        }
    }

    #[async_trait::async_trait]
    impl ScheduledJob for CountingJob {
        async fn run(&self) -> anyhow::Result<RunReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.takes.is_zero() {
                tokio::time::sleep(self.takes).await;
            }
            let results = match self.outcome {
                Outcome::Succeeds => Vec::new(),
                Outcome::EveryProviderFails => {
                    vec![transport_failure("gpt"), transport_failure("deepseek")]
                }
                Outcome::Aborts => anyhow::bail!("no usable AI providers configured"),
            };
            Ok(RunReport {
                run_id: uuid::Uuid::new_v4(),
                started_at: Local::now(),
                finished_at: Local::now(),
                results,
            })
        }
    }

    fn scheduler(job: Arc<CountingJob>) -> Scheduler {
        Scheduler::new(job, ScheduleOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_after_successful_runs() {
        let job = CountingJob::new(Outcome::Succeeds, Duration::ZERO);
        let scheduler = scheduler(job.clone());

        scheduler.start_with_interval(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(job.runs(), 3);
        let status = scheduler.status();
        assert!(status.armed);
        assert!(status.next_fire_time.is_some());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_after_failed_runs() {
        let job = CountingJob::new(Outcome::Aborts, Duration::ZERO);
        let scheduler = scheduler(job.clone());

        scheduler.start_with_interval(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(job.runs(), 3);
        assert!(scheduler.status().armed);
        assert!(scheduler.status().next_fire_time.is_some());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_when_every_provider_fails() {
        let job = CountingJob::new(Outcome::EveryProviderFails, Duration::ZERO);
        let scheduler = scheduler(job.clone());

        let report = scheduler.execute_now().await.unwrap().unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.success_count(), 0);

        scheduler.start_with_interval(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(job.runs(), 4);
        let status = scheduler.status();
        assert!(status.armed);
        assert!(!status.running);
        assert!(status.next_fire_time.is_some());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn daily_cadence_fires_inside_grace_and_rearms_for_tomorrow() {
        let job = CountingJob::new(Outcome::EveryProviderFails, Duration::ZERO);
        // Today's fire hour has already passed but the window still covers it.
        let hour = Local::now().hour();
        let scheduler = Scheduler::new(
            job.clone(),
            ScheduleOptions {
                hour,
                grace: chrono::Duration::hours(24),
            },
        );

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);

        let status = scheduler.status();
        assert!(status.armed);
        let next = status.next_fire_time.unwrap();
        assert!(next > Local::now());
        assert_eq!(next.hour(), hour);
        assert_eq!(next.date_naive(), Local::now().date_naive().succ_opt().unwrap());

        // Restarting the same day must not fire a second time.
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);

        tokio::time::sleep(Duration::from_secs(25 * 60 * 60)).await;
        assert_eq!(job.runs(), 2);
        let status = scheduler.status();
        assert!(status.armed);
        assert!(status.next_fire_time.unwrap() > Local::now());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_triggers_are_dropped() {
        let job = CountingJob::new(Outcome::Succeeds, Duration::from_secs(10));
        let scheduler = scheduler(job.clone());

        let (first, second) = tokio::join!(scheduler.execute_now(), scheduler.execute_now());
        let outcomes = [first.unwrap().is_some(), second.unwrap().is_some()];

        assert_eq!(outcomes.iter().filter(|ran| **ran).count(), 1);
        assert_eq!(job.runs(), 1);
        assert!(!scheduler.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_now_surfaces_fatal_errors() {
        let job = CountingJob::new(Outcome::Aborts, Duration::ZERO);
        let err = scheduler(job).execute_now().await.unwrap_err();
        assert!(err.to_string().contains("no usable AI providers"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_disarms_the_timer() {
        let job = CountingJob::new(Outcome::Succeeds, Duration::ZERO);
        let scheduler = scheduler(job.clone());

        scheduler.start_with_interval(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(job.runs(), 1);
        let status = scheduler.status();
        assert!(!status.armed);
        assert_eq!(status.next_fire_time, None);
        assert_eq!(status.minutes_until_next, None);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_start_waits_for_the_next_fire_time() {
        let job = CountingJob::new(Outcome::Succeeds, Duration::ZERO);
        // Twelve hours away from now, so never inside the grace window.
        let hour = (Local::now().hour() + 12) % 24;
        let scheduler = Scheduler::new(
            job.clone(),
            ScheduleOptions {
                hour,
                grace: chrono::Duration::minutes(5),
            },
        );

        scheduler.start().unwrap();
        tokio::task::yield_now().await;

        let status = scheduler.status();
        assert!(status.armed);
        assert!(!status.running);
        let next = status.next_fire_time.unwrap();
        assert!(next > Local::now());
        assert_eq!(next.hour(), hour);
        assert!(status.minutes_until_next.unwrap() <= 24 * 60);
        assert_eq!(job.runs(), 0);

        scheduler.stop();
        assert!(!scheduler.status().armed);
    }
}
