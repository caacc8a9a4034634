//! Periodic sweeps over every registered domain.
//!
//! A sweep lists all domains, evaluates them with bounded parallelism and
//! notifies each owner as soon as one of their domains turns out to have
//! problems. At most one sweep runs at a time; a tick that arrives while a
//! sweep is still in flight is skipped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::evaluator::{DomainEvaluator, Evaluation};
use crate::model::DomainRecord;
use crate::notify::Notifier;
use crate::store::{DomainStore, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub started_at: DateTime<Utc>,
    /// Domains listed at the start of the sweep.
    pub domains: usize,
    /// Domains whose evaluation finished, failed ones included.
    pub evaluated: usize,
    pub failed: usize,
    /// Domains left for the next tick because their owner's settings could
    /// not be loaded.
    pub skipped: usize,
    /// Domains the notifier was called for.
    pub notified: usize,
    pub timed_out: bool,
    pub duration_ms: u64,
}

#[derive(Default)]
struct SweepCounters {
    evaluated: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    notified: AtomicUsize,
}

/// Clears the running flag when the sweep that set it ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    domains: Arc<dyn DomainStore>,
    settings: Arc<dyn SettingsStore>,
    evaluator: Arc<DomainEvaluator>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        domains: Arc<dyn DomainStore>,
        settings: Arc<dyn SettingsStore>,
        evaluator: Arc<DomainEvaluator>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            domains,
            settings,
            evaluator,
            notifier,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    fn claim(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(self.running.clone()))
    }

    /// Runs one sweep to completion on the current task.
    ///
    /// Returns `None` without doing anything if another sweep is running.
    pub async fn run_sweep(&self) -> Option<SweepSummary> {
        let guard = self.claim()?;
        let summary = self.sweep().await;
        drop(guard);
        Some(summary)
    }

    /// Starts a sweep on a background task.
    ///
    /// Returns `None` if a sweep is already running. The running state is
    /// claimed before this returns, so two back-to-back calls never both
    /// start a sweep.
    pub fn try_start_sweep(self: &Arc<Self>) -> Option<JoinHandle<SweepSummary>> {
        let guard = self.claim()?;
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            scheduler.sweep().await
        }))
    }

    /// Ticks until `shutdown` resolves. The first sweep starts immediately.
    ///
    /// An in-flight sweep is allowed to finish before this returns; it is
    /// bounded by the sweep timeout.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            concurrency = self.config.concurrency,
            "Starting scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut in_flight: Option<JoinHandle<SweepSummary>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|h| h.is_finished()) {
                        if let Some(handle) = in_flight.take() {
                            reap(handle).await;
                        }
                    }
                    match self.try_start_sweep() {
                        Some(handle) => in_flight = Some(handle),
                        None => warn!("Previous sweep still running, skipping tick"),
                    }
                }
            }
        }

        info!("Scheduler shutting down");
        if let Some(handle) = in_flight {
            reap(handle).await;
        }
    }

    async fn sweep(&self) -> SweepSummary {
        let started_at = Utc::now();
        let start = Instant::now();

        let domains = match self.domains.list_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                error!(error = %e, "Failed to list domains, skipping sweep");
                Vec::new()
            }
        };
        let total = domains.len();
        info!(domains = total, "Sweep started");

        let counters = SweepCounters::default();
        let timed_out = timeout(self.config.sweep_timeout, self.sweep_domains(domains, &counters))
            .await
            .is_err();

        let summary = SweepSummary {
            started_at,
            domains: total,
            evaluated: counters.evaluated.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            notified: counters.notified.load(Ordering::Relaxed),
            timed_out,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if timed_out {
            warn!(
                evaluated = summary.evaluated,
                domains = summary.domains,
                timeout_secs = self.config.sweep_timeout.as_secs_f64(),
                "Sweep timed out, remaining domains abandoned"
            );
        } else {
            info!(
                evaluated = summary.evaluated,
                failed = summary.failed,
                skipped = summary.skipped,
                notified = summary.notified,
                duration_ms = summary.duration_ms,
                "Sweep finished"
            );
        }
        summary
    }

    async fn sweep_domains(&self, domains: Vec<DomainRecord>, counters: &SweepCounters) {
        stream::iter(domains)
            .map(|domain| async move {
                let Some(evaluation) = self.evaluate(&domain).await else {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                };

                counters.evaluated.fetch_add(1, Ordering::Relaxed);
                if evaluation.is_failed() {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }

                let problems = evaluation.into_problems(&domain.name);
                if problems.is_empty() {
                    debug!(domain = %domain.name, "No problems");
                    return;
                }

                self.notifier
                    .notify(domain.owner_id, &domain.name, &problems)
                    .await;
                counters.notified.fetch_add(1, Ordering::Relaxed);
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .for_each(|_| async {})
            .await;
    }

    /// `None` when the owner's settings are unavailable; the domain is
    /// skipped this tick and the owner is not told.
    async fn evaluate(&self, domain: &DomainRecord) -> Option<Evaluation> {
        match self.settings.get_or_create_settings(domain.owner_id).await {
            Ok(settings) => Some(self.evaluator.evaluate_guarded(domain, &settings).await),
            Err(e) => {
                error!(
                    domain = %domain.name,
                    owner_id = domain.owner_id,
                    error = %e,
                    "Failed to load settings, skipping domain"
                );
                None
            }
        }
    }
}

async fn reap(handle: JoinHandle<SweepSummary>) {
    if let Err(e) = handle.await {
        error!(error = %e, "Sweep task failed");
    }
}
