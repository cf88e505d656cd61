//! Background eviction of idle rate limit state.
//!
//! Memory held by a store is bounded by the number of *active* keys only if
//! idle keys are eventually dropped. The janitor scans a snapshot on a fixed
//! interval and removes entries that can no longer influence a decision.

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::rate_limit::{RateLimitState, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries inspected.
    pub scanned: usize,
    /// Entries evicted.
    pub removed: usize,
}

/// Periodic sweeper for a [`StateStore`].
#[derive(Debug, Clone)]
pub struct Janitor {
    store: Arc<dyn StateStore>,
    grace: Duration,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Janitor {
    /// Evict entries idle for longer than `grace` (see
    /// [`RateLimitState::is_expired`]).
    pub fn new(store: Arc<dyn StateStore>, grace: Duration) -> Self {
        Self {
            store,
            grace,
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Time between sweeps of a spawned janitor. Zero is raised to 1ms.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now.
    ///
    /// Each candidate is re-checked under its key's lock before removal, so an
    /// entry touched by a request after the snapshot was taken survives.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX);
        let now = self.clock.now_millis();
        let snapshot = self.store.snapshot().await?;
        let mut report = SweepReport { scanned: snapshot.len(), removed: 0 };

        let still_expired = |state: &RateLimitState| state.is_expired(now, grace_ms);
        for (key, state) in snapshot {
            if !state.is_expired(now, grace_ms) {
                continue;
            }
            if self.store.delete_if(&key, &still_expired).await? {
                report.removed += 1;
            }
        }

        tracing::debug!(scanned = report.scanned, removed = report.removed, "janitor sweep");
        Ok(report)
    }

    /// Sweep every `interval` on the current tokio runtime until the handle is
    /// shut down or dropped. The first sweep runs one interval after spawning.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub fn spawn(self) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep().await {
                            tracing::warn!(error = %err, "janitor sweep failed");
                        }
                    }
                }
            }
            tracing::debug!("janitor stopped");
        });
        JanitorHandle { shutdown: Some(shutdown_tx), task: Some(task) }
    }
}

/// Owner of a spawned janitor task. Dropping it stops the task.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl JanitorHandle {
    /// Stop the janitor and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        match &self.task {
            Some(task) => task.is_finished(),
            None => true,
        }
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
