//! Timer-driven lifecycle around a [`PollWorker`].
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Stopped
//!            ^                                  |
//!            +----------------------------------+
//! ```
//!
//! The worker lives on a single tokio task while running. Ticks that fire
//! while a cycle is still in progress are skipped rather than queued, and a
//! stop request lets the in-flight cycle finish before the task exits.

use crate::cycle::{PollWorker, PollerStats};
use crate::error::StartError;
use crate::ports::{ChangeSource, CredentialProvider, EventSink};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle state of a [`PollScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, never started
    Idle,
    /// Bootstrapping credential and subscription
    Starting,
    /// Poll task is running
    Running,
    /// Waiting for the in-flight cycle to finish
    Stopping,
    /// Poll task has exited
    Stopped,
}

/// Runs a worker's cycles on a fixed period.
pub struct PollScheduler<P, S, K> {
    feed_id: String,
    interval: Duration,
    state: SchedulerState,
    worker: Option<PollWorker<P, S, K>>,
    task: Option<JoinHandle<PollWorker<P, S, K>>>,
    shutdown: Option<oneshot::Sender<()>>,
    stats: Arc<Mutex<PollerStats>>,
}

impl<P, S, K> PollScheduler<P, S, K>
where
    P: CredentialProvider + 'static,
    S: ChangeSource + 'static,
    K: EventSink + 'static,
{
    /// Create an idle scheduler. A zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(worker: PollWorker<P, S, K>, interval: Duration) -> Self {
        Self {
            feed_id: worker.feed_id().to_string(),
            interval: interval.max(Duration::from_millis(1)),
            state: SchedulerState::Idle,
            stats: worker.stats_handle(),
            worker: Some(worker),
            task: None,
            shutdown: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Poll period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Feed identifier.
    #[must_use]
    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    /// Snapshot of poll count, last poll time, totals and running state.
    #[must_use]
    pub fn stats(&self) -> PollerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bootstrap the subscription and start polling.
    ///
    /// Calling this while already running is a no-op. The first cycle runs one
    /// interval after a successful start.
    ///
    /// # Errors
    ///
    /// Returns error if bootstrap fails; the scheduler stays startable.
    pub async fn start(&mut self) -> Result<(), StartError> {
        match self.state {
            SchedulerState::Running | SchedulerState::Starting => {
                tracing::info!(feed = %self.feed_id, "Poller already running");
                return Ok(());
            }
            SchedulerState::Stopping => return Err(StartError::Stopping),
            SchedulerState::Idle | SchedulerState::Stopped => {}
        }

        let Some(mut worker) = self.worker.take() else {
            return Err(StartError::WorkerLost(format!(
                "feed {} has no worker to start",
                self.feed_id
            )));
        };

        let previous = self.state;
        self.state = SchedulerState::Starting;

        if let Err(e) = worker.bootstrap().await {
            tracing::error!(feed = %self.feed_id, error = %e, "Failed to start poller");
            self.worker = Some(worker);
            self.state = previous;
            return Err(e);
        }

        let (tx, rx) = oneshot::channel();
        self.task = Some(tokio::spawn(poll_loop(worker, self.interval, rx)));
        self.shutdown = Some(tx);
        self.state = SchedulerState::Running;
        self.set_running(true);

        tracing::info!(
            feed = %self.feed_id,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Started poller"
        );
        Ok(())
    }

    /// Stop polling, waiting for an in-flight cycle to finish.
    ///
    /// Safe to call repeatedly. If a previous call was dropped while waiting,
    /// the next call resumes the wait; the task handle is only released once
    /// the poll task has been joined.
    pub async fn stop(&mut self) {
        match self.state {
            SchedulerState::Running => {
                self.state = SchedulerState::Stopping;
                if let Some(tx) = self.shutdown.take() {
                    // The task may already be gone; joining below reports that.
                    let _ = tx.send(());
                }
            }
            SchedulerState::Stopping => {
                tracing::debug!(feed = %self.feed_id, "Resuming interrupted stop");
            }
            SchedulerState::Idle | SchedulerState::Starting | SchedulerState::Stopped => {
                tracing::debug!(feed = %self.feed_id, state = ?self.state, "Poller not running");
                return;
            }
        }

        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.task = None;
            match joined {
                Ok(worker) => self.worker = Some(worker),
                Err(e) => {
                    tracing::error!(feed = %self.feed_id, error = %e, "Poll task ended abnormally");
                }
            }
        }

        self.state = SchedulerState::Stopped;
        self.set_running(false);
        tracing::info!(feed = %self.feed_id, "Stopped poller");
    }

    fn set_running(&self, running: bool) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running = running;
    }
}

async fn poll_loop<P, S, K>(
    mut worker: PollWorker<P, S, K>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> PollWorker<P, S, K>
where
    P: CredentialProvider,
    S: ChangeSource,
    K: EventSink,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let result = worker.run_cycle().await;
                if result.elapsed > period {
                    tracing::warn!(
                        feed = %worker.feed_id(),
                        poll = result.poll_number,
                        elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
                        "Cycle overran the poll interval, skipping missed ticks"
                    );
                }
            }
        }
    }

    worker
}
