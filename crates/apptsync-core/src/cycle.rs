//! One poll cycle: credential, fetch, normalize, forward, advance.
//!
//! The worker owns the credential cache and the cursor. It is driven by
//! [`PollScheduler`](crate::scheduler::PollScheduler), which guarantees that
//! at most one cycle runs at a time, so neither needs locking.

use crate::credential::CredentialCache;
use crate::cursor::Cursor;
use crate::error::{CycleError, StartError, StoreError, UpstreamError};
use crate::event::ChangePage;
use crate::normalize::normalize;
use crate::ports::{ChangeSource, CredentialProvider, CursorStore, EventSink};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default number of consecutive failed cycles before failures are logged at
/// error level.
pub const DEFAULT_FAILURE_ALERT_THRESHOLD: u32 = 5;

/// Outcome of one cycle, for logging and metrics.
#[derive(Debug, Clone)]
pub struct PollCycleResult {
    /// 1-based poll counter
    pub poll_number: u64,
    /// Raw records returned by the upstream
    pub events_seen: usize,
    /// Normalized events accepted by the sink
    pub events_forwarded: usize,
    /// Whether the cursor moved
    pub cursor_advanced: bool,
    /// Why the cycle ended early, if it did
    pub error: Option<CycleError>,
    /// Wall time spent in the cycle
    pub elapsed: Duration,
}

impl PollCycleResult {
    fn new(poll_number: u64) -> Self {
        Self {
            poll_number,
            events_seen: 0,
            events_forwarded: 0,
            cursor_advanced: false,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether the cycle completed without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Queryable snapshot of a feed's poller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Cycles started
    pub poll_count: u64,
    /// Start time of the latest cycle
    pub last_poll_time: Option<DateTime<Utc>>,
    /// Events accepted by the sink since startup
    pub total_events_processed: u64,
    /// Whether the scheduler is running
    pub running: bool,
    /// Current cursor
    pub cursor: Cursor,
    /// Failed cycles since the last successful one
    pub consecutive_failures: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

/// Executes poll cycles for a single feed (one practice).
pub struct PollWorker<P, S, K> {
    feed_id: String,
    credentials: CredentialCache<P>,
    source: S,
    sink: K,
    store: Option<Arc<dyn CursorStore>>,
    cursor: Cursor,
    failure_alert_threshold: u32,
    stats: Arc<Mutex<PollerStats>>,
}

impl<P, S, K> PollWorker<P, S, K>
where
    P: CredentialProvider,
    S: ChangeSource,
    K: EventSink,
{
    /// Create a worker starting from `Cursor::None`.
    #[must_use]
    pub fn new(
        feed_id: impl Into<String>,
        credentials: CredentialCache<P>,
        source: S,
        sink: K,
    ) -> Self {
        Self {
            feed_id: feed_id.into(),
            credentials,
            source,
            sink,
            store: None,
            cursor: Cursor::None,
            failure_alert_threshold: DEFAULT_FAILURE_ALERT_THRESHOLD,
            stats: Arc::new(Mutex::new(PollerStats::default())),
        }
    }

    /// Persist cursor advances to `store`, resuming from the cursor it holds.
    ///
    /// # Errors
    ///
    /// Returns error if the stored cursor cannot be read.
    pub fn with_store(mut self, store: Arc<dyn CursorStore>) -> Result<Self, StoreError> {
        let cursor = store.load(&self.feed_id)?;
        tracing::info!(feed = %self.feed_id, %cursor, "Loaded stored cursor");
        self.store = Some(store);
        Ok(self.with_cursor(cursor))
    }

    /// Start from an explicit cursor.
    #[must_use]
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.lock_stats().cursor = cursor.clone();
        self.cursor = cursor;
        self
    }

    /// Log failures at error level once this many cycles in a row failed.
    #[must_use]
    pub fn with_failure_alert_threshold(mut self, threshold: u32) -> Self {
        self.failure_alert_threshold = threshold.max(1);
        self
    }

    /// Feed identifier (practice id).
    #[must_use]
    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    /// Current cursor.
    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Snapshot of the stats.
    #[must_use]
    pub fn stats(&self) -> PollerStats {
        self.lock_stats().clone()
    }

    pub(crate) fn stats_handle(&self) -> Arc<Mutex<PollerStats>> {
        Arc::clone(&self.stats)
    }

    /// Make sure the upstream records changes for this feed.
    ///
    /// Obtains the initial credential, then creates an unfiltered subscription
    /// if none is active.
    ///
    /// # Errors
    ///
    /// Returns error if the credential or subscription calls fail.
    pub async fn bootstrap(&mut self) -> Result<(), StartError> {
        let credential = self.credentials.get_valid_credential().await?;
        tracing::info!(
            feed = %self.feed_id,
            expires_at = %credential.expires_at(),
            "Obtained initial credential"
        );

        let status = self.source.subscriptions(&credential).await?;
        if status.is_active() {
            tracing::info!(
                feed = %self.feed_id,
                status = ?status.status,
                events = status.event_names.len(),
                "Change subscription active"
            );
        } else {
            tracing::info!(feed = %self.feed_id, "No active subscription, creating one");
            self.source.subscribe(&credential, None).await?;
            tracing::info!(feed = %self.feed_id, "Created change subscription");
        }

        Ok(())
    }

    /// Run one cycle. Never fails: errors are recorded in the result.
    pub async fn run_cycle(&mut self) -> PollCycleResult {
        self.run_cycle_at(Utc::now()).await
    }

    /// Same as [`run_cycle`](Self::run_cycle) with an explicit clock reading,
    /// used for the credential expiry check and the recorded poll time.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> PollCycleResult {
        let started = Instant::now();
        let poll_number = {
            let mut stats = self.lock_stats();
            stats.poll_count += 1;
            stats.last_poll_time = Some(now);
            stats.poll_count
        };

        tracing::info!(
            feed = %self.feed_id,
            poll = poll_number,
            cursor = %self.cursor,
            "Poll started"
        );

        let mut result = PollCycleResult::new(poll_number);
        if let Err(e) = self.execute(now, &mut result).await {
            result.error = Some(e);
        }
        result.elapsed = started.elapsed();

        self.record(&result);
        result
    }

    async fn execute(
        &mut self,
        now: DateTime<Utc>,
        result: &mut PollCycleResult,
    ) -> Result<(), CycleError> {
        let credential = self.credentials.get_valid_credential_at(now).await?;

        let page = match self.source.fetch_changes(&credential, &self.cursor).await {
            Ok(page) => page,
            Err(e) => {
                if matches!(e, UpstreamError::Status { status: 401, .. }) {
                    self.credentials.invalidate().await;
                }
                return Err(e.into());
            }
        };

        result.events_seen = page.records.len();
        if page.is_empty() {
            tracing::debug!(feed = %self.feed_id, "No changes");
            return Ok(());
        }

        let batch = normalize(&page.records);
        tracing::info!(
            feed = %self.feed_id,
            seen = page.records.len(),
            valid = batch.len(),
            total_count = ?page.total_count,
            "Fetched changes"
        );

        if !batch.is_empty() {
            self.sink.forward(&batch).await?;
            result.events_forwarded = batch.len();
        }

        result.cursor_advanced = self.advance(&page);
        Ok(())
    }

    fn advance(&mut self, page: &ChangePage) -> bool {
        let Some(event_id) = page.last_event_id() else {
            tracing::warn!(
                feed = %self.feed_id,
                cursor = %self.cursor,
                "Page carried no event id, cursor unchanged"
            );
            return false;
        };

        let next = Cursor::At(event_id.to_string());
        if next == self.cursor {
            return false;
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.feed_id, &next) {
                tracing::warn!(feed = %self.feed_id, error = %e, "Failed to persist cursor");
            }
        }

        tracing::info!(feed = %self.feed_id, from = %self.cursor, to = %next, "Cursor advanced");
        self.cursor = next;
        true
    }

    fn record(&self, result: &PollCycleResult) {
        let mut stats = self.lock_stats();
        stats.cursor = self.cursor.clone();
        stats.total_events_processed += u64::try_from(result.events_forwarded).unwrap_or(u64::MAX);

        let elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX);
        match &result.error {
            None => {
                stats.consecutive_failures = 0;
                tracing::info!(
                    feed = %self.feed_id,
                    poll = result.poll_number,
                    seen = result.events_seen,
                    forwarded = result.events_forwarded,
                    cursor_advanced = result.cursor_advanced,
                    total_processed = stats.total_events_processed,
                    elapsed_ms,
                    "Poll completed"
                );
            }
            Some(e) => {
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(e.to_string());
                if stats.consecutive_failures >= self.failure_alert_threshold {
                    tracing::error!(
                        feed = %self.feed_id,
                        poll = result.poll_number,
                        cursor = %self.cursor,
                        consecutive_failures = stats.consecutive_failures,
                        error = %e,
                        elapsed_ms,
                        "Poll failing repeatedly"
                    );
                } else {
                    tracing::warn!(
                        feed = %self.feed_id,
                        poll = result.poll_number,
                        cursor = %self.cursor,
                        error = %e,
                        elapsed_ms,
                        "Poll failed, will retry next tick"
                    );
                }
            }
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, PollerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
