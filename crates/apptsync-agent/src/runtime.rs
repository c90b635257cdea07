//! Agent runtime orchestration.

use crate::config::{AgentConfig, StoreType};
use crate::persistence::SqliteCursorStore;
use anyhow::{Context, Result};
use apptsync_adapter_athena::{AthenaClient, AthenaClientConfig};
use apptsync_adapter_sink::{HttpSink, SinkConfig};
use apptsync_core::{CredentialCache, CursorStore, PollScheduler, PollWorker};
use std::future::Future;
use std::io;
use std::sync::Arc;

type Scheduler = PollScheduler<AthenaClient, AthenaClient, HttpSink>;

/// The main agent runtime: one poll scheduler per practice.
pub struct Agent {
    config: AgentConfig,
    store: Option<Arc<dyn CursorStore>>,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if the cursor database cannot be opened.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let store: Option<Arc<dyn CursorStore>> = match config.persistence.store_type {
            StoreType::Sqlite => {
                let store = SqliteCursorStore::open(&config.persistence.db_path).with_context(
                    || {
                        format!(
                            "Failed to open SQLite database {}",
                            config.persistence.db_path.display()
                        )
                    },
                )?;
                tracing::info!(path = %config.persistence.db_path.display(), "Opened cursor store");
                Some(Arc::new(store))
            }
            StoreType::Memory => {
                tracing::warn!("Cursors are kept in memory only and reset on restart");
                None
            }
        };

        Ok(Self { config, store })
    }

    fn build_schedulers(&self) -> Result<Vec<Scheduler>> {
        let sink = HttpSink::new(SinkConfig {
            url: self.config.sink_url.clone(),
            timeout: self.config.request_timeout,
        })
        .context("Failed to create sink client")?;

        let mut schedulers = Vec::with_capacity(self.config.athena.practice_ids.len());
        for practice_id in &self.config.athena.practice_ids {
            let client = AthenaClient::new(AthenaClientConfig {
                base_url: self.config.athena.base_url.clone(),
                practice_id: practice_id.clone(),
                client_id: self.config.athena.client_id.clone(),
                client_secret: self.config.athena.client_secret.clone(),
                scope: self.config.athena.scope.clone(),
                timeout: self.config.request_timeout,
            })
            .with_context(|| format!("Failed to create API client for practice {practice_id}"))?;

            let credentials = CredentialCache::new(client.clone(), self.config.credential_policy);
            let mut worker = PollWorker::new(practice_id.clone(), credentials, client, sink.clone())
                .with_failure_alert_threshold(self.config.failure_alert_threshold);
            if let Some(store) = &self.store {
                worker = worker
                    .with_store(Arc::clone(store))
                    .with_context(|| format!("Failed to load cursor for practice {practice_id}"))?;
            }

            schedulers.push(PollScheduler::new(worker, self.config.poll_interval));
        }

        Ok(schedulers)
    }

    /// Run until Ctrl+C, then stop every poller gracefully.
    ///
    /// # Errors
    ///
    /// Returns error if any poller fails to start or the shutdown signal
    /// cannot be awaited.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            practices = ?self.config.athena.practice_ids,
            interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Starting agent runtime"
        );

        let mut schedulers = self.build_schedulers()?;
        start_all(&mut schedulers).await?;

        tracing::info!("Agent running, press Ctrl+C to stop");
        supervise(&mut schedulers, tokio::signal::ctrl_c()).await?;

        tracing::info!("Agent stopped");
        Ok(())
    }
}

async fn start_all(schedulers: &mut [Scheduler]) -> Result<()> {
    for index in 0..schedulers.len() {
        if let Err(e) = schedulers[index].start().await {
            let feed = schedulers[index].feed_id().to_string();
            for started in &mut schedulers[..index] {
                started.stop().await;
            }
            return Err(e).with_context(|| format!("Failed to start poller for practice {feed}"));
        }
    }
    Ok(())
}

/// Wait for `shutdown`, then stop every scheduler, whether the wait
/// succeeded or not.
async fn supervise<F>(schedulers: &mut [Scheduler], shutdown: F) -> Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    let signal = shutdown.await;
    match &signal {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal, stopping"),
    }

    for scheduler in schedulers.iter_mut() {
        scheduler.stop().await;
        let stats = scheduler.stats();
        tracing::info!(
            feed = %scheduler.feed_id(),
            polls = stats.poll_count,
            events_processed = stats.total_events_processed,
            cursor = %stats.cursor,
            last_poll = ?stats.last_poll_time,
            "Final poller stats"
        );
    }

    signal.context("Failed to listen for shutdown signal")
}
