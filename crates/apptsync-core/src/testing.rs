//! In-memory fakes for the ports.

use crate::credential::{Credential, CredentialCache, CredentialPolicy};
use crate::cursor::Cursor;
use crate::cycle::PollWorker;
use crate::error::{CredentialError, ForwardError, StoreError, UpstreamError};
use crate::event::{ChangeEvent, ChangePage, RawChangeRecord, SubscriptionStatus};
use crate::ports::{ChangeSource, CredentialProvider, CursorStore, EventSink};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type FakeWorker = PollWorker<Arc<FakeProvider>, Arc<FakeSource>, Arc<FakeSink>>;

pub(crate) fn record(appointment_id: &str, status: &str, event_id: &str) -> RawChangeRecord {
    RawChangeRecord {
        appointment_id: Some(appointment_id.to_string()),
        status: Some(status.to_string()),
        date: Some("03/14/2025".to_string()),
        start_time: Some("09:30".to_string()),
        event_id: Some(event_id.to_string()),
        patient_id: None,
        appointment_type: None,
    }
}

pub(crate) fn worker(
    provider: &Arc<FakeProvider>,
    source: &Arc<FakeSource>,
    sink: &Arc<FakeSink>,
) -> FakeWorker {
    PollWorker::new(
        "195900",
        CredentialCache::new(provider.clone(), CredentialPolicy::default()),
        source.clone(),
        sink.clone(),
    )
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl CredentialProvider for FakeProvider {
    async fn issue_token(&self) -> Result<String, CredentialError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(CredentialError::Request("connection refused".to_string()));
        }
        Ok(format!("token-{n}"))
    }
}

/// Serves scripted pages in order, then empty pages.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub pages: Mutex<VecDeque<Result<ChangePage, UpstreamError>>>,
    pub requests: Mutex<Vec<Cursor>>,
    pub tokens: Mutex<Vec<String>>,
    pub subscription: Mutex<SubscriptionStatus>,
    pub subscribe_calls: AtomicUsize,
    pub fail_subscriptions: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn push_page(&self, records: Vec<RawChangeRecord>) {
        self.pages
            .lock()
            .unwrap()
            .push_back(Ok(ChangePage::new(records)));
    }

    pub fn push_error(&self, error: UpstreamError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub fn requested_cursors(&self) -> Vec<Cursor> {
        self.requests.lock().unwrap().clone()
    }

    pub fn presented_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeSource for FakeSource {
    async fn fetch_changes(
        &self,
        credential: &Credential,
        cursor: &Cursor,
    ) -> Result<ChangePage, UpstreamError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(cursor.clone());
        self.tokens
            .lock()
            .unwrap()
            .push(credential.token().to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.pages.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next.unwrap_or_else(|| Ok(ChangePage::default()))
    }

    async fn subscriptions(
        &self,
        _credential: &Credential,
    ) -> Result<SubscriptionStatus, UpstreamError> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 403,
                body: "forbidden".to_string(),
            });
        }
        Ok(self.subscription.lock().unwrap().clone())
    }

    async fn subscribe(
        &self,
        _credential: &Credential,
        event_name: Option<&str>,
    ) -> Result<(), UpstreamError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscription.lock().unwrap().event_names = vec![event_name
            .unwrap_or("ScheduleAppointment")
            .to_string()];
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeSink {
    pub batches: Mutex<Vec<Vec<ChangeEvent>>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeSink {
    pub fn batches(&self) -> Vec<Vec<ChangeEvent>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for FakeSink {
    async fn forward(&self, batch: &[ChangeEvent]) -> Result<(), ForwardError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ForwardError::Rejected {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub cursors: Mutex<HashMap<String, Cursor>>,
}

impl CursorStore for MemoryStore {
    fn load(&self, feed_id: &str) -> Result<Cursor, StoreError> {
        Ok(self
            .cursors
            .lock()
            .unwrap()
            .get(feed_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, feed_id: &str, cursor: &Cursor) -> Result<(), StoreError> {
        self.cursors
            .lock()
            .unwrap()
            .insert(feed_id.to_string(), cursor.clone());
        Ok(())
    }
}
