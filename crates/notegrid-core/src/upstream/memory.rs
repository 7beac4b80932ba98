use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ContentSource, DatabaseSummary, FetchError};
use crate::normalize::RawRecord;

/// Scriptable upstream for tests.
#[derive(Default)]
pub struct InMemorySource {
    records: Mutex<Vec<RawRecord>>,
    databases: Mutex<Vec<DatabaseSummary>>,
    failure: Mutex<Option<FetchError>>,
    order_failures: Mutex<Vec<String>>,
    order_updates: Mutex<Vec<(String, u32)>>,
    delay: Mutex<Option<Duration>>,
    stall_order_updates: AtomicBool,
    queries: AtomicUsize,
}

impl InMemorySource {
    pub fn new(pages: Vec<Value>) -> Self {
        let source = Self::default();
        source.set_pages(pages);
        source
    }

    pub fn set_pages(&self, pages: Vec<Value>) {
        let records = pages.iter().map(RawRecord::from_json).collect();
        *lock(&self.records) = records;
    }

    pub fn set_databases(&self, databases: Vec<DatabaseSummary>) {
        *lock(&self.databases) = databases;
    }

    /// Make every query fail with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<FetchError>) {
        *lock(&self.failure) = error;
    }

    /// Make order updates for `record_id` fail.
    pub fn fail_order_update(&self, record_id: impl Into<String>) {
        lock(&self.order_failures).push(record_id.into());
    }

    /// Delay every query, for timeout and overlap tests.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Make order updates hang until cleared.
    pub fn stall_order_updates(&self, stall: bool) {
        self.stall_order_updates.store(stall, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Order updates received so far, sorted by record id.
    pub fn order_updates(&self) -> Vec<(String, u32)> {
        let mut updates = lock(&self.order_updates).clone();
        updates.sort();
        updates
    }
}

#[async_trait]
impl ContentSource for InMemorySource {
    async fn query_database(&self, _database_ref: &str) -> Result<Vec<RawRecord>, FetchError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.failure).clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(lock(&self.records).clone())
    }

    async fn update_record_order(
        &self,
        record_id: &str,
        position: u32,
    ) -> Result<(), FetchError> {
        if self.stall_order_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if lock(&self.order_failures)
            .iter()
            .any(|failing| failing == record_id)
        {
            return Err(FetchError::Rejected {
                status: 404,
                message: format!("page {record_id} not found"),
            });
        }
        lock(&self.order_updates).push((record_id.to_string(), position));
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>, FetchError> {
        let failure = lock(&self.failure).clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(lock(&self.databases).clone())
    }
}

/// A Notion page payload with a title and an external image.
pub fn notion_page(id: &str, title: &str, media_url: &str, last_edited: &str) -> Value {
    json!({
        "object": "page",
        "id": id,
        "created_time": "2024-01-01T00:00:00.000Z",
        "last_edited_time": last_edited,
        "properties": {
            "Name": { "id": "title", "type": "title", "title": [
                { "type": "text", "plain_text": title, "text": { "content": title } }
            ]},
            "Image": { "id": "img", "type": "files", "files": [
                { "name": "cover", "type": "external", "external": { "url": media_url } }
            ]}
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
