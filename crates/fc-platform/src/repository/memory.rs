//! In-memory dispatch job store for dev mode and tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::DispatchJobStore;
use crate::domain::{DispatchJob, DispatchStatus};
use crate::error::{PlatformError, Result};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, DispatchJob>,
    /// idempotency key -> job id
    idempotency: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryDispatchJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryDispatchJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DispatchJobStore for InMemoryDispatchJobStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<DispatchJob>> {
        Ok(self.inner.read().jobs.get(id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<DispatchJob>> {
        let inner = self.inner.read();
        Ok(inner
            .idempotency
            .get(key)
            .and_then(|id| inner.jobs.get(id))
            .cloned())
    }

    async fn insert(&self, job: &DispatchJob) -> Result<()> {
        job.validate()?;
        let mut inner = self.inner.write();
        if inner.jobs.contains_key(&job.id) {
            return Err(PlatformError::duplicate("DispatchJob", "id", &job.id));
        }
        if let Some(key) = &job.idempotency_key {
            if inner.idempotency.contains_key(key) {
                return Err(PlatformError::duplicate("DispatchJob", "idempotencyKey", key));
            }
            inner.idempotency.insert(key.clone(), job.id.clone());
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: DispatchStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| PlatformError::not_found("DispatchJob", id))?;
        job.status = status;
        job.version += 1;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update(&self, job: &mut DispatchJob) -> Result<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| PlatformError::not_found("DispatchJob", &job.id))?;
        if stored.version != job.version {
            return Err(PlatformError::conflict("DispatchJob", &job.id, job.version));
        }
        job.version += 1;
        *stored = job.clone();
        Ok(())
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<DispatchJob>> {
        let now = Utc::now();
        let inner = self.inner.read();
        let mut due: Vec<DispatchJob> = inner
            .jobs
            .values()
            .filter(|job| job.status == DispatchStatus::Pending)
            .filter(|job| job.scheduled_for.map_or(true, |at| at <= now))
            .cloned()
            .collect();
        // Unscheduled jobs sort first, as a null scheduledFor does in MongoDB
        due.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then(a.created_at.cmp(&b.created_at))
        });
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> DispatchJob {
        DispatchJob::for_event("evt-1", "orders:created", "orders", "http://localhost/hook", "{}")
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryDispatchJobStore::new();
        let job = job();
        store.insert(&job).await.unwrap();

        let found = store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(found.code, "orders:created");
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_rejected() {
        let store = InMemoryDispatchJobStore::new();
        store.insert(&job().with_idempotency_key("k-1")).await.unwrap();

        let err = store.insert(&job().with_idempotency_key("k-1")).await.unwrap_err();
        assert!(matches!(err, PlatformError::Duplicate { .. }));
        assert_eq!(store.len(), 1);

        let found = store.find_by_idempotency_key("k-1").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_stale_writes() {
        let store = InMemoryDispatchJobStore::new();
        let original = job();
        store.insert(&original).await.unwrap();

        let mut first = original.clone();
        let mut second = original.clone();

        first.mark_in_progress();
        store.update(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        second.mark_in_progress();
        let err = store.update(&mut second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(second.version, 0);

        let stored = store.find_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, DispatchStatus::InProgress);
    }

    #[tokio::test]
    async fn test_status_write_invalidates_in_flight_copies() {
        let store = InMemoryDispatchJobStore::new();
        let original = job();
        store.insert(&original).await.unwrap();

        let mut in_flight = original.clone();
        in_flight.mark_in_progress();
        store.update(&mut in_flight).await.unwrap();

        store.update_status(&original.id, DispatchStatus::Cancelled).await.unwrap();

        in_flight.reset_for_retry(Some("HTTP 500".to_string()));
        let err = store.update(&mut in_flight).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.find_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Cancelled);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_job_without_target() {
        let store = InMemoryDispatchJobStore::new();
        let err = store
            .insert(&DispatchJob::for_task("t", "s", "", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Validation { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_missing_job() {
        let store = InMemoryDispatchJobStore::new();
        let err = store
            .update_status("nope", DispatchStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_pending_skips_future_and_non_pending() {
        let store = InMemoryDispatchJobStore::new();
        let now = Utc::now();

        let due = job();
        let later = job().with_scheduled_for(now + Duration::hours(1));
        let past = job().with_scheduled_for(now - Duration::minutes(5));
        let mut done = job();
        done.mark_completed(now);

        for j in [&due, &later, &past, &done] {
            store.insert(j).await.unwrap();
        }

        let pending = store.find_pending(10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![due.id.as_str(), past.id.as_str()]);

        assert_eq!(store.find_pending(1).await.unwrap().len(), 1);
    }
}
