//! Repository Layer
//!
//! Persistence for dispatch jobs. The executor only sees the
//! [`DispatchJobStore`] trait; MongoDB backs production and an in-memory
//! store backs dev mode and tests.

pub mod dispatch_job;
pub mod memory;

use async_trait::async_trait;

use crate::domain::{DispatchJob, DispatchStatus};
use crate::error::Result;

pub use dispatch_job::DispatchJobRepository;
pub use memory::InMemoryDispatchJobStore;

#[async_trait]
pub trait DispatchJobStore: Send + Sync {
    /// `Ok(None)` when no job has this id
    async fn find_by_id(&self, id: &str) -> Result<Option<DispatchJob>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<DispatchJob>>;

    /// Rejects a job whose idempotency key is already taken
    async fn insert(&self, job: &DispatchJob) -> Result<()>;

    /// Set status and `updatedAt` without a version check.
    ///
    /// Still bumps the version so copies held by in-flight workers go stale.
    async fn update_status(&self, id: &str, status: DispatchStatus) -> Result<()>;

    /// Replace the whole job if its stored version still equals `job.version`.
    ///
    /// On success the version is bumped in both the store and `job`. A stale
    /// version yields `PlatformError::Conflict`, a missing job `NotFound`.
    async fn update(&self, job: &mut DispatchJob) -> Result<()>;

    /// PENDING jobs that are due, oldest schedule first
    async fn find_pending(&self, limit: i64) -> Result<Vec<DispatchJob>>;
}
