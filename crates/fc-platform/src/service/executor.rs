//! Dispatch Executor
//!
//! Turns one router delivery of a dispatch job into a single webhook attempt
//! and an ACK/NACK decision for the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fc_common::ProcessResponse;
use fc_config::DispatchConfig;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::dispatch_auth::{AuthError, AuthValidator};
use super::webhook::WebhookDispatcher;
use crate::domain::{DispatchAttempt, DispatchJob, DispatchStatus};
use crate::error::PlatformError;
use crate::repository::DispatchJobStore;

pub const MSG_NOT_FOUND: &str = "Cannot find record.";
pub const MSG_ALREADY_COMPLETED: &str = "Job already completed";
pub const MSG_EXPIRED: &str = "Job expired";
pub const MSG_NOT_DUE: &str = "notBefore time not reached";
pub const MSG_CLAIMED_ELSEWHERE: &str = "Job is being processed by another worker";
pub const MSG_SUCCESS: &str = "Success";
pub const MSG_MAX_RETRIES: &str = "Max retries exceeded";

/// Slack on top of the HTTP deadline before an IN_PROGRESS claim is considered abandoned
const CLAIM_GRACE_SECONDS: i64 = 5;

/// Bound on reload-and-retry cycles when the final write keeps conflicting
const MAX_SETTLE_WRITES: usize = 3;

/// Failures that do not map to a business outcome
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("Failed to load dispatch job: {0}")]
    Store(#[from] PlatformError),
}

pub struct DispatchExecutor {
    store: Arc<dyn DispatchJobStore>,
    auth: Arc<dyn AuthValidator>,
    webhook: WebhookDispatcher,
    backoff: BackoffPolicy,
    config: DispatchConfig,
}

impl DispatchExecutor {
    pub fn new(
        store: Arc<dyn DispatchJobStore>,
        auth: Arc<dyn AuthValidator>,
        config: DispatchConfig,
    ) -> Result<Self, reqwest::Error> {
        let webhook = WebhookDispatcher::new(&config)?;
        Ok(Self::with_webhook(store, auth, webhook, config))
    }

    pub fn with_webhook(
        store: Arc<dyn DispatchJobStore>,
        auth: Arc<dyn AuthValidator>,
        webhook: WebhookDispatcher,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            auth,
            webhook,
            backoff: BackoffPolicy::from_config(&config),
            config,
        }
    }

    /// Process one delivery of `job_id`.
    ///
    /// Every business outcome, including "not found", is an `Ok` response.
    /// `Err` is reserved for a rejected token and for store read failures.
    pub async fn process(&self, job_id: &str, auth_token: &str) -> Result<ProcessResponse, ProcessError> {
        let result = self.process_inner(job_id, auth_token).await;

        let label = match &result {
            Ok((_, label)) => *label,
            Err(ProcessError::Unauthorized(_)) => "unauthorized",
            Err(ProcessError::Store(_)) => "store_error",
        };
        metrics::counter!("dispatch.process.total", "result" => label).increment(1);

        result.map(|(response, _)| response)
    }

    async fn process_inner(
        &self,
        job_id: &str,
        auth_token: &str,
    ) -> Result<(ProcessResponse, &'static str), ProcessError> {
        if let Err(e) = self.auth.validate_auth_token(job_id, auth_token) {
            warn!(job_id = %job_id, error = %e, "Rejected dispatch processing call");
            return Err(e.into());
        }

        let mut job = match self.store.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!(job_id = %job_id, "Dispatch job not found, acking");
                return Ok((ProcessResponse::ack(MSG_NOT_FOUND), "not_found"));
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load dispatch job");
                return Err(e.into());
            }
        };

        if job.is_terminal() {
            debug!(job_id = %job_id, status = job.status.as_str(), "Dispatch job already terminal");
            return Ok((ProcessResponse::ack(MSG_ALREADY_COMPLETED), "already_completed"));
        }

        let now = Utc::now();

        if job.is_expired_at(now) {
            info!(job_id = %job_id, expires_at = ?job.expires_at, "Dispatch job expired, cancelling");
            if let Err(e) = self.store.update_status(job_id, DispatchStatus::Cancelled).await {
                warn!(job_id = %job_id, error = %e, "Failed to persist CANCELLED status");
            }
            return Ok((ProcessResponse::ack(MSG_EXPIRED), "expired"));
        }

        if let Some(wait) = job.seconds_until_due(now) {
            let delay = self.backoff.clamp_delay(wait);
            debug!(job_id = %job_id, delay_seconds = delay, "Dispatch job not due yet");
            return Ok((ProcessResponse::nack_with_delay(MSG_NOT_DUE, delay), "not_due"));
        }

        // A live IN_PROGRESS claim means another call is mid-delivery
        if let Some(wait) = job.seconds_until_claim_lapses(now, self.claim_lease(&job)) {
            let delay = self.backoff.clamp_delay(wait);
            info!(job_id = %job_id, delay_seconds = delay, "Dispatch job in flight elsewhere, deferring");
            return Ok((ProcessResponse::nack_with_delay(MSG_CLAIMED_ELSEWHERE, delay), "in_flight"));
        }

        job.mark_in_progress();
        match self.store.update(&mut job).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                info!(job_id = %job_id, "Dispatch job claimed by another worker");
                return Ok((ProcessResponse::ack(MSG_CLAIMED_ELSEWHERE), "claimed_elsewhere"));
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to persist IN_PROGRESS status, continuing");
            }
        }

        Ok(self.attempt(job).await)
    }

    /// How long an IN_PROGRESS claim blocks other calls: the HTTP deadline plus grace
    fn claim_lease(&self, job: &DispatchJob) -> chrono::Duration {
        let timeout = job.effective_timeout_seconds(self.config.default_timeout_seconds);
        chrono::Duration::seconds(i64::from(timeout) + CLAIM_GRACE_SECONDS)
    }

    /// Execute the webhook, record the attempt and settle the job
    async fn attempt(&self, mut job: DispatchJob) -> (ProcessResponse, &'static str) {
        let timeout_seconds = job.effective_timeout_seconds(self.config.default_timeout_seconds);

        let attempt = self
            .webhook
            .dispatch(&job, job.attempt_count + 1, Duration::from_secs(u64::from(timeout_seconds)))
            .await;

        let mut writes = 0;
        loop {
            let outcome = self.settle(&mut job, attempt.clone());
            writes += 1;

            let e = match self.store.update(&mut job).await {
                Ok(()) => return outcome,
                Err(e) => e,
            };
            if !e.is_conflict() {
                error!(job_id = %job.id, error = %e, "Failed to persist dispatch job result");
                return outcome;
            }
            if writes >= MAX_SETTLE_WRITES {
                error!(job_id = %job.id, writes, "Dispatch job keeps changing, attempt not persisted");
                return outcome;
            }

            // Someone else wrote the job mid-attempt; merge into the fresh copy
            warn!(job_id = %job.id, error = %e, "Dispatch job changed during attempt, reloading");
            job = match self.store.find_by_id(&job.id).await {
                Ok(Some(fresh)) if fresh.is_terminal() => {
                    info!(
                        job_id = %fresh.id,
                        status = fresh.status.as_str(),
                        "Dispatch job became terminal during attempt, attempt not recorded"
                    );
                    return (ProcessResponse::ack(MSG_ALREADY_COMPLETED), "already_completed");
                }
                Ok(Some(fresh)) => fresh,
                Ok(None) => {
                    warn!(job_id = %job.id, "Dispatch job disappeared during attempt");
                    return outcome;
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to reload dispatch job");
                    return outcome;
                }
            };
        }
    }

    /// Append the attempt to `job` and apply the success / retry / give-up transition
    fn settle(&self, job: &mut DispatchJob, mut attempt: DispatchAttempt) -> (ProcessResponse, &'static str) {
        let max_retries = job.effective_max_retries(self.config.default_max_retries);
        attempt.attempt_number = job.attempt_count + 1;
        let succeeded = attempt.is_success();
        let error_message = attempt.error_message.clone();
        job.record_attempt(attempt);

        if succeeded {
            job.mark_completed(Utc::now());
            info!(
                job_id = %job.id,
                attempt = job.attempt_count,
                duration_ms = ?job.duration_millis,
                "Dispatch job completed"
            );
            (ProcessResponse::ack(MSG_SUCCESS), "success")
        } else if job.attempt_count >= max_retries {
            job.mark_error(error_message.clone());
            warn!(
                job_id = %job.id,
                attempts = job.attempt_count,
                max_retries,
                error = ?error_message,
                "Dispatch job failed, retries exhausted"
            );
            (ProcessResponse::ack(MSG_MAX_RETRIES), "max_retries")
        } else {
            job.reset_for_retry(error_message.clone());
            let delay = self.backoff.delay_seconds(job.attempt_count);
            info!(
                job_id = %job.id,
                attempt = job.attempt_count,
                delay_seconds = delay,
                error = ?error_message,
                "Dispatch attempt failed, scheduling retry"
            );
            (
                ProcessResponse::nack_with_delay(error_message.unwrap_or_default(), delay),
                "retry",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryDispatchJobStore;
    use crate::service::DispatchAuthService;

    fn executor(store: Arc<InMemoryDispatchJobStore>) -> (DispatchExecutor, Arc<DispatchAuthService>) {
        let auth = Arc::new(DispatchAuthService::new("test-key"));
        let executor = DispatchExecutor::new(store, auth.clone(), DispatchConfig::default()).unwrap();
        (executor, auth)
    }

    #[tokio::test]
    async fn test_bad_token_touches_nothing() {
        let store = Arc::new(InMemoryDispatchJobStore::new());
        let job = DispatchJob::for_task("t", "s", "http://127.0.0.1:1/hook", "{}");
        store.insert(&job).await.unwrap();
        let (executor, _) = executor(store.clone());

        let err = executor.process(&job.id, "deadbeef").await.unwrap_err();
        assert!(matches!(err, ProcessError::Unauthorized(AuthError::InvalidToken)));

        let stored = store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Pending);
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn test_missing_job_is_acked() {
        let store = Arc::new(InMemoryDispatchJobStore::new());
        let (executor, auth) = executor(store);

        let token = auth.generate_auth_token("missing");
        let response = executor.process("missing", &token).await.unwrap();
        assert_eq!(response, ProcessResponse::ack(MSG_NOT_FOUND));
    }
}
