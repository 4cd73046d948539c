//! Dispatch Job Entity
//!
//! Represents async delivery of an event/task to a target endpoint.
//! Tracks full lifecycle with attempt history.

use std::collections::HashMap;

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Dispatch job kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchKind {
    /// Dispatching an event
    #[default]
    Event,
    /// Dispatching a task/command
    Task,
}

/// Dispatch job status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    /// Waiting to be picked up, or waiting for a retry
    #[default]
    Pending,
    /// Published to the message queue by the scheduler
    Queued,
    /// A processing call is executing the webhook
    InProgress,
    /// Delivered successfully
    Completed,
    /// Retry budget exhausted
    Error,
    /// Expired before it could be delivered
    Cancelled,
}

impl DispatchStatus {
    /// Terminal jobs are never executed or modified again
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed | Self::Error | Self::Cancelled => true,
            Self::Pending | Self::Queued | Self::InProgress => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Target protocol for dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchProtocol {
    #[default]
    HttpWebhook,
}

/// Retry strategy tag carried on the job.
///
/// Redelivery delays are always computed by the executor's backoff policy;
/// the tag is kept for producers and read models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStrategy {
    Immediate,
    FixedDelay,
    #[default]
    ExponentialBackoff,
}

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchAttemptStatus {
    Success,
    /// 4xx response, or the request could not be built
    ClientError,
    /// 5xx / unexpected response, or an unclassified transport failure
    ServerError,
    Timeout,
    ConnectionError,
}

impl DispatchAttemptStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Error classification for failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// Worth retrying: timeouts, connection failures, 5xx
    Transient,
    /// Retrying will not help: 4xx, malformed request
    Permanent,
}

/// Dispatch attempt record. Append-only, never modified once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAttempt {
    pub id: String,

    /// Attempt number (1-based)
    pub attempt_number: u32,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub attempted_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub completed_at: DateTime<Utc>,

    /// Wall time of the HTTP call only
    pub duration_millis: i64,

    pub status: DispatchAttemptStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,

    /// Response body, truncated to the configured cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

impl DispatchAttempt {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Dispatch job entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    /// TSID as Crockford Base32 string
    #[serde(rename = "_id")]
    pub id: String,

    // === Classification ===

    #[serde(default)]
    pub kind: DispatchKind,

    /// Event type code or task identifier
    pub code: String,

    /// Source system/application
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    // === Target ===

    pub target_url: String,

    #[serde(default)]
    pub protocol: DispatchProtocol,

    /// Custom request headers, applied after Content-Type
    #[serde(default)]
    pub headers: HashMap<String, String>,

    // === Payload ===

    pub payload: String,

    /// Empty means the configured default
    #[serde(default)]
    pub payload_content_type: String,

    // === Context ===

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_pool_id: Option<String>,

    /// Message group for FIFO ordering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_group: Option<String>,

    #[serde(default)]
    pub sequence: i32,

    /// Deduplication key, unique across jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    // === Execution policy ===

    /// Per-attempt HTTP deadline; 0 means the configured default
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,

    /// Attempt budget; 0 means the configured default
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub retry_strategy: RetryStrategy,

    /// Not-before time
    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Hard deadline after which the job is cancelled
    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub expires_at: Option<DateTime<Utc>>,

    // === Status tracking ===

    #[serde(default)]
    pub status: DispatchStatus,

    #[serde(default)]
    pub attempt_count: u32,

    #[serde(default)]
    pub attempts: Vec<DispatchAttempt>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none", default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation to completion, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<i64>,

    /// Optimistic concurrency token, bumped by every full update
    #[serde(default)]
    pub version: u64,

    // === Timestamps ===

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

fn default_timeout() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl DispatchJob {
    /// Create a new dispatch job for an event
    pub fn for_event(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
        target_url: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            kind: DispatchKind::Event,
            code: event_type.into(),
            source: source.into(),
            subject: None,
            target_url: target_url.into(),
            protocol: DispatchProtocol::HttpWebhook,
            headers: HashMap::new(),
            payload: payload.into(),
            payload_content_type: String::new(),
            event_id: Some(event_id.into()),
            correlation_id: None,
            client_id: None,
            subscription_id: None,
            service_account_id: None,
            dispatch_pool_id: None,
            message_group: None,
            sequence: 0,
            idempotency_key: None,
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            retry_strategy: RetryStrategy::ExponentialBackoff,
            scheduled_for: None,
            expires_at: None,
            status: DispatchStatus::Pending,
            attempt_count: 0,
            attempts: vec![],
            last_error: None,
            last_attempt_at: None,
            completed_at: None,
            duration_millis: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new dispatch job for a task
    pub fn for_task(
        code: impl Into<String>,
        source: impl Into<String>,
        target_url: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let mut job = Self::for_event("", code, source, target_url, payload);
        job.kind = DispatchKind::Task;
        job.event_id = None;
        job
    }

    // Builder methods
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.payload_content_type = content_type.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }

    pub fn with_dispatch_pool_id(mut self, id: impl Into<String>) -> Self {
        self.dispatch_pool_id = Some(id.into());
        self
    }

    pub fn with_message_group(mut self, group: impl Into<String>) -> Self {
        self.message_group = Some(group.into());
        self
    }

    /// Reject jobs that can never be delivered
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.id.is_empty() {
            return Err(PlatformError::validation("dispatch job id is required"));
        }
        if self.target_url.trim().is_empty() {
            return Err(PlatformError::validation("targetUrl is required"));
        }
        if self.attempt_count as usize != self.attempts.len() {
            return Err(PlatformError::validation("attemptCount must equal the number of attempts"));
        }
        Ok(())
    }

    // Lifecycle checks

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    /// Whole seconds (rounded up) until `scheduled_for`, if it is still in the future
    pub fn seconds_until_due(&self, now: DateTime<Utc>) -> Option<u64> {
        let scheduled_for = self.scheduled_for?;
        if scheduled_for <= now {
            return None;
        }
        let millis = (scheduled_for - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000))
    }

    /// Whole seconds (rounded up) until an IN_PROGRESS claim older than `lease` lapses.
    ///
    /// `None` when the job is not IN_PROGRESS or the claim is already stale.
    pub fn seconds_until_claim_lapses(&self, now: DateTime<Utc>, lease: chrono::Duration) -> Option<u64> {
        if self.status != DispatchStatus::InProgress {
            return None;
        }
        let lapses_at = self.updated_at + lease;
        if lapses_at <= now {
            return None;
        }
        let millis = (lapses_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000))
    }

    pub fn effective_timeout_seconds(&self, default: u32) -> u32 {
        if self.timeout_seconds == 0 { default } else { self.timeout_seconds }
    }

    pub fn effective_max_retries(&self, default: u32) -> u32 {
        if self.max_retries == 0 { default } else { self.max_retries }
    }

    pub fn can_retry(&self, default_max_retries: u32) -> bool {
        !self.is_terminal() && self.attempt_count < self.effective_max_retries(default_max_retries)
    }

    pub fn last_attempt(&self) -> Option<&DispatchAttempt> {
        self.attempts.last()
    }

    // Transitions

    pub fn mark_in_progress(&mut self) {
        self.status = DispatchStatus::InProgress;
        self.updated_at = Utc::now();
    }

    /// Append an attempt, keeping `attempt_count == attempts.len()`
    pub fn record_attempt(&mut self, attempt: DispatchAttempt) {
        self.last_attempt_at = Some(attempt.attempted_at);
        self.attempts.push(attempt);
        self.attempt_count = self.attempts.len() as u32;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = DispatchStatus::Completed;
        self.completed_at = Some(now);
        self.duration_millis = Some((now - self.created_at).num_milliseconds());
        self.updated_at = now;
    }

    /// Retry budget exhausted
    pub fn mark_error(&mut self, error: Option<String>) {
        self.status = DispatchStatus::Error;
        self.last_error = error;
        self.updated_at = Utc::now();
    }

    /// Put the job back to PENDING for the next redelivery
    pub fn reset_for_retry(&mut self, error: Option<String>) {
        self.status = DispatchStatus::Pending;
        self.last_error = error;
        self.updated_at = Utc::now();
    }
}
