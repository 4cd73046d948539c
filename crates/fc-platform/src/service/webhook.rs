//! Webhook Dispatcher
//!
//! Performs one HTTP delivery of a dispatch job and classifies the outcome
//! into a [`DispatchAttempt`]. Never retries; the executor decides what
//! happens next.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use chrono::Utc;
use fc_config::DispatchConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Request, Response};
use tracing::{debug, warn};

use crate::domain::{DispatchAttempt, DispatchAttemptStatus, DispatchJob, ErrorType};
use crate::TsidGenerator;

/// Classified result of one delivery, before timing is attached
struct Delivery {
    status: DispatchAttemptStatus,
    response_code: Option<u16>,
    response_body: Option<String>,
    error_message: Option<String>,
    error_type: Option<ErrorType>,
}

impl Delivery {
    fn failed(status: DispatchAttemptStatus, error_type: ErrorType, message: String) -> Self {
        Self {
            status,
            response_code: None,
            response_body: None,
            error_message: Some(message),
            error_type: Some(error_type),
        }
    }
}

pub struct WebhookDispatcher {
    client: Client,
    default_content_type: String,
    max_body_bytes: usize,
}

impl WebhookDispatcher {
    pub fn new(config: &DispatchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &DispatchConfig) -> Self {
        Self {
            client,
            default_content_type: config.default_content_type.clone(),
            max_body_bytes: config.max_response_body_bytes,
        }
    }

    /// POST the job payload to its target under `timeout`
    pub async fn dispatch(&self, job: &DispatchJob, attempt_number: u32, timeout: Duration) -> DispatchAttempt {
        let attempted_at = Utc::now();
        let started = Instant::now();

        let delivery = match self.build_request(job, timeout) {
            Ok(request) => self.execute(request).await,
            Err(message) => Delivery::failed(
                DispatchAttemptStatus::ClientError,
                ErrorType::Permanent,
                format!("Failed to create request: {}", message),
            ),
        };

        let duration = started.elapsed();
        metrics::histogram!("dispatch.attempt.duration_ms").record(duration.as_secs_f64() * 1000.0);

        debug!(
            job_id = %job.id,
            attempt = attempt_number,
            status = ?delivery.status,
            response_code = ?delivery.response_code,
            duration_ms = duration.as_millis() as u64,
            "Webhook attempt finished"
        );

        DispatchAttempt {
            id: TsidGenerator::generate(),
            attempt_number,
            attempted_at,
            completed_at: Utc::now(),
            duration_millis: duration.as_millis() as i64,
            status: delivery.status,
            response_code: delivery.response_code,
            response_body: delivery.response_body,
            error_message: delivery.error_message,
            error_type: delivery.error_type,
        }
    }

    fn build_request(&self, job: &DispatchJob, timeout: Duration) -> Result<Request, String> {
        let content_type = if job.payload_content_type.is_empty() {
            self.default_content_type.as_str()
        } else {
            job.payload_content_type.as_str()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(|e| e.to_string())?,
        );
        // Job headers go last so they can replace Content-Type
        for (name, value) in &job.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| e.to_string())?;
            let value = HeaderValue::from_str(value).map_err(|e| e.to_string())?;
            headers.insert(name, value);
        }

        self.client
            .post(&job.target_url)
            .headers(headers)
            .body(job.payload.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())
    }

    async fn execute(&self, request: Request) -> Delivery {
        let target = request.url().to_string();
        match self.client.execute(request).await {
            Ok(response) => self.classify_response(response).await,
            Err(e) if e.is_timeout() => {
                warn!(target = %target, error = %e, "Request timeout");
                Delivery::failed(
                    DispatchAttemptStatus::Timeout,
                    ErrorType::Transient,
                    "Request timeout".to_string(),
                )
            }
            Err(e) if e.is_connect() => {
                warn!(target = %target, error = %e, "Connection error");
                Delivery::failed(
                    DispatchAttemptStatus::ConnectionError,
                    ErrorType::Transient,
                    format!("Connection error: {}", e),
                )
            }
            Err(e) => {
                warn!(target = %target, error = %e, error_debug = ?e, "Request failed");
                Delivery::failed(
                    DispatchAttemptStatus::ServerError,
                    ErrorType::Transient,
                    format!("Request failed: {}", e),
                )
            }
        }
    }

    async fn classify_response(&self, response: Response) -> Delivery {
        let status = response.status();
        let code = status.as_u16();

        let (body, timed_out) = self.read_body(response).await;
        if timed_out {
            return Delivery {
                response_code: Some(code),
                response_body: body,
                ..Delivery::failed(
                    DispatchAttemptStatus::Timeout,
                    ErrorType::Transient,
                    "Request timeout".to_string(),
                )
            };
        }

        let (attempt_status, error_type) = if status.is_success() {
            (DispatchAttemptStatus::Success, None)
        } else if status.is_client_error() {
            (DispatchAttemptStatus::ClientError, Some(ErrorType::Permanent))
        } else {
            (DispatchAttemptStatus::ServerError, Some(ErrorType::Transient))
        };

        Delivery {
            status: attempt_status,
            response_code: Some(code),
            response_body: body,
            error_message: error_type.map(|_| format!("HTTP {}", status)),
            error_type,
        }
    }

    /// Read at most `max_body_bytes` of the body. The rest is discarded.
    ///
    /// Returns the captured text and whether the deadline hit mid-body.
    async fn read_body(&self, mut response: Response) -> (Option<String>, bool) {
        let mut buf = BytesMut::new();
        let mut timed_out = false;

        while buf.len() < self.max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_body_bytes - buf.len();
                    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                Ok(None) => break,
                Err(e) => {
                    timed_out = e.is_timeout();
                    debug!(error = %e, "Response body read aborted");
                    break;
                }
            }
        }

        let body = if buf.is_empty() {
            None
        } else {
            Some(truncate_at_char_boundary(
                String::from_utf8_lossy(&buf).into_owned(),
                self.max_body_bytes,
            ))
        };
        (body, timed_out)
    }
}

/// Lossy decoding turns each invalid byte into a 3-byte U+FFFD, so the
/// decoded text is capped again.
fn truncate_at_char_boundary(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
