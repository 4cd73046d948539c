//! Dispatch Processing API
//!
//! `POST /api/dispatch/process` receives `{ "messageId": ... }` from the
//! message router with the job's Bearer token and answers ACK or NACK.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use fc_common::{ProcessRequest, ProcessResponse};
use tracing::{error, info, warn};

use crate::service::{extract_bearer_token, DispatchExecutor, ProcessError};

#[derive(Clone)]
pub struct DispatchProcessingState {
    pub executor: Arc<DispatchExecutor>,
}

type ProcessResult = (StatusCode, Json<ProcessResponse>);

fn reply(status: StatusCode, response: ProcessResponse) -> ProcessResult {
    (status, Json(response))
}

/// Process a dispatch job
#[utoipa::path(
    post,
    path = "/api/dispatch/process",
    tag = "dispatch-processing",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Job processed, check ack for the decision", body = ProcessResponse),
        (status = 400, description = "Malformed request body", body = ProcessResponse),
        (status = 401, description = "Missing or invalid auth token", body = ProcessResponse),
        (status = 500, description = "Dispatch job could not be loaded", body = ProcessResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn process_dispatch_job(
    State(state): State<DispatchProcessingState>,
    headers: HeaderMap,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> ProcessResult {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to parse dispatch process request");
            return reply(StatusCode::BAD_REQUEST, ProcessResponse::nack("Invalid request body"));
        }
    };

    info!(message_id = %request.message_id, "Received dispatch job processing request");

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token);
    let Some(token) = token else {
        warn!(message_id = %request.message_id, "Dispatch process request missing Authorization header");
        return reply(StatusCode::UNAUTHORIZED, ProcessResponse::nack("Missing Authorization header"));
    };

    match state.executor.process(&request.message_id, token).await {
        Ok(response) => reply(StatusCode::OK, response),
        Err(ProcessError::Unauthorized(e)) => reply(StatusCode::UNAUTHORIZED, ProcessResponse::nack(e.to_string())),
        Err(ProcessError::Store(e)) => {
            error!(message_id = %request.message_id, error = %e, "Error processing dispatch job");
            reply(StatusCode::INTERNAL_SERVER_ERROR, ProcessResponse::nack("Internal error"))
        }
    }
}

/// Router to nest under `/api/dispatch`
pub fn dispatch_processing_router(state: DispatchProcessingState) -> Router {
    Router::new()
        .route("/process", post(process_dispatch_job))
        .with_state(state)
}
