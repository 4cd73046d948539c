//! Service Layer
//!
//! Dispatch processing: auth tokens, webhook delivery, backoff and the
//! executor that ties them to the job store.

pub mod backoff;
pub mod dispatch_auth;
pub mod executor;
pub mod webhook;

pub use backoff::BackoffPolicy;
pub use dispatch_auth::{AuthError, AuthValidator, DispatchAuthService, extract_bearer_token};
pub use executor::{DispatchExecutor, ProcessError};
pub use webhook::WebhookDispatcher;
