//! API Layer
//!
//! HTTP endpoint the message router calls for each queued dispatch job.

pub mod dispatch_processing;
pub mod openapi;

pub use dispatch_processing::{DispatchProcessingState, dispatch_processing_router};
pub use openapi::PlatformApiDoc;
