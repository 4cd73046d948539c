//! FlowCatalyst Platform
//!
//! Dispatch job processing core:
//! - Dispatch job lifecycle and attempt history
//! - Webhook delivery with outcome classification
//! - Retry decisions with exponential backoff
//! - HMAC-bound dispatch auth tokens
//! - Processing endpoint called by the message router

pub mod domain;
pub mod repository;
pub mod service;
pub mod api;
pub mod error;
pub mod tsid;

pub use domain::*;
pub use error::PlatformError;
pub use tsid::TsidGenerator;
