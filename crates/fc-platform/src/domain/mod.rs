//! Domain Models
//!
//! All entities use TSID (Crockford Base32) string IDs for JavaScript compatibility.

pub mod dispatch_job;

pub use dispatch_job::*;
